//! Output formatting for CLI commands.
//!
//! The outcome of a run is the tool's only product, so it is rendered either
//! as a short colored line or as a JSON object for scripts.

use colored::Colorize;
use serde::Serialize;

use crate::reconciler::Outcome;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// JSON shape of an outcome.
#[derive(Debug, Serialize)]
struct OutcomeJson<'a> {
    changed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<&'a str>,
}

impl<'a> From<&'a Outcome> for OutcomeJson<'a> {
    fn from(outcome: &'a Outcome) -> Self {
        Self {
            changed: outcome.is_changed(),
            failed: outcome.is_failed(),
            msg: outcome.message(),
        }
    }
}

/// JSON shape of an existence query.
#[derive(Debug, Serialize)]
struct ExistsJson<'a> {
    name: &'a str,
    exists: bool,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a run outcome.
    #[must_use]
    pub fn format_outcome(&self, pool: &str, outcome: &Outcome) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string(&OutcomeJson::from(outcome)).unwrap_or_default()
            }
            OutputFormat::Text => match outcome {
                Outcome::Changed => format!("{} storage pool '{pool}'", "changed".yellow()),
                Outcome::Unchanged => format!("{} storage pool '{pool}'", "ok".green()),
                Outcome::Failed { message } => {
                    format!("{} storage pool '{pool}': {message}", "failed".red())
                }
            },
        }
    }

    /// Formats the answer to an existence query.
    #[must_use]
    pub fn format_exists(&self, pool: &str, exists: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string(&ExistsJson { name: pool, exists }).unwrap_or_default()
            }
            OutputFormat::Text => exists.to_string(),
        }
    }
}
