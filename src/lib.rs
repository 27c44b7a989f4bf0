// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # lxd-pools
//!
//! Declarative, idempotent presence/absence management for LXD storage pools.
//!
//! ## Overview
//!
//! A run takes one pool declaration and makes the LXD server agree with it:
//!
//! - `present`: the pool is created with the declared driver and config
//! - `absent`: the pool is deleted
//!
//! Repeated runs with the same declaration converge to "unchanged".
//!
//! ## Architecture
//!
//! The reconciler never checks for existence before acting. It sends the one
//! create or delete request the desired state implies and classifies the
//! response: success is "changed", the server's "already exists" or "no such
//! object" rejection is "unchanged", anything else fails with the server's
//! message. Settings of an existing pool are never modified.
//!
//! ## Modules
//!
//! - [`config`]: Manifest parsing, layering and validation
//! - [`lxd`]: LXD API transport over a Unix socket or HTTPS
//! - [`reconciler`]: Presence/absence reconciliation engine
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! name: pool1
//! driver: zfs
//! config:
//!   size: 20GB
//! state: present
//! connection:
//!   url: unix:/var/lib/lxd/unix.socket
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod lxd;
pub mod reconciler;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{
    ConnectionConfig, Credentials, DesiredState, Endpoint, ManifestParser, ManifestValidator,
    PoolManifest, PoolSpec, StorageDriver,
};
pub use error::{ConfigError, LxdError, PoolError, Result};
pub use lxd::{LxdClient, Method, Transport};
pub use reconciler::{KnownRemoteError, Outcome, Reconciler};
