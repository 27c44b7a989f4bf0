//! LXD API integration module.
//!
//! This module provides the transport the reconciler consumes: the
//! [`Transport`] trait and its [`LxdClient`] implementation.

mod client;
mod transport;
mod types;

pub use client::LxdClient;
pub use transport::Transport;
pub use types::{CreateStoragePool, LxdResponse, Method, Operation, ResponseType};
