#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Issue, transport and redeem paper wallet credentials over QR codes and NFC tags.

pub mod credential;

mod config;
pub use config::*;

mod error;
pub use error::*;

/// Bridge from the `log` facade to a host-provided logger.
pub mod logger;

pub mod transport;

pub mod registration;

pub mod chain;

pub mod provisioning;

pub mod scan;

// private modules
mod http_request;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("paperwallet_core");
