//! Server-side registration of freshly generated paper wallets.
//!
//! The registrar creates the account, optionally approves gas sponsorship and optionally
//! assigns a human-readable name. The last two are best effort: their failure comes back as a
//! [`RegistrationWarning`], not an error.

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

mod http;

pub use http::HttpRegistrar;

/// What to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Address of the new paper wallet.
    pub address: Address,
    /// Whether to request gas sponsorship for the wallet.
    pub sponsor_gas: bool,
    /// Requested human-readable name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RegistrationRequest {
    /// Plain account creation, no sponsorship and no name.
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self {
            address,
            sponsor_gas: false,
            name: None,
        }
    }
}

/// A non-fatal registration problem the operator should know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegistrationWarning {
    /// The account exists but no name was assigned.
    NameAssignmentFailed {
        /// Reason given by the registrar
        reason: String,
    },
    /// The account exists but gas sponsorship was not approved.
    GasSponsorshipFailed {
        /// Reason given by the registrar
        reason: String,
    },
}

impl std::fmt::Display for RegistrationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameAssignmentFailed { reason } => write!(f, "name assignment failed: {reason}"),
            Self::GasSponsorshipFailed { reason } => {
                write!(f, "gas sponsorship failed: {reason}")
            }
        }
    }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInfo {
    /// Human-readable name assigned to the address.
    #[serde(default)]
    pub ens_name: Option<String>,
    /// Whether gas sponsorship was approved.
    #[serde(default)]
    pub gas_approved: bool,
    /// Optional steps that failed.
    #[serde(default)]
    pub warnings: Vec<RegistrationWarning>,
}

impl RegistrationInfo {
    /// Adds a warning for every optional step that was requested but did not happen and that
    /// the registrar did not already report.
    #[must_use]
    pub fn reconcile(mut self, request: &RegistrationRequest) -> Self {
        let has_name_warning = self
            .warnings
            .iter()
            .any(|w| matches!(w, RegistrationWarning::NameAssignmentFailed { .. }));
        if request.name.is_some() && self.ens_name.is_none() && !has_name_warning {
            self.warnings.push(RegistrationWarning::NameAssignmentFailed {
                reason: "no name was assigned".to_string(),
            });
        }

        let has_gas_warning = self
            .warnings
            .iter()
            .any(|w| matches!(w, RegistrationWarning::GasSponsorshipFailed { .. }));
        if request.sponsor_gas && !self.gas_approved && !has_gas_warning {
            self.warnings.push(RegistrationWarning::GasSponsorshipFailed {
                reason: "sponsorship was not approved".to_string(),
            });
        }

        self
    }

    /// Whether every requested step succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// The registrar refused the account or could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum RegistrationError {
    /// The address already has an account.
    #[error("already_registered: {address}")]
    AlreadyRegistered {
        /// The address
        address: Address,
    },
    /// The registrar refused the request for another reason.
    #[error("registration_rejected: {reason}")]
    Rejected {
        /// Reason given by the registrar
        reason: String,
    },
    /// The registrar could not be reached or failed.
    #[error("network_error: {url} (status {status:?}): {error}")]
    Network {
        /// The requested URL
        url: String,
        /// HTTP status, when a response arrived
        status: Option<u16>,
        /// Description of the failure
        error: String,
    },
}

impl RegistrationError {
    /// Category recorded in a provisioning session.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyRegistered { .. } | Self::Rejected { .. } => ErrorKind::BadRequest,
            Self::Network { .. } => ErrorKind::Network,
        }
    }
}

/// Server-side account creation.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Registers `request.address`.
    ///
    /// Registration is not idempotent; implementations must not blindly retry once the
    /// request may have reached the server.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] if no account was created.
    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationInfo, RegistrationError>;
}
