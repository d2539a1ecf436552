use alloy_primitives::Address;
use strum::Display;
use thiserror::Error;

use crate::{chain::ChainError, registration::RegistrationError, transport::TransportError};

/// Convenience alias for results returned by `paperwallet-core`.
pub type PaperWalletResult<T, E = PaperWalletError> = std::result::Result<T, E>;

/// Error outputs from `paperwallet-core`.
///
/// Messages never include key material or passwords. Every scan-pipeline abort has its own
/// variant so the operator can tell which check failed.
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum PaperWalletError {
    /// The presented input is not valid for the requested operation
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// The attribute that is invalid
        attribute: String,
        /// The reason the input is invalid
        reason: String,
    },
    /// Entropy or cipher library failure. Fatal, never retried.
    #[error("crypto_failure: {reason}")]
    CryptoFailure {
        /// What failed
        reason: String,
    },
    /// The payload version is unknown or its structure does not parse.
    #[error("malformed_payload: {reason}")]
    MalformedPayload {
        /// What is wrong with the payload
        reason: String,
    },
    /// The key inside a payload does not derive the address stored next to it.
    #[error("address_mismatch: stored {stored}, derived {derived}")]
    AddressMismatch {
        /// Address carried in the clear by the payload
        stored: Address,
        /// Address derived from the decrypted key
        derived: Address,
    },
    /// Authenticated decryption failed for the supplied password.
    #[error("wrong_password")]
    WrongPassword,
    /// The credential is encrypted and no password was supplied.
    #[error("password_required")]
    PasswordRequired,
    /// A QR or NFC transport call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The registration collaborator refused or could not be reached.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// The provisioning session cannot perform `action` in its current step.
    #[error("invalid_state: cannot {action} while {step}")]
    InvalidState {
        /// The requested action
        action: &'static str,
        /// The current step
        step: String,
    },
    /// The scanned credential belongs to the scanning account.
    #[error("self_scan_rejected: {address} is the scanning account")]
    SelfScanRejected {
        /// The scanned address
        address: Address,
    },
    /// The scanned credential carries the null address.
    #[error("invalid_address: {address}")]
    InvalidAddress {
        /// The scanned address
        address: Address,
    },
    /// The entered amount is not positive or exceeds the available balance.
    #[error("invalid_amount: {reason}")]
    InvalidAmount {
        /// Why the amount was rejected
        reason: String,
    },
    /// The dry-run of the transfer failed. The reason is the chain client's, verbatim.
    #[error("simulation_failed: {reason}")]
    SimulationFailed {
        /// Reason reported by the chain client
        reason: String,
    },
    /// The simulated call does not match the requested transfer. Fatal, never retried.
    #[error("security_invariant_violated: {reason}")]
    SecurityInvariantViolated {
        /// Which field disagreed
        reason: String,
    },
    /// The credential cannot cover the transfer.
    #[error("insufficient_funds")]
    InsufficientFunds,
    /// The signer or operator cancelled the transfer.
    #[error("user_cancelled")]
    UserCancelled,
    /// The transaction nonce clashed with another pending transaction.
    #[error("nonce_conflict: {reason}")]
    NonceConflict {
        /// Reason reported by the node
        reason: String,
    },
    /// Any other chain client failure.
    #[error("chain_error: {reason}")]
    Chain {
        /// Reason reported by the chain client
        reason: String,
    },
}

/// Category of a failure, as recorded in a provisioning session and shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum ErrorKind {
    /// Invalid caller input.
    InvalidInput,
    /// Entropy or cipher failure.
    CryptoFailure,
    /// Unparseable payload.
    MalformedPayload,
    /// Stored and derived addresses disagree.
    AddressMismatch,
    /// Wrong password.
    WrongPassword,
    /// Password missing for an encrypted credential.
    PasswordRequired,
    /// QR or NFC failure.
    Transport,
    /// The registrar rejected the request.
    #[strum(serialize = "BAD_REQUEST")]
    BadRequest,
    /// The registrar created the account but an optional step failed.
    RegistrationPartialFailure,
    /// The registrar could not be reached.
    Network,
    /// Action not allowed in the current step.
    InvalidState,
    /// The scanned credential is the scanning account.
    SelfScanRejected,
    /// The scanned credential carries the null address.
    InvalidAddress,
    /// The amount was rejected.
    InvalidAmount,
    /// The dry-run failed.
    SimulationFailed,
    /// Request construction bug detected before signing.
    SecurityInvariantViolated,
    /// Not enough funds.
    InsufficientFunds,
    /// Cancelled by the user.
    UserCancelled,
    /// Nonce clash.
    NonceConflict,
    /// Other chain failure.
    Chain,
}

impl PaperWalletError {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::CryptoFailure { .. } => ErrorKind::CryptoFailure,
            Self::MalformedPayload { .. } => ErrorKind::MalformedPayload,
            Self::AddressMismatch { .. } => ErrorKind::AddressMismatch,
            Self::WrongPassword => ErrorKind::WrongPassword,
            Self::PasswordRequired => ErrorKind::PasswordRequired,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Registration(err) => err.kind(),
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::SelfScanRejected { .. } => ErrorKind::SelfScanRejected,
            Self::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            Self::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Self::SimulationFailed { .. } => ErrorKind::SimulationFailed,
            Self::SecurityInvariantViolated { .. } => ErrorKind::SecurityInvariantViolated,
            Self::InsufficientFunds => ErrorKind::InsufficientFunds,
            Self::UserCancelled => ErrorKind::UserCancelled,
            Self::NonceConflict { .. } => ErrorKind::NonceConflict,
            Self::Chain { .. } => ErrorKind::Chain,
        }
    }

    /// Whether the same call may be attempted again (possibly after re-prompting or re-presenting
    /// a tag). Cryptographic and integrity failures are never retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::WrongPassword
                | Self::PasswordRequired
                | Self::InvalidAmount { .. }
                | Self::Registration(RegistrationError::Network { .. })
        )
    }

    pub(crate) fn invalid_input(attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }

    pub(crate) fn crypto(reason: impl Into<String>) -> Self {
        Self::CryptoFailure {
            reason: reason.into(),
        }
    }
}

impl From<ChainError> for PaperWalletError {
    fn from(error: ChainError) -> Self {
        match error {
            ChainError::InsufficientFunds => Self::InsufficientFunds,
            ChainError::UserCancelled => Self::UserCancelled,
            ChainError::NonceConflict { reason } => Self::NonceConflict { reason },
            ChainError::Reverted { reason } | ChainError::Rpc { reason } => Self::Chain { reason },
        }
    }
}
