use std::time::Duration;

use serde::Deserialize;
use strum::EnumString;

use crate::{
    credential::KdfParams,
    error::{PaperWalletError, PaperWalletResult},
};

/// Deployment the core talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Environment {
    /// Staging registrar.
    Staging,
    /// Production registrar.
    Production,
}

const DEFAULT_NFC_TIMEOUT_MS: u64 = 30_000;

/// Runtime configuration of the paper wallet core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL of the registration service.
    pub registrar_url: String,
    /// Argon2id cost for newly generated encrypted credentials.
    #[serde(default)]
    pub kdf: KdfParams,
    /// How long an NFC read or write waits for a tag.
    #[serde(default = "default_nfc_timeout_ms")]
    pub nfc_timeout_ms: u64,
}

const fn default_nfc_timeout_ms() -> u64 {
    DEFAULT_NFC_TIMEOUT_MS
}

impl Config {
    /// Default configuration for `environment`.
    #[must_use]
    pub fn from_environment(environment: &Environment) -> Self {
        let registrar_url = match environment {
            Environment::Staging => "https://registrar.staging.paperwallet.network",
            Environment::Production => "https://registrar.paperwallet.network",
        };
        Self {
            registrar_url: registrar_url.to_string(),
            kdf: KdfParams::default(),
            nfc_timeout_ms: DEFAULT_NFC_TIMEOUT_MS,
        }
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the JSON does not parse or a value is out of range.
    pub fn from_json(json: &str) -> PaperWalletResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| PaperWalletError::invalid_input("config", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the offending field.
    pub fn validate(&self) -> PaperWalletResult<()> {
        if !self.registrar_url.starts_with("https://") {
            return Err(PaperWalletError::invalid_input(
                "registrar_url",
                "must be an https URL",
            ));
        }
        self.kdf
            .validate()
            .map_err(|err| PaperWalletError::invalid_input("kdf", err.to_string()))?;
        if self.nfc_timeout_ms == 0 {
            return Err(PaperWalletError::invalid_input(
                "nfc_timeout_ms",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// NFC timeout as a [`Duration`].
    #[must_use]
    pub const fn nfc_timeout(&self) -> Duration {
        Duration::from_millis(self.nfc_timeout_ms)
    }
}
