use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Registrar, RegistrationError, RegistrationInfo, RegistrationRequest};
use crate::{
    config::Config,
    error::{PaperWalletError, PaperWalletResult},
    http_request::Request,
};

const REGISTER_PATH: &str = "/v1/paper-wallets";

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Registrar reached over HTTPS.
///
/// Creation is retried only when the connection was never established; a timed-out or failed
/// request may already have created the account, so it is reported instead.
pub struct HttpRegistrar {
    base_url: String,
    request: Request,
}

impl HttpRegistrar {
    /// Creates a registrar for `base_url` (e.g. `https://registrar.example.org`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `base_url` is not an `https` URL.
    pub fn new(base_url: &str, timeout: Duration) -> PaperWalletResult<Self> {
        if !cfg!(test) && !base_url.starts_with("https://") {
            return Err(PaperWalletError::invalid_input(
                "registrar_url",
                "must be an https URL",
            ));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request: Request::new(timeout),
        })
    }

    /// Creates a registrar from a validated [`Config`].
    ///
    /// # Errors
    ///
    /// See [`HttpRegistrar::new`].
    pub fn from_config(config: &Config) -> PaperWalletResult<Self> {
        Self::new(&config.registrar_url, Duration::from_secs(10))
    }

    fn endpoint(&self) -> String {
        format!("{}{REGISTER_PATH}", self.base_url)
    }
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationInfo, RegistrationError> {
        let url = self.endpoint();
        log::debug!("registering {} at {url}", request.address);

        let response = self
            .request
            .handle(self.request.post(&url).json(request))
            .await?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| RegistrationError::Network {
                url: url.clone(),
                status: Some(status),
                error: format!("failed to read response body: {err}"),
            })?;

        if (200..300).contains(&status) {
            let info: RegistrationInfo =
                serde_json::from_str(&body).map_err(|err| RegistrationError::Network {
                    url,
                    status: Some(status),
                    error: format!("invalid registration response: {err}"),
                })?;
            return Ok(info);
        }

        let message = serde_json::from_str::<ErrorBody>(&body)
            .map_or(body, |error_body| error_body.message);

        if status == 409 || (status == 400 && message.to_lowercase().contains("already")) {
            return Err(RegistrationError::AlreadyRegistered {
                address: request.address,
            });
        }

        if (400..500).contains(&status) {
            return Err(RegistrationError::Rejected {
                reason: format!("{status}: {message}"),
            });
        }

        Err(RegistrationError::Network {
            url,
            status: Some(status),
            error: message,
        })
    }
}
