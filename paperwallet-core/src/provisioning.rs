//! Provisioning: generate a credential, register it, put it on paper or an NFC tag.
//!
//! ```text
//! Idle -> Generating -> Registering -> Writing -> Completed
//!                            |            |
//!                            |            +-> WriteFailed --retry_write--> (re-verify) Writing
//!                            +-> RegistrationIncomplete --proceed--> Writing
//!                            +-> RegistrationFailed --retry_registration--> Registering
//! Registering -> ConfirmOverwrite --confirm_overwrite--> Writing
//!                                 --cancel_overwrite--> WriteFailed
//! any --reset--> Idle
//! ```
//!
//! Paper credentials are rendered right after registration and skip `Writing`. The generated
//! credential is kept for the whole session: retries always reuse it, since the address is
//! already registered.

use std::sync::Arc;

use alloy_primitives::Address;
use secrecy::{ExposeSecret, SecretString};
use strum::Display;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    config::Config,
    credential::{self, KdfParams, TransportPayload},
    error::{ErrorKind, PaperWalletError, PaperWalletResult},
    registration::{Registrar, RegistrationInfo, RegistrationRequest, RegistrationWarning},
    transport::{NfcAdapter, NfcTag, QrAdapter, QrSurface, Transport, TransportError},
};

/// Where the credential ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Medium {
    /// Printed QR code.
    Paper,
    /// NFC tag.
    Nfc,
}

/// Whether the key is sealed under a password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Encryption {
    /// Argon2id + XChaCha20-Poly1305 under the operator's password.
    Encrypted,
    /// Key in the clear.
    None,
}

/// What the operator asked for when starting a session.
#[derive(Debug)]
pub struct ProvisioningOptions {
    /// Target medium.
    pub medium: Medium,
    /// Whether to encrypt.
    pub encryption: Encryption,
    /// Password, required exactly when `encryption` is `Encrypted`.
    pub password: Option<SecretString>,
    /// Ask the registrar for gas sponsorship.
    pub sponsor_gas: bool,
    /// Ask the registrar for this name.
    pub name: Option<String>,
}

impl ProvisioningOptions {
    /// Options without sponsorship or name.
    #[must_use]
    pub const fn new(medium: Medium, encryption: Encryption, password: Option<SecretString>) -> Self {
        Self {
            medium,
            encryption,
            password,
            sponsor_gas: false,
            name: None,
        }
    }

    fn validate(&self) -> PaperWalletResult<()> {
        match (self.encryption, &self.password) {
            (Encryption::Encrypted, None) => Err(PaperWalletError::invalid_input(
                "password",
                "encrypted credentials need a password",
            )),
            (Encryption::Encrypted, Some(password)) if password.expose_secret().is_empty() => Err(
                PaperWalletError::invalid_input("password", "password cannot be empty"),
            ),
            (Encryption::None, Some(_)) => Err(PaperWalletError::invalid_input(
                "password",
                "a password was given for an unencrypted credential",
            )),
            _ => Ok(()),
        }
    }
}

/// Where a provisioning session stands.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProvisioningStep {
    /// No session in progress.
    Idle,
    /// Generating the key.
    Generating,
    /// Waiting for the registrar.
    Registering,
    /// The account exists but optional steps failed. Waiting for `proceed` or `reset`.
    RegistrationIncomplete {
        /// What did not happen
        warnings: Vec<RegistrationWarning>,
    },
    /// The registrar refused or could not be reached. Waiting for `retry_registration` or
    /// `reset`.
    RegistrationFailed,
    /// The tag already holds data. Waiting for `confirm_overwrite` or `cancel_overwrite`.
    ConfirmOverwrite {
        /// Address of the credential already on the tag, if it decodes
        existing_address: Option<Address>,
    },
    /// Writing to the tag.
    Writing,
    /// The write or render failed. Waiting for `retry_write` or `reset`.
    WriteFailed,
    /// The credential is on its medium.
    Completed,
}

/// Receives every step change of a session.
pub trait ProvisioningObserver: Send + Sync {
    /// Called after the session moved to `step`.
    fn on_step_changed(&self, session_id: Uuid, step: &ProvisioningStep);
}

/// State of one wallet-creation attempt.
pub struct ProvisioningSession {
    id: Uuid,
    step: ProvisioningStep,
    medium: Option<Medium>,
    encryption: Option<Encryption>,
    credential: Option<TransportPayload>,
    encoded: Option<Zeroizing<Vec<u8>>>,
    request: Option<RegistrationRequest>,
    registration_result: Option<RegistrationInfo>,
    last_error: Option<ErrorKind>,
}

impl ProvisioningSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            step: ProvisioningStep::Idle,
            medium: None,
            encryption: None,
            credential: None,
            encoded: None,
            request: None,
            registration_result: None,
            last_error: None,
        }
    }

    /// Identifier used in logs and observer callbacks.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current step.
    #[must_use]
    pub const fn step(&self) -> &ProvisioningStep {
        &self.step
    }

    /// Target medium, once started.
    #[must_use]
    pub const fn medium(&self) -> Option<Medium> {
        self.medium
    }

    /// Encryption choice, once started.
    #[must_use]
    pub const fn encryption(&self) -> Option<Encryption> {
        self.encryption
    }

    /// The generated credential.
    #[must_use]
    pub const fn credential(&self) -> Option<&TransportPayload> {
        self.credential.as_ref()
    }

    /// The exact bytes rendered or written.
    #[must_use]
    pub fn encoded_payload(&self) -> Option<&[u8]> {
        self.encoded.as_deref().map(Vec::as_slice)
    }

    /// What the registrar reported.
    #[must_use]
    pub const fn registration(&self) -> Option<&RegistrationInfo> {
        self.registration_result.as_ref()
    }

    /// Category of the most recent failure.
    #[must_use]
    pub const fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }
}

impl std::fmt::Debug for ProvisioningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningSession")
            .field("id", &self.id)
            .field("step", &self.step)
            .field("medium", &self.medium)
            .field("encryption", &self.encryption)
            .field("credential", &self.credential)
            .field("encoded", &self.encoded.as_ref().map(|_| "[REDACTED]"))
            .field("request", &self.request)
            .field("registration_result", &self.registration_result)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Drives one provisioning session at a time.
///
/// Every action takes `&mut self`, so a machine cannot advance two steps concurrently. Run one
/// machine per operator.
pub struct ProvisioningMachine {
    registrar: Arc<dyn Registrar>,
    qr: Arc<QrAdapter>,
    nfc: Option<Arc<NfcAdapter>>,
    kdf: KdfParams,
    observer: Option<Arc<dyn ProvisioningObserver>>,
    session: ProvisioningSession,
}

impl ProvisioningMachine {
    /// Creates an idle machine. Pass `nfc: None` on devices without an NFC reader.
    #[must_use]
    pub fn new(
        registrar: Arc<dyn Registrar>,
        qr: Arc<QrAdapter>,
        nfc: Option<Arc<NfcAdapter>>,
        kdf: KdfParams,
    ) -> Self {
        Self {
            registrar,
            qr,
            nfc,
            kdf,
            observer: None,
            session: ProvisioningSession::new(),
        }
    }

    /// Creates an idle machine from `config`, wrapping the platform surfaces in adapters.
    #[must_use]
    pub fn from_config(
        config: &Config,
        registrar: Arc<dyn Registrar>,
        camera: Arc<dyn QrSurface>,
        nfc_tag: Option<Arc<dyn NfcTag>>,
    ) -> Self {
        let nfc = nfc_tag.map(|tag| Arc::new(NfcAdapter::new(tag, config.nfc_timeout())));
        Self::new(registrar, Arc::new(QrAdapter::new(camera)), nfc, config.kdf)
    }

    /// Registers an observer for step changes.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProvisioningObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The current session.
    #[must_use]
    pub const fn session(&self) -> &ProvisioningSession {
        &self.session
    }

    /// Current step.
    #[must_use]
    pub const fn step(&self) -> &ProvisioningStep {
        &self.session.step
    }

    /// Starts a session: generates the credential and runs as far as it can without an
    /// operator decision.
    ///
    /// # Errors
    ///
    /// * `InvalidState` unless idle.
    /// * `InvalidInput` for inconsistent options, `Transport(Unsupported)` for NFC without a
    ///   reader. The machine stays idle.
    /// * `CryptoFailure` if generation fails. The machine returns to idle.
    /// * Registration and transport errors, leaving the session in the matching failure step.
    pub async fn start(&mut self, options: ProvisioningOptions) -> PaperWalletResult<()> {
        self.require("start", |step| matches!(step, ProvisioningStep::Idle))?;

        self.session = ProvisioningSession::new();
        if let Err(err) = self.check_options(&options) {
            return Err(self.record(err));
        }

        self.session.medium = Some(options.medium);
        self.session.encryption = Some(options.encryption);
        log::info!(
            "session {}: provisioning {} credential on {}",
            self.session.id,
            options.encryption,
            options.medium
        );

        self.transition(ProvisioningStep::Generating);
        let payload = match credential::generate_with_params(options.password.as_ref(), self.kdf) {
            Ok(payload) => payload,
            Err(err) => {
                log::error!("session {}: credential generation failed: {err}", self.session.id);
                self.transition(ProvisioningStep::Idle);
                return Err(self.record(err));
            }
        };

        let address = payload.address();
        log::info!(
            "session {}: generated {address} (payload {})",
            self.session.id,
            payload.fingerprint()
        );
        self.session.encoded = Some(Zeroizing::new(credential::encode(&payload)));
        self.session.credential = Some(payload);
        self.session.request = Some(RegistrationRequest {
            address,
            sponsor_gas: options.sponsor_gas,
            name: options.name,
        });

        self.register().await
    }

    /// Continues after a partial registration, accepting the warnings.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the registration is incomplete; otherwise as for writing.
    pub async fn proceed(&mut self) -> PaperWalletResult<()> {
        self.require("proceed", |step| {
            matches!(step, ProvisioningStep::RegistrationIncomplete { .. })
        })?;
        self.deliver().await
    }

    /// Asks the registrar again for the same address.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless registration failed; otherwise the registrar's error.
    pub async fn retry_registration(&mut self) -> PaperWalletResult<()> {
        self.require("retry registration", |step| {
            matches!(step, ProvisioningStep::RegistrationFailed)
        })?;
        self.register().await
    }

    /// Overwrites the data found on the tag.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless waiting for an overwrite decision; otherwise the write error.
    pub async fn confirm_overwrite(&mut self) -> PaperWalletResult<()> {
        self.require("confirm overwrite", |step| {
            matches!(step, ProvisioningStep::ConfirmOverwrite { .. })
        })?;
        log::warn!("session {}: overwriting existing tag data", self.session.id);
        self.write_nfc().await
    }

    /// Leaves the tag untouched. The session waits in `WriteFailed` for another tag.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless waiting for an overwrite decision.
    pub fn cancel_overwrite(&mut self) -> PaperWalletResult<()> {
        self.require("cancel overwrite", |step| {
            matches!(step, ProvisioningStep::ConfirmOverwrite { .. })
        })?;
        self.session.last_error = Some(ErrorKind::UserCancelled);
        self.transition(ProvisioningStep::WriteFailed);
        Ok(())
    }

    /// Writes the same credential again.
    ///
    /// The tag is re-inspected first: a write that failed (or was interrupted, leaving the
    /// session in `Writing`) may still have landed. If the tag already holds our payload the
    /// session completes; other data needs an overwrite decision.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a write failed or was interrupted; otherwise the transport error.
    pub async fn retry_write(&mut self) -> PaperWalletResult<()> {
        self.require("retry write", |step| {
            matches!(step, ProvisioningStep::WriteFailed | ProvisioningStep::Writing)
        })?;
        self.deliver().await
    }

    /// Abandons the session and returns to idle.
    ///
    /// An address that was already registered stays registered.
    pub fn reset(&mut self) {
        if let Some(credential) = &self.session.credential {
            if !matches!(self.session.step, ProvisioningStep::Completed) {
                log::warn!(
                    "session {}: abandoned in {} with registered address {}",
                    self.session.id,
                    self.session.step,
                    credential.address()
                );
            }
        }
        self.session = ProvisioningSession::new();
        self.transition(ProvisioningStep::Idle);
    }

    fn check_options(&self, options: &ProvisioningOptions) -> PaperWalletResult<()> {
        options.validate()?;
        if options.medium == Medium::Nfc && !self.nfc.as_ref().is_some_and(|nfc| nfc.is_supported())
        {
            return Err(TransportError::Unsupported.into());
        }
        Ok(())
    }

    async fn register(&mut self) -> PaperWalletResult<()> {
        let Some(request) = self.session.request.clone() else {
            return Err(self.invalid_state("register"));
        };

        self.transition(ProvisioningStep::Registering);
        match self.registrar.register(&request).await {
            Ok(info) => {
                let info = info.reconcile(&request);
                let warnings = info.warnings.clone();
                if let Some(name) = &info.ens_name {
                    log::info!("session {}: registered as {name}", self.session.id);
                }
                self.session.registration_result = Some(info);

                if warnings.is_empty() {
                    return self.deliver().await;
                }

                for warning in &warnings {
                    log::warn!("session {}: {warning}", self.session.id);
                }
                self.session.last_error = Some(ErrorKind::RegistrationPartialFailure);
                self.transition(ProvisioningStep::RegistrationIncomplete { warnings });
                Ok(())
            }
            Err(err) => {
                log::warn!("session {}: registration failed: {err}", self.session.id);
                self.transition(ProvisioningStep::RegistrationFailed);
                Err(self.record(err.into()))
            }
        }
    }

    async fn deliver(&mut self) -> PaperWalletResult<()> {
        match self.session.medium {
            Some(Medium::Paper) => self.render_paper().await,
            Some(Medium::Nfc) => self.verify_and_write_nfc().await,
            None => Err(self.invalid_state("deliver")),
        }
    }

    async fn render_paper(&mut self) -> PaperWalletResult<()> {
        let encoded = self.encoded()?;
        match self.qr.write(&encoded).await {
            Ok(()) => self.complete(),
            Err(err) => {
                self.transition(ProvisioningStep::WriteFailed);
                Err(self.record(err.into()))
            }
        }
    }

    async fn verify_and_write_nfc(&mut self) -> PaperWalletResult<()> {
        let encoded = self.encoded()?;
        let nfc = self.nfc_adapter()?;

        match nfc
            .has_existing_data()
            .await
            .map(|data| data.map(Zeroizing::new))
        {
            Ok(Some(existing)) if existing == encoded => {
                log::info!("session {}: tag already holds this credential", self.session.id);
                self.complete()
            }
            Ok(Some(existing)) => {
                let existing_address = credential::decode(&existing)
                    .ok()
                    .map(|payload| payload.address());
                self.transition(ProvisioningStep::ConfirmOverwrite { existing_address });
                Ok(())
            }
            Ok(None) => self.write_nfc().await,
            Err(err) => {
                self.transition(ProvisioningStep::WriteFailed);
                Err(self.record(err.into()))
            }
        }
    }

    async fn write_nfc(&mut self) -> PaperWalletResult<()> {
        let encoded = self.encoded()?;
        let nfc = self.nfc_adapter()?;

        self.transition(ProvisioningStep::Writing);
        match nfc.write(&encoded).await {
            Ok(()) => self.complete(),
            Err(err) => {
                log::warn!("session {}: tag write failed: {err}", self.session.id);
                self.transition(ProvisioningStep::WriteFailed);
                Err(self.record(err.into()))
            }
        }
    }

    fn complete(&mut self) -> PaperWalletResult<()> {
        self.session.last_error = None;
        self.transition(ProvisioningStep::Completed);
        Ok(())
    }

    fn encoded(&self) -> PaperWalletResult<Zeroizing<Vec<u8>>> {
        self.session
            .encoded
            .clone()
            .ok_or_else(|| self.invalid_state("write"))
    }

    fn nfc_adapter(&self) -> PaperWalletResult<Arc<NfcAdapter>> {
        self.nfc
            .clone()
            .ok_or_else(|| TransportError::Unsupported.into())
    }

    fn require(
        &self,
        action: &'static str,
        allowed: impl FnOnce(&ProvisioningStep) -> bool,
    ) -> PaperWalletResult<()> {
        if allowed(&self.session.step) {
            Ok(())
        } else {
            Err(self.invalid_state(action))
        }
    }

    fn invalid_state(&self, action: &'static str) -> PaperWalletError {
        PaperWalletError::InvalidState {
            action,
            step: self.session.step.to_string(),
        }
    }

    fn record(&mut self, err: PaperWalletError) -> PaperWalletError {
        self.session.last_error = Some(err.kind());
        err
    }

    fn transition(&mut self, step: ProvisioningStep) {
        log::debug!(
            "session {}: {} -> {step}",
            self.session.id,
            self.session.step
        );
        self.session.step = step;
        if let Some(observer) = &self.observer {
            observer.on_step_changed(self.session.id, &self.session.step);
        }
    }
}
