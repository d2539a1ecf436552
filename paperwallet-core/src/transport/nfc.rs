use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use super::{Transport, TransportError, TransportKind};

/// NFC stack provided by the host platform.
///
/// `write_tag` must be atomic from the caller's point of view: after it returns (or fails) the
/// tag holds either the old or the new payload, never a mix.
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
#[async_trait]
pub trait NfcTag: Send + Sync {
    /// Whether the device has NFC hardware. Queried once.
    fn is_supported(&self) -> bool;

    /// Opens a reader session.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the reader cannot be opened.
    fn begin_session(&self) -> Result<(), TransportError>;

    /// Closes the reader session. Must be safe to call more than once.
    fn end_session(&self);

    /// Waits for a tag and reads its payload. `None` means the tag is blank.
    ///
    /// # Errors
    ///
    /// Returns `TagRemoved` or `Io` if the read fails mid-operation.
    async fn read_tag(&self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Waits for a tag and replaces its payload.
    ///
    /// # Errors
    ///
    /// Returns `TagRemoved` or `Io` if the write fails mid-operation.
    async fn write_tag(&self, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Ends the reader session before the reader lock is released.
struct Session<'a> {
    tag: &'a dyn NfcTag,
    _reader: MutexGuard<'a, ()>,
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.tag.end_session();
    }
}

/// NFC transport with per-call timeouts and exclusive access to the reader.
pub struct NfcAdapter {
    tag: Arc<dyn NfcTag>,
    supported: bool,
    timeout: Duration,
    reader: Mutex<()>,
}

impl NfcAdapter {
    /// Creates an adapter. Hardware support is read from the platform once, here.
    #[must_use]
    pub fn new(tag: Arc<dyn NfcTag>, timeout: Duration) -> Self {
        let supported = tag.is_supported();
        Self {
            tag,
            supported,
            timeout,
            reader: Mutex::new(()),
        }
    }

    /// Whether the device can use NFC at all. Check before offering NFC to the operator.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.supported
    }

    /// Reads the presented tag without treating a blank tag as an error.
    ///
    /// Existing data is a fact for the caller to decide on, not a failure.
    ///
    /// # Errors
    ///
    /// Same as [`Transport::read`], except that a blank tag yields `Ok(None)`.
    pub async fn has_existing_data(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let _session = self.open()?;
        let data = self.bounded("tag inspection", self.tag.read_tag()).await?;
        Ok(data.filter(|bytes| !bytes.is_empty()))
    }

    fn open(&self) -> Result<Session<'_>, TransportError> {
        if !self.supported {
            return Err(TransportError::Unsupported);
        }
        let reader = self.reader.try_lock().map_err(|_| TransportError::Busy)?;
        self.tag.begin_session()?;
        Ok(Session {
            tag: self.tag.as_ref(),
            _reader: reader,
        })
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, TransportError>> + Send,
    ) -> Result<T, TransportError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                log::debug!("nfc {operation} timed out after {:?}", self.timeout);
                TransportError::Timeout {
                    operation: operation.to_string(),
                }
            })?
    }
}

#[async_trait]
impl Transport for NfcAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Nfc
    }

    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        let _session = self.open()?;
        self.bounded("tag write", self.tag.write_tag(payload.to_vec()))
            .await
    }

    async fn read(&self) -> Result<Vec<u8>, TransportError> {
        let _session = self.open()?;
        match self.bounded("tag read", self.tag.read_tag()).await? {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(TransportError::EmptyTag),
        }
    }
}
