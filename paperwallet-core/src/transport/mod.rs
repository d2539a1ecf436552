//! QR and NFC transports.
//!
//! Both carry opaque payload bytes. The platform side (camera, QR renderer, NFC stack) is
//! provided by the host through [`QrSurface`] and [`NfcTag`]; the adapters here add the
//! contract on top: text encoding, device release on every exit path, timeouts and exclusive
//! access to the reader. Adapters never retry or queue.

use async_trait::async_trait;
use strum::Display;

mod error;
mod nfc;
mod qr;

pub use error::TransportError;
pub use nfc::{NfcAdapter, NfcTag};
pub use qr::{QrAdapter, QrSurface};

/// Which physical channel a payload travelled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TransportKind {
    /// Printed or on-screen QR code.
    Qr,
    /// NFC tag.
    Nfc,
}

/// A byte-in/byte-out channel for credential payloads.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The channel this transport drives.
    fn kind(&self) -> TransportKind;

    /// Places `payload` on the medium.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the single attempt fails.
    async fn write(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Acquires one payload from the medium.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the single attempt fails.
    async fn read(&self) -> Result<Vec<u8>, TransportError>;
}
