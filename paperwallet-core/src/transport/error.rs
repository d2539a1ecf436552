use thiserror::Error;

/// Failure of a single QR or NFC operation.
///
/// Every transport call is one physical attempt; any of these may be retried by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
pub enum TransportError {
    /// No tag was presented (or no frame decoded) in time.
    #[error("transport_timeout: timed out during {operation}")]
    Timeout {
        /// The operation that timed out
        operation: String,
    },
    /// The tag left the field before the operation finished.
    #[error("tag_removed")]
    TagRemoved,
    /// The tag holds no data.
    #[error("empty_tag")]
    EmptyTag,
    /// The camera or NFC reader cannot be accessed.
    #[error("device_unavailable: {reason}")]
    DeviceUnavailable {
        /// Reason reported by the platform
        reason: String,
    },
    /// The device has no NFC hardware.
    #[error("nfc_unsupported")]
    Unsupported,
    /// Another operation holds the reader.
    #[error("reader_busy")]
    Busy,
    /// Any other platform I/O failure.
    #[error("transport_io: {reason}")]
    Io {
        /// Reason reported by the platform
        reason: String,
    },
    /// The platform callback failed in a way it did not declare.
    #[error("unexpected_platform_error: {reason}")]
    Unexpected {
        /// Reason reported by the bindings
        reason: String,
    },
}

#[cfg(feature = "ffi")]
impl From<uniffi::UnexpectedUniFFICallbackError> for TransportError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Unexpected {
            reason: error.reason,
        }
    }
}
