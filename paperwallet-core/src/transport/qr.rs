use std::sync::Arc;

use async_trait::async_trait;

use super::{Transport, TransportError, TransportKind};
use crate::credential::{decode_text, encode_text};

/// Camera and QR rendering provided by the host platform.
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
#[async_trait]
pub trait QrSurface: Send + Sync {
    /// Acquires the capture device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the camera cannot be opened.
    fn open_camera(&self) -> Result<(), TransportError>;

    /// Releases the capture device. Must be safe to call more than once.
    fn close_camera(&self);

    /// Samples the next frame. `None` means the frame held no decodable QR code.
    ///
    /// # Errors
    ///
    /// Only for loss of the capture device; decode noise is reported as `None`.
    async fn next_frame(&self) -> Result<Option<String>, TransportError>;

    /// Renders `text` as a printable QR image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be produced.
    async fn render(&self, text: String) -> Result<(), TransportError>;
}

/// Closes the camera when dropped, including when a read future is cancelled.
struct CameraGuard<'a> {
    surface: &'a dyn QrSurface,
}

impl Drop for CameraGuard<'_> {
    fn drop(&mut self) {
        self.surface.close_camera();
    }
}

/// QR transport. Writing renders the payload; reading scans the camera until a code decodes.
pub struct QrAdapter {
    surface: Arc<dyn QrSurface>,
}

impl QrAdapter {
    /// Creates an adapter over the platform's camera and renderer.
    #[must_use]
    pub fn new(surface: Arc<dyn QrSurface>) -> Self {
        Self { surface }
    }
}

#[async_trait]
impl Transport for QrAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Qr
    }

    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.surface.render(encode_text(payload)).await
    }

    async fn read(&self) -> Result<Vec<u8>, TransportError> {
        self.surface.open_camera()?;
        let _camera = CameraGuard {
            surface: self.surface.as_ref(),
        };

        let mut skipped = 0usize;
        loop {
            if let Some(text) = self.surface.next_frame().await? {
                log::debug!("qr code decoded after {skipped} undecodable frames");
                // Foreign QR codes are handed to the codec as-is; it rejects them.
                return Ok(decode_text(&text).unwrap_or_else(|_| text.into_bytes()));
            }
            skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use super::*;

    #[derive(Default)]
    struct ScriptedCamera {
        frames: Mutex<VecDeque<Result<Option<String>, TransportError>>>,
        rendered: Mutex<Vec<String>>,
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl ScriptedCamera {
        fn with_frames(frames: Vec<Result<Option<String>, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(frames.into()),
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl QrSurface for ScriptedCamera {
        fn open_camera(&self) -> Result<(), TransportError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close_camera(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }

        async fn next_frame(&self) -> Result<Option<String>, TransportError> {
            let next = self.frames.lock().unwrap().pop_front();
            match next {
                Some(frame) => frame,
                None => std::future::pending().await,
            }
        }

        async fn render(&self, text: String) -> Result<(), TransportError> {
            self.rendered.lock().unwrap().push(text);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_read_skips_noise_and_releases_camera() {
        let camera = ScriptedCamera::with_frames(vec![
            Ok(None),
            Ok(None),
            Ok(Some(encode_text(b"payload"))),
        ]);
        let adapter = QrAdapter::new(camera.clone());

        assert_eq!(adapter.read().await.unwrap(), b"payload");
        assert_eq!(camera.opened.load(Ordering::SeqCst), 1);
        assert_eq!(camera.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_device_loss_is_surfaced_and_camera_released() {
        let camera = ScriptedCamera::with_frames(vec![
            Ok(None),
            Err(TransportError::DeviceUnavailable {
                reason: "permission revoked".to_string(),
            }),
        ]);
        let adapter = QrAdapter::new(camera.clone());

        assert!(matches!(
            adapter.read().await,
            Err(TransportError::DeviceUnavailable { .. })
        ));
        assert_eq!(camera.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_read_releases_camera() {
        let camera = ScriptedCamera::with_frames(vec![]);
        let adapter = QrAdapter::new(camera.clone());

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(1), adapter.read()).await;
        assert!(result.is_err());
        assert_eq!(camera.opened.load(Ordering::SeqCst), 1);
        assert_eq!(camera.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_base64_text_is_passed_through() {
        let camera = ScriptedCamera::with_frames(vec![Ok(Some("https://example.com".to_string()))]);
        let adapter = QrAdapter::new(camera);
        assert_eq!(adapter.read().await.unwrap(), b"https://example.com");
    }

    #[tokio::test]
    async fn test_write_renders_text_form() {
        let camera = ScriptedCamera::with_frames(vec![]);
        let adapter = QrAdapter::new(camera.clone());
        adapter.write(&[0xfb, 0xff]).await.unwrap();
        assert_eq!(camera.rendered.lock().unwrap().as_slice(), ["-_8"]);
    }
}
