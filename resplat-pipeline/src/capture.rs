//! Frame capture bridge
//!
//! One-shot handshake between "capture whatever is on screen" and "the
//! renderer finished a frame after that request". The renderer side
//! holds a cloneable `FrameSignal` and marks every completed frame;
//! the orchestrator side arms the bridge and awaits exactly one
//! outcome:
//!
//! - `Some(Ok(image))`: a frame completed and the surface yielded a
//!   still image,
//! - `Some(Err(_))`: extraction failed or no frame completed within
//!   the wall-clock timeout,
//! - `None`: this arm cycle was superseded by a re-arm or teardown
//!   before either fired (silent cancellation).
//!
//! Re-arming cancels the previous cycle before the new one starts, so
//! a stale cycle can never deliver after its successor is armed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Frame capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No render-frame signal arrived within the capture budget
    #[error("timed out waiting for rendered frame")]
    Timeout,

    /// The surface produced an empty image
    #[error("capture produced an empty image")]
    EmptyFrame,

    /// The surface could not be read
    #[error("{0}")]
    Extraction(String),
}

/// Drawing surface of the external renderer
///
/// The bridge only calls this after a frame-completed signal, so an
/// implementation may assume the most recent frame is fully rendered.
pub trait RenderSurface: Send + Sync {
    /// Extract the current frame as an encoded still image
    /// (data-URI form). `Err` carries the reason the surface was
    /// unreadable.
    fn extract_image(&self) -> Result<String, String>;
}

/// Surface backed by a pre-encoded image
///
/// Used by the headless CLI (which has no live renderer) and by tests.
pub struct StaticSurface {
    data: String,
}

impl StaticSurface {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

impl RenderSurface for StaticSurface {
    fn extract_image(&self) -> Result<String, String> {
        Ok(self.data.clone())
    }
}

/// Renderer-side handle: call `frame_end` after every completed frame
#[derive(Clone)]
pub struct FrameSignal {
    tx: broadcast::Sender<()>,
}

impl FrameSignal {
    pub fn frame_end(&self) {
        // No armed cycle means nobody is listening; that is fine.
        let _ = self.tx.send(());
    }
}

struct ArmedCycle {
    seq: u64,
    token: CancellationToken,
}

/// One-shot synchronization between capture requests and render frames
pub struct FrameCaptureBridge {
    frame_tx: broadcast::Sender<()>,
    active: Mutex<Option<ArmedCycle>>,
    request_seq: AtomicU64,
    timeout: Duration,
}

impl FrameCaptureBridge {
    pub fn new(timeout: Duration) -> Self {
        let (frame_tx, _) = broadcast::channel(16);
        Self {
            frame_tx,
            active: Mutex::new(None),
            request_seq: AtomicU64::new(0),
            timeout,
        }
    }

    /// Handle for the renderer to signal completed frames
    pub fn frame_signal(&self) -> FrameSignal {
        FrameSignal {
            tx: self.frame_tx.clone(),
        }
    }

    /// Number of capture requests made so far (0 = never armed)
    pub fn request_count(&self) -> u64 {
        self.request_seq.load(Ordering::SeqCst)
    }

    /// Tear down: silently cancel any armed cycle
    pub fn cancel(&self) {
        if let Some(cycle) = self.active.lock().expect("capture bridge lock poisoned").take() {
            cycle.token.cancel();
        }
    }

    /// Arm the bridge and wait for the next completed frame
    ///
    /// Subscribes to the frame signal before publishing the armed
    /// cycle, so a frame completing immediately after arming is not
    /// missed.
    pub async fn capture<S: RenderSurface + ?Sized>(
        &self,
        surface: &S,
    ) -> Option<Result<String, CaptureError>> {
        let seq = self.request_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut frames = self.frame_tx.subscribe();
        let token = CancellationToken::new();

        let previous = {
            let mut active = self.active.lock().expect("capture bridge lock poisoned");
            active.replace(ArmedCycle {
                seq,
                token: token.clone(),
            })
        };
        if let Some(prev) = previous {
            tracing::debug!(superseded = prev.seq, by = seq, "capture cycle re-armed");
            prev.token.cancel();
        }

        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            _ = tokio::time::sleep(self.timeout) => Some(Err(CaptureError::Timeout)),
            _ = next_frame(&mut frames) => Some(extract(surface)),
        };

        // Detach our cycle unless a re-arm already replaced it
        {
            let mut active = self.active.lock().expect("capture bridge lock poisoned");
            if active.as_ref().map(|c| c.seq) == Some(seq) {
                *active = None;
            }
        }

        outcome
    }
}

/// Wait for the next frame-end signal, tolerating lagged receivers
async fn next_frame(frames: &mut broadcast::Receiver<()>) {
    loop {
        match frames.recv().await {
            Ok(()) => return,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            // The bridge owns the sender, so the channel cannot close
            // while an armed cycle exists; let the timeout decide.
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

fn extract<S: RenderSurface + ?Sized>(surface: &S) -> Result<String, CaptureError> {
    match surface.extract_image() {
        Ok(image) if image.is_empty() || image == "data:," => Err(CaptureError::EmptyFrame),
        Ok(image) => Ok(image),
        Err(reason) => Err(CaptureError::Extraction(reason)),
    }
}
