//! Asset store: pipeline artifacts and blob-handle lifecycle
//!
//! The store is the single shared mutable resource of a pipeline
//! session. It owns every binary payload and the revocable handles
//! materialized from them, and it is the explicit context object the
//! orchestrator carries (no process-global state). Observers learn
//! about changes through the `EventBus`, never by polling.
//!
//! Handle invariant: at most one locally materialized blob handle is
//! live for the generated asset at any time. `set_generated_asset` and
//! `reset` are the only mutation points, and both release the old
//! handle and install the replacement under one write lock, so a
//! reader never observes two live handles or a dangling one.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use resplat_common::events::{AssetKind, EventBus, PipelineEvent, PipelineStage};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Asset store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Generated-asset payload was neither a URL nor valid base64
    #[error("Invalid generated asset payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}

/// Identifier of one locally materialized, revocable blob handle
///
/// String form is `blob:<uuid>`, resolvable only through the registry
/// that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUrl {
    id: Uuid,
}

impl std::fmt::Display for BlobUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blob:{}", self.id)
    }
}

/// Registry of memory-backed blob handles
///
/// The decoded byte buffers behind locally materialized handles live
/// here. Revoking a handle removes the buffer; resolving a revoked
/// handle returns `None`.
#[derive(Clone, Default)]
pub struct BlobRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Arc<[u8]>>>>,
}

impl BlobRegistry {
    /// Materialize a new handle over the given bytes
    pub fn create(&self, bytes: Vec<u8>) -> BlobUrl {
        let id = Uuid::new_v4();
        self.inner
            .write()
            .expect("blob registry lock poisoned")
            .insert(id, Arc::from(bytes.into_boxed_slice()));
        BlobUrl { id }
    }

    /// Resolve a handle to its backing bytes, if still live
    pub fn resolve(&self, url: &BlobUrl) -> Option<Arc<[u8]>> {
        self.inner
            .read()
            .expect("blob registry lock poisoned")
            .get(&url.id)
            .cloned()
    }

    /// Release a handle; returns true if it was still live
    pub fn revoke(&self, url: &BlobUrl) -> bool {
        self.inner
            .write()
            .expect("blob registry lock poisoned")
            .remove(&url.id)
            .is_some()
    }

    /// Number of currently live handles
    pub fn live_handles(&self) -> usize {
        self.inner.read().expect("blob registry lock poisoned").len()
    }
}

/// Viewable handle for the generated asset
///
/// Either a pass-through remote URL or a locally materialized blob
/// handle created by decoding the payload.
#[derive(Debug, Clone)]
pub enum AssetHandle {
    /// Remote URL used directly, nothing to release
    Remote(String),
    /// Locally materialized handle owned by the store's registry
    Blob(BlobUrl),
}

impl AssetHandle {
    /// URL form the renderer consumes
    pub fn url(&self) -> String {
        match self {
            AssetHandle::Remote(url) => url.clone(),
            AssetHandle::Blob(blob) => blob.to_string(),
        }
    }
}

/// The user's original upload
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Encoded image bytes (data-URI form)
    pub data: String,
    /// Display name of the uploaded file
    pub name: String,
    /// Width/height ratio, `None` if undeterminable
    pub aspect_ratio: Option<f64>,
}

#[derive(Default)]
struct StoreInner {
    stage: PipelineStage,
    source: Option<SourceImage>,
    generated_payload: Option<String>,
    generated_handle: Option<AssetHandle>,
    captured_view: Option<String>,
    enhanced_result: Option<String>,
    error: Option<String>,
    job_id: Option<String>,
    job_progress: String,
}

/// Shared session state for one pipeline run
pub struct AssetStore {
    inner: RwLock<StoreInner>,
    blobs: BlobRegistry,
    events: EventBus,
}

impl AssetStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            blobs: BlobRegistry::default(),
            events,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().expect("asset store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().expect("asset store lock poisoned")
    }

    /// Current pipeline stage
    pub fn stage(&self) -> PipelineStage {
        self.read().stage
    }

    /// Advance the stage (orchestrator only)
    ///
    /// Deliberately does NOT touch the error field: errors are cleared
    /// by explicit user actions, never by background transitions.
    pub(crate) fn set_stage(&self, new_stage: PipelineStage) {
        let old_stage = {
            let mut inner = self.write();
            let old = inner.stage;
            inner.stage = new_stage;
            old
        };
        if old_stage != new_stage {
            tracing::debug!(from = %old_stage, to = %new_stage, "pipeline stage changed");
            self.events.emit_lossy(PipelineEvent::StageChanged {
                old_stage,
                new_stage,
                timestamp: Utc::now(),
            });
        }
    }

    /// Replace the source image unconditionally
    pub fn set_source_image(&self, data: String, name: String, aspect_ratio: Option<f64>) {
        self.write().source = Some(SourceImage {
            data,
            name,
            aspect_ratio,
        });
        self.emit_stored(AssetKind::SourceImage);
    }

    pub fn source_image(&self) -> Option<SourceImage> {
        self.read().source.clone()
    }

    /// Install (or clear) the generated 3D asset
    ///
    /// A payload beginning with a URL scheme is used directly as the
    /// viewable handle; anything else is decoded as base64 and
    /// materialized into a fresh blob handle. The previously
    /// materialized handle, if any, is released first. Decode happens
    /// before the write lock is taken so a bad payload never releases
    /// the old handle.
    pub fn set_generated_asset(&self, payload: Option<String>) -> Result<(), StoreError> {
        let replacement = match &payload {
            None => None,
            Some(p) if p.starts_with("http://") || p.starts_with("https://") => {
                Some(AssetHandle::Remote(p.clone()))
            }
            Some(p) => {
                let bytes = BASE64.decode(p.as_bytes())?;
                Some(AssetHandle::Blob(self.blobs.create(bytes)))
            }
        };

        let released = {
            let mut inner = self.write();
            let old = inner.generated_handle.take();
            inner.generated_payload = payload;
            inner.generated_handle = replacement;
            old
        };
        if let Some(AssetHandle::Blob(old_blob)) = released {
            self.blobs.revoke(&old_blob);
        }

        self.emit_stored(AssetKind::GeneratedAsset);
        Ok(())
    }

    /// Viewable handle for the generated asset, if one is installed
    pub fn generated_handle(&self) -> Option<AssetHandle> {
        self.read().generated_handle.clone()
    }

    pub fn generated_payload(&self) -> Option<String> {
        self.read().generated_payload.clone()
    }

    /// Decoded bytes behind a locally materialized handle
    ///
    /// `None` for remote handles and after release.
    pub fn generated_bytes(&self) -> Option<Arc<[u8]>> {
        match self.read().generated_handle.as_ref()? {
            AssetHandle::Remote(_) => None,
            AssetHandle::Blob(blob) => self.blobs.resolve(blob),
        }
    }

    pub fn set_captured_view(&self, data: Option<String>) {
        self.write().captured_view = data;
        self.emit_stored(AssetKind::CapturedView);
    }

    pub fn captured_view(&self) -> Option<String> {
        self.read().captured_view.clone()
    }

    pub fn set_enhanced_result(&self, data: Option<String>) {
        self.write().enhanced_result = data;
        self.emit_stored(AssetKind::EnhancedResult);
    }

    pub fn enhanced_result(&self) -> Option<String> {
        self.read().enhanced_result.clone()
    }

    /// Publish a user-facing error message
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.write().error = Some(message.clone());
        self.events.emit_lossy(PipelineEvent::ErrorRaised {
            message,
            timestamp: Utc::now(),
        });
    }

    pub fn clear_error(&self) {
        self.write().error = None;
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn set_job_id(&self, id: Option<String>) {
        self.write().job_id = id;
    }

    pub fn job_id(&self) -> Option<String> {
        self.read().job_id.clone()
    }

    /// Human-readable progress line shown while a job is polling
    pub fn set_job_progress(&self, message: impl Into<String>) {
        self.write().job_progress = message.into();
    }

    pub fn job_progress(&self) -> String {
        self.read().job_progress.clone()
    }

    /// Release all handles and return every field to first-load state
    pub fn reset(&self) {
        let released = {
            let mut inner = self.write();
            let old = inner.generated_handle.take();
            *inner = StoreInner::default();
            old
        };
        if let Some(AssetHandle::Blob(old_blob)) = released {
            self.blobs.revoke(&old_blob);
        }
        self.events.emit_lossy(PipelineEvent::PipelineReset {
            timestamp: Utc::now(),
        });
    }

    /// Registry backing locally materialized handles
    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    fn emit_stored(&self, kind: AssetKind) {
        self.events.emit_lossy(PipelineEvent::AssetStored {
            kind,
            timestamp: Utc::now(),
        });
    }
}
