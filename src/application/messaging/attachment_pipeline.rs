//! AttachmentPipeline - file selection and upload for one composer.
//!
//! ```text
//! Idle ──select──▶ FileSelected ──upload──▶ Uploading(0..100) ──▶ Uploaded
//!  ▲                 │   ▲                      │                    │
//!  └─────cancel──────┘   └──────failure─────────┘                    │
//!  ▲                                                                 │
//!  └──────────────────────────cancel / sent──────────────────────────┘
//! ```
//!
//! Cancel is refused while uploading. Tearing the composer down
//! ([`AttachmentPipeline::shutdown`], also run on drop) aborts an in-flight
//! transfer, stops progress delivery and discards whatever it would have
//! produced, so no attachment from it can be referenced later.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use crate::domain::foundation::{AttachmentId, StateMachine};
use crate::domain::messaging::{
    Attachment, MessagingError, SelectedFile, UploadError, UploadPolicy, Viewer,
};
use crate::ports::{FileUploader, ProgressReporter};

/// Current state of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentState {
    Idle,
    FileSelected {
        file: SelectedFile,
    },
    Uploading {
        file: SelectedFile,
        progress: u8,
    },
    Uploaded {
        file: SelectedFile,
        attachment: Attachment,
    },
}

impl AttachmentState {
    pub fn phase(&self) -> AttachmentPhase {
        match self {
            AttachmentState::Idle => AttachmentPhase::Idle,
            AttachmentState::FileSelected { .. } => AttachmentPhase::FileSelected,
            AttachmentState::Uploading { .. } => AttachmentPhase::Uploading,
            AttachmentState::Uploaded { .. } => AttachmentPhase::Uploaded,
        }
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        match self {
            AttachmentState::Idle => None,
            AttachmentState::FileSelected { file }
            | AttachmentState::Uploading { file, .. }
            | AttachmentState::Uploaded { file, .. } => Some(file),
        }
    }
}

/// Data-free view of [`AttachmentState`] for transition checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentPhase {
    Idle,
    FileSelected,
    Uploading,
    Uploaded,
}

impl StateMachine for AttachmentPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        use AttachmentPhase::*;
        matches!(
            (self, target),
            (Idle, FileSelected)
                | (FileSelected, FileSelected)
                | (FileSelected, Uploading)
                | (FileSelected, Idle)
                | (Uploading, Uploaded)
                | (Uploading, FileSelected)
                | (Uploaded, FileSelected)
                | (Uploaded, Idle)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use AttachmentPhase::*;
        match self {
            Idle => vec![FileSelected],
            FileSelected => vec![FileSelected, Uploading, Idle],
            Uploading => vec![Uploaded, FileSelected],
            Uploaded => vec![FileSelected, Idle],
        }
    }
}

struct Inner {
    state: AttachmentState,
    /// Bumped on teardown; stale transfers compare against it.
    generation: u64,
    task: Option<AbortHandle>,
    listeners: Vec<mpsc::UnboundedSender<u8>>,
}

impl Inner {
    fn emit(&mut self, percent: u8) {
        self.listeners.retain(|tx| tx.send(percent).is_ok());
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Aborts the transfer task if the awaiting future goes away and puts the
/// selected file back so the user can retry or cancel.
struct TransferGuard {
    inner: Arc<Mutex<Inner>>,
    generation: u64,
    task: AbortHandle,
    armed: bool,
}

impl TransferGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.task.abort();
        let mut inner = lock(&self.inner);
        if inner.generation != self.generation {
            return;
        }
        // Stale reporters compare against the generation and go quiet.
        inner.generation += 1;
        inner.task = None;
        let state = std::mem::replace(&mut inner.state, AttachmentState::Idle);
        inner.state = match state {
            AttachmentState::Uploading { file, .. } => {
                debug!(name = file.name(), "Upload abandoned by caller");
                AttachmentState::FileSelected { file }
            }
            other => other,
        };
    }
}

/// Attachment flow of one composer instance.
pub struct AttachmentPipeline {
    uploader: Arc<dyn FileUploader>,
    policy: UploadPolicy,
    inner: Arc<Mutex<Inner>>,
}

impl AttachmentPipeline {
    pub fn new(uploader: Arc<dyn FileUploader>, policy: UploadPolicy) -> Self {
        Self {
            uploader,
            policy,
            inner: Arc::new(Mutex::new(Inner {
                state: AttachmentState::Idle,
                generation: 0,
                task: None,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn state(&self) -> AttachmentState {
        lock(&self.inner).state.clone()
    }

    pub fn phase(&self) -> AttachmentPhase {
        lock(&self.inner).state.phase()
    }

    /// Picker filter hint. The server enforces the real limits.
    pub fn accept_filter(&self) -> String {
        self.policy.accept_filter()
    }

    /// Stream of progress percentages for uploads started from now on.
    ///
    /// Closed when the pipeline is shut down.
    pub fn progress_events(&self) -> mpsc::UnboundedReceiver<u8> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner).listeners.push(tx);
        rx
    }

    /// Selects a file, replacing any previous selection or upload.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` while an upload is in progress
    pub fn select_file(&self, file: SelectedFile) -> Result<(), MessagingError> {
        let mut inner = lock(&self.inner);
        let phase = inner.state.phase();
        if phase == AttachmentPhase::Uploading {
            return Err(MessagingError::invalid_transition(
                "cannot select a file while uploading",
            ));
        }
        phase
            .transition_to(AttachmentPhase::FileSelected)
            .map_err(|e| MessagingError::invalid_transition(e.to_string()))?;
        debug!(name = file.name(), mime_type = file.mime_type(), "File selected");
        inner.state = AttachmentState::FileSelected { file };
        Ok(())
    }

    /// Discards the selection or uploaded attachment and returns to idle.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` while an upload is in progress
    pub fn cancel(&self) -> Result<(), MessagingError> {
        let mut inner = lock(&self.inner);
        match inner.state.phase() {
            AttachmentPhase::Idle => Ok(()),
            AttachmentPhase::Uploading => Err(MessagingError::invalid_transition(
                "cannot cancel while uploading",
            )),
            AttachmentPhase::FileSelected | AttachmentPhase::Uploaded => {
                inner.state = AttachmentState::Idle;
                Ok(())
            }
        }
    }

    /// Uploads the selected file.
    ///
    /// Progress starts at 0, never decreases and ends at 100 on success.
    /// On failure, or when the returned future is dropped before it
    /// completes, the pipeline returns to `FileSelected` so the user can
    /// retry.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless a file is selected
    /// - `Upload` on any transfer failure, or `Upload(Cancelled)` if the
    ///   pipeline was shut down meanwhile
    pub async fn upload(&self, viewer: &Viewer) -> Result<Attachment, MessagingError> {
        let (file, generation) = {
            let mut inner = lock(&self.inner);
            let file = match &inner.state {
                AttachmentState::FileSelected { file } => file.clone(),
                other => {
                    return Err(MessagingError::invalid_transition(format!(
                        "cannot upload from {:?}",
                        other.phase()
                    )))
                }
            };
            inner.state = AttachmentState::Uploading {
                file: file.clone(),
                progress: 0,
            };
            inner.emit(0);
            (file, inner.generation)
        };

        let reporter = {
            let shared = self.inner.clone();
            ProgressReporter::new(move |percent| {
                let mut inner = lock(&shared);
                if inner.generation != generation {
                    return;
                }
                if let AttachmentState::Uploading { progress, .. } = &mut inner.state {
                    *progress = percent;
                }
                inner.emit(percent);
            })
        };

        let uploader = self.uploader.clone();
        let viewer_id = viewer.id.clone();
        let transfer_file = file.clone();
        let handle =
            tokio::spawn(async move { uploader.upload(&viewer_id, &transfer_file, reporter).await });
        let guard = TransferGuard {
            inner: self.inner.clone(),
            generation,
            task: handle.abort_handle(),
            armed: true,
        };
        lock(&self.inner).task = Some(handle.abort_handle());

        let outcome = handle.await;
        guard.disarm();

        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            return Err(UploadError::Cancelled.into());
        }
        inner.task = None;

        match outcome {
            Ok(Ok(attachment)) => {
                info!(
                    attachment_id = %attachment.id,
                    name = %attachment.name,
                    size_bytes = attachment.size_bytes,
                    "Attachment uploaded"
                );
                inner.state = AttachmentState::Uploaded {
                    file,
                    attachment: attachment.clone(),
                };
                Ok(attachment)
            }
            Ok(Err(e)) => {
                error!(name = file.name(), error = %e, "Attachment upload failed");
                inner.state = AttachmentState::FileSelected { file };
                Err(match e {
                    MessagingError::Upload(upload) => upload.into(),
                    other => UploadError::Transfer(other.to_string()).into(),
                })
            }
            Err(join_error) => {
                error!(name = file.name(), error = %join_error, "Attachment upload task failed");
                inner.state = AttachmentState::FileSelected { file };
                Err(if join_error.is_cancelled() {
                    UploadError::Cancelled.into()
                } else {
                    UploadError::Transfer("upload task failed".to_string()).into()
                })
            }
        }
    }

    /// The attachment to reference from the next message, uploading the
    /// selected file first if needed. `None` when nothing is selected.
    pub async fn ensure_uploaded(
        &self,
        viewer: &Viewer,
    ) -> Result<Option<Attachment>, MessagingError> {
        match self.state() {
            AttachmentState::Idle => Ok(None),
            AttachmentState::Uploaded { attachment, .. } => Ok(Some(attachment)),
            AttachmentState::FileSelected { .. } => self.upload(viewer).await.map(Some),
            AttachmentState::Uploading { .. } => Err(MessagingError::invalid_transition(
                "an upload is already in progress",
            )),
        }
    }

    /// Uploaded attachment id, if any.
    pub fn attachment_id(&self) -> Option<AttachmentId> {
        match &lock(&self.inner).state {
            AttachmentState::Uploaded { attachment, .. } => Some(attachment.id),
            _ => None,
        }
    }

    /// Clears the composer after the referencing message was sent.
    pub fn mark_sent(&self) {
        let mut inner = lock(&self.inner);
        if inner.state.phase() == AttachmentPhase::Uploaded {
            inner.state = AttachmentState::Idle;
        }
    }

    /// Tears the pipeline down: aborts any transfer, drops progress
    /// listeners and returns to idle.
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            debug!("Aborting in-flight upload");
            task.abort();
        }
        inner.listeners.clear();
        inner.state = AttachmentState::Idle;
    }
}

impl Drop for AttachmentPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
