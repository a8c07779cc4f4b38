//! File upload port and transfer progress reporting.
//!
//! Implementations report progress from real transfer events (bytes handed
//! to the transport), never from a timer. The reporter enforces the
//! contract: values are non-decreasing, capped at 100, and 100 is only
//! reached through [`ProgressReporter::complete`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::foundation::UserId;
use crate::domain::messaging::{Attachment, MessagingError, SelectedFile};

type ProgressSink = dyn Fn(u8) + Send + Sync;

/// Monotonic percentage reporter handed to an uploader.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<ProgressSink>,
    high_water: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn new(sink: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            high_water: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Reporter that discards every value.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Reports `transferred` out of `total` bytes.
    ///
    /// Stays at 99 or below until the upload is acknowledged.
    pub fn report_bytes(&self, transferred: u64, total: u64) {
        let percent = if total == 0 {
            0
        } else {
            ((transferred.min(total) * 100) / total).min(99) as u8
        };
        self.forward(percent);
    }

    /// Reports the upload as acknowledged by the server.
    pub fn complete(&self) {
        self.forward(100);
    }

    /// Highest value reported so far.
    pub fn current(&self) -> u8 {
        self.high_water.load(Ordering::SeqCst)
    }

    fn forward(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.high_water.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            (self.sink)(percent);
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("current", &self.current())
            .finish()
    }
}

/// Port for turning a selected file into a durable attachment.
#[async_trait]
pub trait FileUploader: Send + Sync {
    /// Uploads `file`, reporting progress as bytes are transferred.
    ///
    /// # Errors
    ///
    /// - `Upload(Rejected)` if the server refuses the file
    /// - `Upload(Transfer)` or `Network` on transport failure
    async fn upload(
        &self,
        viewer: &UserId,
        file: &SelectedFile,
        progress: ProgressReporter,
    ) -> Result<Attachment, MessagingError>;
}
