//! Detached, resumable archive transfers
//!
//! A [`BackgroundTransfer`] runs one download on its own tokio task. Byte
//! progress is reported over an unbounded channel and the final result over a
//! oneshot channel, so callers simply await [`BackgroundTransfer::wait`].
//! Dropping the handle aborts the task; the partial file stays in staging and
//! can be resumed by the next transfer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::client::{RemoteMeta, RemoteStore, TransferProgress};
use crate::errors::{DownloadError, DownloadResult};

/// Handle to a download running on a background task
#[derive(Debug)]
pub struct BackgroundTransfer {
    remote_path: String,
    destination: PathBuf,
    progress_rx: mpsc::UnboundedReceiver<TransferProgress>,
    completion_rx: oneshot::Receiver<DownloadResult<RemoteMeta>>,
    handle: JoinHandle<()>,
}

impl BackgroundTransfer {
    /// Spawn the transfer of `remote_path` into `destination`
    pub fn start(
        remote: Arc<dyn RemoteStore>,
        remote_path: impl Into<String>,
        destination: impl Into<PathBuf>,
        resume: bool,
    ) -> Self {
        let remote_path = remote_path.into();
        let destination = destination.into();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = oneshot::channel();

        let task_path = remote_path.clone();
        let task_destination = destination.clone();
        let handle = tokio::spawn(async move {
            let result = remote
                .download(&task_path, &task_destination, resume, Some(&progress_tx))
                .await;
            debug!("Background transfer of {} finished: ok={}", task_path, result.is_ok());
            let _ = completion_tx.send(result);
        });

        Self {
            remote_path,
            destination,
            progress_rx,
            completion_rx,
            handle,
        }
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Await completion, forwarding every progress event to `forward`
    pub async fn wait(
        mut self,
        forward: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<RemoteMeta> {
        let result = loop {
            tokio::select! {
                biased;
                Some(progress) = self.progress_rx.recv() => {
                    if let Some(tx) = forward {
                        let _ = tx.send(progress);
                    }
                }
                result = &mut self.completion_rx => break result,
            }
        };

        // Progress sent just before completion
        while let Ok(progress) = self.progress_rx.try_recv() {
            if let Some(tx) = forward {
                let _ = tx.send(progress);
            }
        }

        result.unwrap_or_else(|_| {
            Err(DownloadError::TransferLost {
                path: self.remote_path.clone(),
            })
        })
    }

    /// Stop the transfer; the partial file is left for a later resume
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for BackgroundTransfer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
