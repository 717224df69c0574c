//! Terminal stand-ins for the viewer's buttons, alerts and downloads

use annotate_core::{Control, ControlSurface, DownloadHost, DownloadRequest, ExportError, Notifier};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// There are no buttons in a terminal; state changes are only logged.
pub struct LoggedControls;

impl ControlSurface for LoggedControls {
    fn set_enabled(&self, control: Control, enabled: bool) {
        debug!(control = control.element_id(), enabled, "Control state");
    }
}

pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn alert(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Writes downloads into a directory.
///
/// Without a save dialog an existing file is never overwritten; a numbered
/// name (`paper_annotated (1).pdf`) is picked instead.
pub struct DirectoryDownloads {
    dir: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn free_path(&self, filename: &str) -> PathBuf {
        let candidate = self.dir.join(filename);
        if !exists(&candidate).await {
            return candidate;
        }

        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{}", ext)),
            None => (filename, String::new()),
        };
        let mut n = 1;
        loop {
            let candidate = self.dir.join(format!("{} ({}){}", stem, n, ext));
            if !exists(&candidate).await {
                return candidate;
            }
            n += 1;
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[async_trait(?Send)]
impl DownloadHost for DirectoryDownloads {
    async fn download(&self, request: DownloadRequest) -> Result<(), ExportError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ExportError::Download(format!("{}: {}", self.dir.display(), e)))?;

        let path = if request.save_as {
            self.free_path(&request.filename).await
        } else {
            self.dir.join(&request.filename)
        };

        tokio::fs::write(&path, &request.bytes)
            .await
            .map_err(|e| ExportError::Download(format!("{}: {}", path.display(), e)))?;

        println!("{}", path.display());
        Ok(())
    }
}
