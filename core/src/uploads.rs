use std::collections::HashMap;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rand::Rng;
use serde::Serialize;

use crate::error::AgentError;

pub const CHUNK_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Active,
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSession {
    pub game_name: String,
    pub total_size: u64,
    pub files: Vec<FileEntry>,
    pub transferred_bytes: u64,
    pub current_file: Option<String>,
    pub status: UploadStatus,
    pub install_path: PathBuf,
}

impl UploadSession {
    /// Percent complete, `100` for a zero-byte upload per the spec's
    /// boundary behavior.
    pub fn progress(&self) -> u8 {
        if self.total_size == 0 {
            return 100;
        }
        ((self.transferred_bytes.min(self.total_size) * 100) / self.total_size) as u8
    }
}

/// Owned by the connection handler for the single authorized Hub; keyed by
/// `uploadId`. All writes are constrained to stay under each session's
/// `install_path`.
pub struct UploadRegistry {
    install_root: PathBuf,
    sessions: Mutex<HashMap<String, UploadSession>>,
}

pub struct OpenedUpload {
    pub upload_id: String,
    pub chunk_size: u64,
}

pub struct WrittenChunk {
    pub bytes_written: u64,
    pub total_written: u64,
}

pub struct CompletedUpload {
    pub path: PathBuf,
    pub game_name: String,
}

impl UploadRegistry {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self { install_root: install_root.into(), sessions: Mutex::new(HashMap::new()) }
    }

    /// Allocate a session and create `installPath` (with parents) on disk.
    pub fn open(
        &self,
        game_name: &str,
        total_size: u64,
        files: Vec<FileEntry>,
    ) -> Result<OpenedUpload, AgentError> {
        let install_path = self.install_root.join(game_name);
        std::fs::create_dir_all(&install_path)?;

        let upload_id = generate_upload_id();
        let session = UploadSession {
            game_name: game_name.to_string(),
            total_size,
            files,
            transferred_bytes: 0,
            current_file: None,
            status: UploadStatus::Active,
            install_path,
        };
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior call panicked")]
        self.sessions.lock().unwrap().insert(upload_id.clone(), session);
        Ok(OpenedUpload { upload_id, chunk_size: CHUNK_SIZE })
    }

    /// Resolve `rel_path` under the session's `install_path`, rejecting any
    /// path that would escape it, then write `bytes` at `offset`.
    pub fn write_chunk(
        &self,
        upload_id: &str,
        rel_path: &str,
        offset: u64,
        bytes: &[u8],
    ) -> Result<WrittenChunk, AgentError> {
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior call panicked")]
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(upload_id).ok_or(AgentError::UploadNotFound)?;

        let full_path = resolve_under(&session.install_path, rel_path)?;
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(offset == 0)
            .open(&full_path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;

        session.transferred_bytes += bytes.len() as u64;
        session.current_file = Some(rel_path.to_string());

        Ok(WrittenChunk {
            bytes_written: bytes.len() as u64,
            total_written: session.transferred_bytes,
        })
    }

    /// Mark the session complete and remove it from the registry. Setting
    /// executable bits for a shortcut target is the caller's responsibility
    /// (the registry only reports the resolved path).
    pub fn complete(&self, upload_id: &str) -> Result<CompletedUpload, AgentError> {
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior call panicked")]
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.remove(upload_id).ok_or(AgentError::UploadNotFound)?;
        Ok(CompletedUpload { path: session.install_path, game_name: session.game_name })
    }

    /// Idempotent: cancelling an unknown or already-removed session is a
    /// successful no-op.
    pub fn cancel(&self, upload_id: &str) -> Result<(), AgentError> {
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior call panicked")]
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.remove(upload_id) {
            let _ = std::fs::remove_dir_all(&session.install_path);
        }
        Ok(())
    }

    pub fn progress(&self, upload_id: &str) -> Option<u8> {
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior call panicked")]
        let sessions = self.sessions.lock().unwrap();
        sessions.get(upload_id).map(UploadSession::progress)
    }

    #[cfg(test)]
    fn install_path_of(&self, upload_id: &str) -> Option<PathBuf> {
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior call panicked")]
        let sessions = self.sessions.lock().unwrap();
        sessions.get(upload_id).map(|s| s.install_path.clone())
    }
}

fn resolve_under(install_path: &Path, rel_path: &str) -> Result<PathBuf, AgentError> {
    let candidate = Path::new(rel_path);
    if candidate.is_absolute() || candidate.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(AgentError::PathEscapesInstallRoot);
    }
    Ok(install_path.join(candidate))
}

fn generate_upload_id() -> String {
    #[expect(clippy::unwrap_used, reason = "system clock is never before the unix epoch")]
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let rand_suffix: u32 = rand::rng().random_range(0..10_000);
    format!("upload-{now}-{rand_suffix:04}")
}
