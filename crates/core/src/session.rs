//! Per-run scratch directory for audio, frames and the transcript.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

pub fn get_root_session_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("glimpse")
        .join("sessions")
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    root: PathBuf,
    keep: bool,
}

impl Session {
    pub fn create() -> Result<Self> {
        Self::create_in(&get_root_session_dir())
    }

    pub fn create_in(base: &Path) -> Result<Self> {
        let id = Uuid::new_v4();
        let root = base.join(id.to_string());
        std::fs::create_dir_all(root.join("frames"))?;
        debug!(session = %id, path = %root.display(), "session created");

        Ok(Self {
            id,
            root,
            keep: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Leave the directory on disk when the session is dropped.
    pub fn keep(&mut self) {
        self.keep = true;
    }

    pub fn audio_path(&self) -> PathBuf {
        self.root.join("audio.wav")
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.root.join("transcript.json")
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            warn!(session = %self.id, error = %e, "failed to remove session directory");
        }
    }
}
