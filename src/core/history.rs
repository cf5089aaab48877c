//! Whole-transcript persistence at a fixed path.
//!
//! The transcript is serialized as a JSON message array and rewritten after
//! every change. Loading reconstitutes timestamps from their serialized form
//! and falls back to the seeded transcript when the file is absent or
//! malformed.

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;

use crate::core::error::ChatError;
use crate::core::message::Message;
use crate::core::transcript::Transcript;

pub struct HistoryStore {
    path: PathBuf,
    greeting: String,
}

impl HistoryStore {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            path: Self::default_path(),
            greeting: greeting.into(),
        }
    }

    /// A store rooted at an explicit path, used by tests.
    pub fn at_path(path: PathBuf, greeting: impl Into<String>) -> Self {
        Self {
            path,
            greeting: greeting.into(),
        }
    }

    fn default_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "causette")
            .expect("Failed to determine data directory");
        proj_dirs.data_dir().join("transcript.json")
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Reads the transcript file. Absent or malformed state yields the seeded
    /// transcript; corruption is logged, never surfaced.
    pub fn load(&self) -> Transcript {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return Transcript::seeded(&self.greeting),
        };

        match serde_json::from_str::<Vec<Message>>(&contents) {
            Ok(messages) => Transcript::from_messages(messages, &self.greeting),
            Err(e) => {
                tracing::warn!("discarding malformed transcript file: {e}");
                Transcript::seeded(&self.greeting)
            }
        }
    }

    /// Serializes the full transcript and rewrites the file.
    pub fn save(&self, transcript: &Transcript) -> Result<(), ChatError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ChatError::Persist(e.to_string()))?;
        }
        let contents = serde_json::to_string(transcript.messages())
            .map_err(|e| ChatError::Persist(e.to_string()))?;
        fs::write(&self.path, contents).map_err(|e| ChatError::Persist(e.to_string()))?;
        Ok(())
    }
}
