//! Conversation Logger
//!
//! Writes one JSON record per successful, logging-enabled session for audit
//! and replay. The session treats write failures as warnings.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::Result;
use crate::message::Message;

/// Persisted session record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub session_id: Uuid,
    pub task: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub api_url: String,

    /// Trimmed conversation (exemplar turns removed)
    pub conversation_history: Vec<Message>,

    pub final_response: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Writes log records into a directory
#[derive(Clone, Debug)]
pub struct ConversationLogger {
    dir: PathBuf,
}

impl ConversationLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a record: creation timestamp, then the session id
    pub fn file_name(record: &LogRecord) -> String {
        format!(
            "conversation_{}_{}.json",
            record.created_at.format("%Y%m%d_%H%M%S_%3f"),
            record.session_id.simple()
        )
    }

    /// Write a record, creating the directory if needed.
    ///
    /// Never overwrites: an existing file with the same name is an error.
    pub async fn write(&self, record: &LogRecord) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(record));
        let body = serde_json::to_vec_pretty(record)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&body).await?;
        file.flush().await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> LogRecord {
        LogRecord {
            session_id: Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef),
            task: "2+2".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            top_p: 1.0,
            max_tokens: 500,
            api_url: "https://example.test/v1/chat/completions".into(),
            conversation_history: vec![
                Message::system("<CURRENT_TASK>\n2+2"),
                Message::assistant(Some("4 <DONE>".into()), vec![]),
            ],
            final_response: Some("4".into()),
            created_at: Utc.with_ymd_and_hms(2024, 11, 3, 14, 5, 9).unwrap(),
        }
    }

    #[test]
    fn test_file_name_uses_timestamp_and_session() {
        let name = ConversationLogger::file_name(&record());
        assert_eq!(
            name,
            "conversation_20241103_140509_000_0123456789abcdef0123456789abcdef.json"
        );
    }

    #[tokio::test]
    async fn test_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ConversationLogger::new(dir.path().join("logs"));

        let path = logger.write(&record()).await.unwrap();
        assert!(path.starts_with(dir.path().join("logs")));

        let written: LogRecord = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, record());
    }

    #[tokio::test]
    async fn test_same_millisecond_sessions_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ConversationLogger::new(dir.path());

        let first = record();
        let mut second = record();
        second.session_id = Uuid::new_v4();
        second.task = "3+3".into();

        let a = logger.write(&first).await.unwrap();
        let b = logger.write(&second).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        // a repeated record is refused rather than overwritten
        assert!(logger.write(&first).await.is_err());
        let kept: LogRecord = serde_json::from_slice(&std::fs::read(&a).unwrap()).unwrap();
        assert_eq!(kept, first);
    }

    #[tokio::test]
    async fn test_write_into_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let logger = ConversationLogger::new(blocker.join("logs"));
        assert!(logger.write(&record()).await.is_err());
    }
}
