//! Persists the raw audio bytes of a finalized utterance to disk so a
//! `ChatMessage` row can carry a non-null `audio_file_path`.

use std::path::{Path, PathBuf};

use aitoys_domain::{Error, Result};
use uuid::Uuid;

pub struct AudioArchive {
    root: PathBuf,
}

impl AudioArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes `bytes` under `<root>/<agent_id>/<uuid>.pcm` and returns the
    /// path as a string suitable for `ChatMessage.audio_path`.
    pub async fn store(&self, agent_id: i64, bytes: &[u8]) -> Result<String> {
        let dir = self.root.join(agent_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.pcm", Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        path.to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Other("audio archive path is not valid UTF-8".into()))
    }
}

pub fn default_root() -> PathBuf {
    Path::new("data").join("audio")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_bytes_under_agent_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = AudioArchive::new(dir.path());
        let path = archive.store(42, b"\x00\x01\x02\x03").await.unwrap();
        assert!(path.contains("42"));
        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents, b"\x00\x01\x02\x03");
    }
}
