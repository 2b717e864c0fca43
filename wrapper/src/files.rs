//! The wrapper's on-disk publications: the raw PTY buffer, its
//! metadata sidecar, and the numbered line-log dump.
//!
//! Hooks read the raw buffer to recover the exact terminal rendering
//! of a prompt (ANSI intact); the metadata sidecar records the last
//! write time; the lines file exists for debugging and the session
//! discovery path. All three are named by the *current* agent session
//! id and are re-targeted when the identity changes.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use slackline_common::Config;

pub struct SessionFiles {
    config: Config,
    session_id: String,
    raw: File,
}

impl SessionFiles {
    pub fn create(config: &Config, session_id: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.log_dir)?;
        let raw = open_buffer(config, session_id)?;
        Ok(Self {
            config: config.clone(),
            session_id: session_id.to_string(),
            raw,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn buffer_path(&self) -> PathBuf {
        self.config.buffer_file_path(&self.session_id)
    }

    pub fn lines_path(&self) -> PathBuf {
        self.config.lines_file_path(&self.session_id)
    }

    /// Append one raw PTY chunk and refresh the metadata sidecar.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.raw.write_all(chunk)?;
        self.raw.flush()?;
        self.write_meta()
    }

    fn write_meta(&self) -> std::io::Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let meta = serde_json::json!({
            "buffer_write_time": now,
            "session_id": self.session_id,
        });
        std::fs::write(
            self.config.buffer_meta_path(&self.session_id),
            meta.to_string(),
        )
    }

    /// Switch all files to a new session id after a session-identity
    /// change. The old files stay behind for late readers.
    pub fn retarget(&mut self, new_session_id: &str) -> std::io::Result<()> {
        self.raw = open_buffer(&self.config, new_session_id)?;
        self.session_id = new_session_id.to_string();
        self.write_meta()
    }
}

fn open_buffer(config: &Config, session_id: &str) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.buffer_file_path(session_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chunks_append_and_meta_tracks_the_session() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = Config::with_root(tmp.path());
        let mut files = SessionFiles::create(&config, "abc12345").expect("create");

        files.write_chunk(b"hello ").expect("write");
        files.write_chunk(b"world").expect("write");

        let raw = std::fs::read(config.buffer_file_path("abc12345")).expect("read");
        assert_eq!(raw, b"hello world");

        let meta: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(config.buffer_meta_path("abc12345")).expect("read"),
        )
        .expect("parse");
        assert_eq!(meta["session_id"], "abc12345");
        assert!(meta["buffer_write_time"].as_u64().is_some());
    }

    #[test]
    fn retarget_switches_to_new_files_and_keeps_old_ones() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = Config::with_root(tmp.path());
        let mut files = SessionFiles::create(&config, "abc12345").expect("create");
        files.write_chunk(b"before").expect("write");

        files
            .retarget("e537eb3d-1234-5678-abcd-ef1234567890")
            .expect("retarget");
        files.write_chunk(b"after").expect("write");

        let old = std::fs::read(config.buffer_file_path("abc12345")).expect("read");
        assert_eq!(old, b"before");
        let new = std::fs::read(
            config.buffer_file_path("e537eb3d-1234-5678-abcd-ef1234567890"),
        )
        .expect("read");
        assert_eq!(new, b"after");
        assert_eq!(files.session_id(), "e537eb3d-1234-5678-abcd-ef1234567890");
    }
}
