//! Fixture persistence

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{FixtureDocument, TestRecording};
use crate::Result;

/// Storage for fixture documents
///
/// The harness only ever needs whole-document reads and writes; merging a
/// single test case's entry is done by [`save_recording`] on top of these.
pub trait FixtureStore: Send + Sync {
    /// Whether a fixture exists at `path`
    fn exists(&self, path: &Path) -> impl Future<Output = Result<bool>> + Send;

    /// Read and parse the fixture at `path`
    fn read(&self, path: &Path) -> impl Future<Output = Result<FixtureDocument>> + Send;

    /// Replace the fixture at `path` with `doc`
    fn write(&self, path: &Path, doc: &FixtureDocument) -> impl Future<Output = Result<()>> + Send;
}

/// Fixture store backed by JSON files on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileStore;

impl JsonFileStore {
    /// Create a new store
    pub fn new() -> Self {
        Self
    }
}

impl FixtureStore for JsonFileStore {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn read(&self, path: &Path) -> Result<FixtureDocument> {
        let raw = tokio::fs::read_to_string(path).await?;
        FixtureDocument::from_json(path, &raw)
    }

    async fn write(&self, path: &Path, doc: &FixtureDocument) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = doc.to_json()?;

        // Rename within the same directory so readers never see a partial file
        let staging = staging_path(path);
        tokio::fs::write(&staging, contents.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&staging, path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        debug!("Wrote fixture {} ({} test cases)", path.display(), doc.len());
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Store `recording` under `title`, keeping every other test case's entry
///
/// An existing fixture is read in full, the entry for `title` is replaced
/// wholesale and the whole document is written back. Without an existing
/// fixture a new one-entry document is written.
///
/// # Errors
///
/// Returns error if the existing fixture cannot be read or parsed, or if the
/// write fails
pub async fn save_recording<S: FixtureStore>(
    store: &S,
    path: &Path,
    title: &str,
    recording: TestRecording,
) -> Result<()> {
    let mut doc = if store.exists(path).await? {
        store.read(path).await?
    } else {
        FixtureDocument::new()
    };

    let replaced = doc.upsert(title, recording);
    debug!(
        "Saving recording for {:?} ({})",
        title,
        if replaced.is_some() { "replaced" } else { "new" }
    );

    store.write(path, &doc).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{ApiRecord, Body};
    use crate::hosts::HostIndex;
    use crate::AutostubError;
    use serde_json::json;
    use tempfile::TempDir;

    fn recording(timestamp: &str, urls: &[&str]) -> TestRecording {
        TestRecording {
            timestamp: timestamp.to_string(),
            records: urls
                .iter()
                .map(|url| ApiRecord {
                    url: (*url).to_string(),
                    method: "POST".to_string(),
                    status: 200,
                    request: Body::new(json!({"q": url})),
                    response: Body::new(json!({"ok": true})),
                    match_host_index: HostIndex::at(0),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_exists_and_read_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new();
        let path = temp_dir.path().join("missing.api.snapshot.json");

        assert!(!store.exists(&path).await.unwrap());
        assert!(matches!(
            store.read(&path).await.unwrap_err(),
            AutostubError::Io(_)
        ));
    }

    #[tokio::test]
    async fn test_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new();
        let path = temp_dir.path().join("nested/dir/login.api.snapshot.json");

        let mut doc = FixtureDocument::new();
        doc.upsert("login works", recording("t1", &["/session"]));
        store.write(&path, &doc).await.unwrap();

        assert!(store.exists(&path).await.unwrap());
        assert_eq!(store.read(&path).await.unwrap(), doc);
        assert!(!staging_path(&path).exists());
    }

    #[tokio::test]
    async fn test_read_malformed_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new();
        let path = temp_dir.path().join("broken.api.snapshot.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = store.read(&path).await.unwrap_err();
        assert!(matches!(err, AutostubError::MalformedFixture { .. }));
    }

    #[tokio::test]
    async fn test_save_recording_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new();
        let path = temp_dir.path().join("a.api.snapshot.json");

        save_recording(&store, &path, "A", recording("t1", &["/a"]))
            .await
            .unwrap();

        let doc = store.read(&path).await.unwrap();
        assert_eq!(doc.titles().collect::<Vec<_>>(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_save_recording_merges() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new();
        let path = temp_dir.path().join("ab.api.snapshot.json");

        save_recording(&store, &path, "A", recording("t1", &["/a1", "/a2"]))
            .await
            .unwrap();
        save_recording(&store, &path, "B", recording("t1", &["/b1"]))
            .await
            .unwrap();
        let b_before = store.read(&path).await.unwrap().get("B").cloned();

        save_recording(&store, &path, "A", recording("t2", &["/a3"]))
            .await
            .unwrap();

        let doc = store.read(&path).await.unwrap();
        assert_eq!(doc.get("B").cloned(), b_before);
        let a = doc.get("A").unwrap();
        assert_eq!(a.timestamp, "t2");
        assert_eq!(
            a.records.iter().map(|r| r.url.as_str()).collect::<Vec<_>>(),
            vec!["/a3"]
        );
    }

    #[tokio::test]
    async fn test_save_recording_keeps_other_entries_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new();
        let path = temp_dir.path().join("ab.api.snapshot.json");
        let b = r#"{
            "timestamp": "2024-01-01T00:00:00.000Z",
            "note": "edited by hand",
            "records": [{
                "url": "/b", "method": "POST", "status": 200,
                "request": {"body": {"price": 0.1}},
                "response": {"body": {"z": 1, "id": 123456789012345678901234567890, "a": 2}},
                "matchHostIndex": 0,
                "duration": 42
            }]
        }"#;
        tokio::fs::write(&path, format!(r#"{{"B": {b}}}"#))
            .await
            .unwrap();

        save_recording(&store, &path, "A", recording("t1", &["/a"]))
            .await
            .unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("123456789012345678901234567890"));
        let written: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let original: serde_json::Value = serde_json::from_str(b).unwrap();
        assert_eq!(written["B"], original);
        assert_eq!(written["B"]["records"][0]["duration"], json!(42));
        assert_eq!(written["A"]["records"][0]["url"], json!("/a"));
    }

    #[tokio::test]
    async fn test_save_recording_refuses_to_clobber_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new();
        let path = temp_dir.path().join("broken.api.snapshot.json");
        tokio::fs::write(&path, "[1, 2").await.unwrap();

        let result = save_recording(&store, &path, "A", recording("t", &["/a"])).await;
        assert!(result.is_err());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "[1, 2");
    }
}
