//! Fixture documents of recorded API traffic
//!
//! One fixture file exists per spec file. It maps each test case's full title
//! to the traffic recorded the last time that test case passed in recording
//! mode.

mod store;

pub use store::{save_recording, FixtureStore, JsonFileStore};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::hosts::HostIndex;
use crate::{AutostubError, Result};

/// Suffix appended to every fixture file name
pub const FIXTURE_SUFFIX: &str = ".api.snapshot.json";

/// Request or response payload as observed by the browser
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Decoded body, `null` when the exchange carried none
    #[serde(default)]
    pub body: Value,
}

impl Body {
    /// Wrap a payload
    pub fn new(body: Value) -> Self {
        Self { body }
    }
}

/// One captured API exchange with its host stripped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecord {
    /// Path and query, without the matched host
    pub url: String,
    /// HTTP method as observed
    pub method: String,
    /// Response status code
    pub status: u16,
    /// Request payload
    #[serde(default)]
    pub request: Body,
    /// Response payload
    #[serde(default)]
    pub response: Body,
    /// Index of the host that was stripped from `url`
    pub match_host_index: HostIndex,
}

impl ApiRecord {
    /// Whether the record was captured from a GET request
    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// All traffic captured during one passing test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecording {
    /// When the recording was taken, e.g. `2024-03-01T10:15:30.123Z`
    pub timestamp: String,
    /// Captured records in completion order
    pub records: Vec<ApiRecord>,
}

impl TestRecording {
    /// Recording stamped with the current time
    pub fn now(records: Vec<ApiRecord>) -> Self {
        Self {
            timestamp: timestamp_now(),
            records,
        }
    }
}

/// Current UTC time in JSON date format (milliseconds, `Z` suffix)
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fixture file contents: test-case title to recording
///
/// Entries read from a file keep their original JSON. Writing the document
/// back emits those entries as they were read, fields this crate does not
/// model included, and only entries replaced through [`FixtureDocument::upsert`]
/// are serialized from their [`TestRecording`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureDocument {
    entries: BTreeMap<String, Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    recording: TestRecording,
    source: Option<Value>,
}

impl Entry {
    fn fresh(recording: TestRecording) -> Self {
        Self {
            recording,
            source: None,
        }
    }
}

// Equality is over the recordings; unmodelled fields are not compared
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.recording == other.recording
    }
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.source {
            Some(source) => source.serialize(serializer),
            None => self.recording.serialize(serializer),
        }
    }
}

impl Serialize for FixtureDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FixtureDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut entries = BTreeMap::new();

        for (title, source) in raw {
            let recording = TestRecording::deserialize(&source)
                .map_err(|e| de::Error::custom(format!("test case {title:?}: {e}")))?;
            entries.insert(
                title,
                Entry {
                    recording,
                    source: Some(source),
                },
            );
        }

        Ok(Self { entries })
    }
}

impl FixtureDocument {
    /// Empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Recording for a test-case title
    pub fn get(&self, title: &str) -> Option<&TestRecording> {
        self.entries.get(title).map(|entry| &entry.recording)
    }

    /// Whether a recording exists for a test-case title
    pub fn contains(&self, title: &str) -> bool {
        self.entries.contains_key(title)
    }

    /// Replace the whole entry for `title`, returning the previous one
    pub fn upsert(
        &mut self,
        title: impl Into<String>,
        recording: TestRecording,
    ) -> Option<TestRecording> {
        self.entries
            .insert(title.into(), Entry::fresh(recording))
            .map(|entry| entry.recording)
    }

    /// Titles with a recording, in sorted order
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TestRecording)> {
        self.entries
            .iter()
            .map(|(title, entry)| (title.as_str(), &entry.recording))
    }

    /// Number of recorded test cases
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no test case is recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of records across all test cases
    pub fn total_records(&self) -> usize {
        self.entries
            .values()
            .map(|entry| entry.recording.records.len())
            .sum()
    }

    /// Parse a document, attributing failures to `path`
    ///
    /// # Errors
    ///
    /// Returns `MalformedFixture` if the JSON does not have the fixture shape
    pub fn from_json(path: &Path, raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| AutostubError::MalformedFixture {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Pretty-printed JSON with a trailing newline
    ///
    /// # Errors
    ///
    /// Returns error if a body cannot be serialized
    pub fn to_json(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }
}

/// Spec file a test case belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFile {
    relative: String,
}

impl SpecFile {
    /// Spec path relative to the test-runner root, e.g. `integration/login.spec.ts`
    pub fn new(relative: impl Into<String>) -> Self {
        Self {
            relative: relative.into().replace('\\', "/"),
        }
    }

    /// Path as given
    pub fn as_str(&self) -> &str {
        &self.relative
    }

    /// Fixture file name: folder prefix and spec suffix removed, fixture suffix added
    ///
    /// # Errors
    ///
    /// Returns `InvalidSpecPath` if nothing is left once prefix and suffix are
    /// removed, or if the remainder would escape the fixtures directory
    pub fn fixture_name(&self, integration_folder: &str, spec_suffix: &str) -> Result<String> {
        let name = self.relative.replacen(integration_folder, "", 1);
        let name = name.replacen(spec_suffix, "", 1);
        let name = name.trim_start_matches('/');

        if name.is_empty() {
            return Err(AutostubError::InvalidSpecPath(format!(
                "{:?} has no name once {integration_folder:?} and {spec_suffix:?} are removed",
                self.relative
            )));
        }

        if name.split('/').any(|part| part == "..") {
            return Err(AutostubError::InvalidSpecPath(format!(
                "{:?} escapes the fixtures directory",
                self.relative
            )));
        }

        Ok(format!("{name}{FIXTURE_SUFFIX}"))
    }

    /// Full fixture path under `fixtures_dir`
    ///
    /// # Errors
    ///
    /// See [`SpecFile::fixture_name`]
    pub fn fixture_path(
        &self,
        fixtures_dir: &Path,
        integration_folder: &str,
        spec_suffix: &str,
    ) -> Result<PathBuf> {
        let name = self.fixture_name(integration_folder, spec_suffix)?;
        Ok(fixtures_dir.join(name))
    }
}
