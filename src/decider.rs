//! Record/replay decision per test case

use std::borrow::Borrow;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fixture::{FixtureDocument, FixtureStore};
use crate::Result;

/// Operating mode for one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Hit the real backend and persist what was observed
    Record,
    /// Serve previously recorded responses
    Replay,
}

impl Mode {
    /// Check if mode is Record
    pub fn is_record(self) -> bool {
        matches!(self, Mode::Record)
    }

    /// Check if mode is Replay
    pub fn is_replay(self) -> bool {
        matches!(self, Mode::Replay)
    }

    /// Lowercase mode name, as serialized
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Record => "record",
            Mode::Replay => "replay",
        }
    }
}

/// Auto-recording switch as shown in logs: `ON` while recording, `OFF` while replaying
impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Record => f.write_str("ON"),
            Mode::Replay => f.write_str("OFF"),
        }
    }
}

/// Decide the mode for a test case
///
/// Records when forced, when the fixture file does not exist yet, or when the
/// fixture has no entry for `test_key`. `read_fixture` is only called in the
/// last case, and its errors are returned rather than treated as "no entry".
///
/// # Errors
///
/// Returns the error produced by `read_fixture`
pub fn decide<F, D>(
    forced: bool,
    fixture_exists: bool,
    read_fixture: F,
    test_key: &str,
) -> Result<Mode>
where
    F: FnOnce() -> Result<D>,
    D: Borrow<FixtureDocument>,
{
    if forced || !fixture_exists {
        return Ok(Mode::Record);
    }

    let doc = read_fixture()?;
    if doc.borrow().contains(test_key) {
        Ok(Mode::Replay)
    } else {
        Ok(Mode::Record)
    }
}

/// Decide the mode for a test case by consulting `store`
///
/// # Errors
///
/// Returns error if the existence check fails or the fixture cannot be read
pub async fn decide_mode<S: FixtureStore>(
    store: &S,
    forced: bool,
    fixture_path: &Path,
    test_key: &str,
) -> Result<Mode> {
    if forced {
        debug!("Recording forced for {:?}", test_key);
        return Ok(Mode::Record);
    }

    if !store.exists(fixture_path).await? {
        return Ok(Mode::Record);
    }

    let doc = store.read(fixture_path).await?;
    decide(false, true, || Ok(doc), test_key)
}
