//! Per-test-case lifecycle
//!
//! The test runner calls [`Harness::before_each`] before every test body and
//! [`Harness::after_each`] once the outcome is known. Everything scoped to a
//! single test case (mode, in-flight counter, captured records) lives in the
//! returned [`TestContext`], so nothing leaks from one test case to the next.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::info;

use crate::capture::{InFlightCounter, TrafficCapture};
use crate::config::Config;
use crate::decider::{decide, Mode};
use crate::fixture::{save_recording, FixtureStore, SpecFile, TestRecording};
use crate::gate::CompletionGate;
use crate::hosts::HostList;
use crate::stub::{compile_patterns, Interceptor, ReplayPlan, StubInstaller};
use crate::{AutostubError, Result};

/// How a test case ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    /// All assertions held
    Passed,
    /// An assertion or command failed
    Failed,
    /// The test body did not run
    Skipped,
}

/// What teardown did with the fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownReport {
    /// The test case's entry was written
    Saved {
        /// Fixture path
        path: PathBuf,
        /// Number of records stored
        records: usize,
    },
    /// The fixture was not touched
    Unchanged,
}

/// State for the test case currently running
#[derive(Debug)]
pub struct TestContext {
    title: String,
    fixture_path: PathBuf,
    mode: Mode,
    capture: Arc<TrafficCapture>,
    gate: CompletionGate,
    replay_plan: Option<ReplayPlan>,
}

impl TestContext {
    /// Full test-case title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Fixture file for the spec file
    pub fn fixture_path(&self) -> &Path {
        &self.fixture_path
    }

    /// Mode chosen for this test case
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Observer to register with the interception layer
    pub fn observer(&self) -> Arc<TrafficCapture> {
        Arc::clone(&self.capture)
    }

    /// Requests currently in flight
    pub fn in_flight(&self) -> usize {
        self.capture.counter().current()
    }

    /// Stubs installed for replay; `None` while recording
    pub fn replay_plan(&self) -> Option<&ReplayPlan> {
        self.replay_plan.as_ref()
    }

    /// Wait until no API request is in flight, using the configured timeout
    ///
    /// # Errors
    ///
    /// Returns `QuiescenceTimeout` if requests are still in flight at the deadline
    pub async fn wait_for_api_requests(&self) -> Result<()> {
        self.gate.wait_for_quiescence(None).await
    }

    /// Wait until no API request is in flight, with an explicit timeout
    ///
    /// # Errors
    ///
    /// Returns `QuiescenceTimeout` if requests are still in flight at the deadline
    pub async fn wait_for_api_requests_within(&self, timeout: Duration) -> Result<()> {
        self.gate.wait_for_quiescence(Some(timeout)).await
    }
}

/// Record/replay lifecycle bound to a configuration and fixture store
pub struct Harness<S> {
    config: Config,
    store: S,
    hosts: HostList,
    patterns: Vec<Regex>,
}

impl<S: FixtureStore> Harness<S> {
    /// Create a harness
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: Config, store: S) -> Result<Self> {
        config.validate()?;
        let hosts = config.hosts();
        let patterns = compile_patterns(&config.stub_api_patterns)?;

        Ok(Self {
            config,
            store,
            hosts,
            patterns,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fixture store in use
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fixture path for a spec file
    ///
    /// # Errors
    ///
    /// Returns `InvalidSpecPath` if no fixture name can be derived
    pub fn fixture_path(&self, spec: &SpecFile) -> Result<PathBuf> {
        spec.fixture_path(
            &self.config.fixtures_dir,
            &self.config.integration_folder,
            &self.config.spec_suffix,
        )
    }

    /// Set up a test case: choose the mode and install routes or stubs
    ///
    /// # Errors
    ///
    /// Returns error if the fixture cannot be read or parsed, or if the
    /// interceptor rejects a route
    pub async fn before_each<I: Interceptor + ?Sized>(
        &self,
        spec: &SpecFile,
        title: &str,
        interceptor: &mut I,
    ) -> Result<TestContext> {
        let fixture_path = self.fixture_path(spec)?;
        let forced = self.config.force_api_recording;

        let exists = !forced && self.store.exists(&fixture_path).await?;
        let doc = if exists {
            Some(self.store.read(&fixture_path).await?)
        } else {
            None
        };
        let mode = decide(
            forced,
            exists,
            || {
                doc.as_ref().ok_or_else(|| {
                    AutostubError::Other("fixture read skipped".to_string())
                })
            },
            title,
        )?;

        info!("API auto recording: {mode}");

        // Deferred decrements run on the runtime driving setup
        let counter = InFlightCounter::new();
        let capture = Arc::new(TrafficCapture::new(
            mode,
            self.hosts.clone(),
            counter.clone(),
            self.config.settle,
        ));
        let gate = CompletionGate::new(counter, self.config.api_max_waiting_time());

        let replay_plan = match mode {
            Mode::Record => {
                info!("Use real API response.");
                StubInstaller::install_recording(interceptor, &self.patterns)?;
                None
            }
            Mode::Replay => {
                info!("Use recorded API response: {}", fixture_path.display());
                let recording = doc
                    .as_ref()
                    .and_then(|d| d.get(title))
                    .ok_or_else(|| AutostubError::MissingRecording {
                        path: fixture_path.clone(),
                        title: title.to_string(),
                    })?;
                Some(StubInstaller::install_replay(
                    interceptor,
                    recording,
                    &self.hosts,
                )?)
            }
        };

        Ok(TestContext {
            title: title.to_string(),
            fixture_path,
            mode,
            capture,
            gate,
            replay_plan,
        })
    }

    /// Tear down a test case, saving its traffic if it was recorded and passed
    ///
    /// # Errors
    ///
    /// Returns error if the existing fixture cannot be read or the write fails
    pub async fn after_each(
        &self,
        ctx: TestContext,
        outcome: TestOutcome,
    ) -> Result<TeardownReport> {
        if !ctx.mode.is_record() || outcome != TestOutcome::Passed {
            return Ok(TeardownReport::Unchanged);
        }

        let records = ctx.capture.take_records();
        let count = records.len();

        save_recording(
            &self.store,
            &ctx.fixture_path,
            &ctx.title,
            TestRecording::now(records),
        )
        .await?;

        info!("API recorded: {} records for {:?}", count, ctx.title);

        Ok(TeardownReport::Saved {
            path: ctx.fixture_path,
            records: count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Exchange, RequestObserver, SettleDelay};
    use crate::fixture::JsonFileStore;
    use crate::stub::{PassthroughRoute, ResponseStub};
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Counting {
        routes: usize,
        stubs: Vec<ResponseStub>,
    }

    impl Interceptor for Counting {
        fn route_passthrough(&mut self, _route: PassthroughRoute) -> Result<()> {
            self.routes += 1;
            Ok(())
        }

        fn install_stub(&mut self, stub: ResponseStub) -> Result<()> {
            self.stubs.push(stub);
            Ok(())
        }
    }

    fn harness(dir: &Path) -> Harness<JsonFileStore> {
        let config = Config {
            api_host: vec!["https://api.example.com".to_string()],
            stub_api_patterns: vec!["/api/".to_string()],
            fixtures_dir: dir.to_path_buf(),
            settle: SettleDelay {
                record_ms: 0,
                replay_ms: 0,
            },
            ..Config::default()
        };
        Harness::new(config, JsonFileStore::new()).unwrap()
    }

    #[tokio::test]
    async fn test_record_then_replay() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(temp_dir.path());
        let spec = SpecFile::new("integration/users.spec.ts");

        let mut interceptor = Counting::default();
        let ctx = harness
            .before_each(&spec, "users creates one", &mut interceptor)
            .await
            .unwrap();
        assert_eq!(ctx.mode(), Mode::Record);
        assert_eq!(interceptor.routes, 4);

        let observer = ctx.observer();
        observer.on_request_start();
        observer.on_request_end(
            &Exchange::new("POST", "https://api.example.com/api/users", 201)
                .with_response_body(json!({"id": 7})),
        );
        ctx.wait_for_api_requests().await.unwrap();

        let report = harness.after_each(ctx, TestOutcome::Passed).await.unwrap();
        assert_eq!(
            report,
            TeardownReport::Saved {
                path: temp_dir.path().join("users.api.snapshot.json"),
                records: 1,
            }
        );

        let mut interceptor = Counting::default();
        let ctx = harness
            .before_each(&spec, "users creates one", &mut interceptor)
            .await
            .unwrap();
        assert_eq!(ctx.mode(), Mode::Replay);
        assert_eq!(interceptor.routes, 0);
        assert_eq!(interceptor.stubs.len(), 1);
        assert_eq!(interceptor.stubs[0].url, "https://api.example.com/api/users");
        assert_eq!(ctx.replay_plan().unwrap().stubs.len(), 1);

        let report = harness.after_each(ctx, TestOutcome::Passed).await.unwrap();
        assert_eq!(report, TeardownReport::Unchanged);
    }

    #[tokio::test]
    async fn test_failed_test_does_not_write() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(temp_dir.path());
        let spec = SpecFile::new("integration/users.spec.ts");

        let ctx = harness
            .before_each(&spec, "flaky", &mut Counting::default())
            .await
            .unwrap();
        let path = ctx.fixture_path().to_path_buf();

        for outcome in [TestOutcome::Failed, TestOutcome::Skipped] {
            let ctx = harness
                .before_each(&spec, "flaky", &mut Counting::default())
                .await
                .unwrap();
            assert_eq!(
                harness.after_each(ctx, outcome).await.unwrap(),
                TeardownReport::Unchanged
            );
        }
        drop(ctx);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_invalid_spec_path() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(temp_dir.path());

        let result = harness
            .before_each(
                &SpecFile::new("integration/.spec.ts"),
                "t",
                &mut Counting::default(),
            )
            .await;
        assert!(matches!(result, Err(AutostubError::InvalidSpecPath(_))));
    }
}
