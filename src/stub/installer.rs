//! Route and stub installation

use regex::Regex;
use tracing::{debug, info, warn};

use super::{Interceptor, PassthroughRoute, ResponseStub, PASSTHROUGH_METHODS};
use crate::fixture::{ApiRecord, TestRecording};
use crate::hosts::HostList;
use crate::{AutostubError, Result};

/// Compile configured URL patterns, trimming whitespace and skipping blanks
///
/// # Errors
///
/// Returns `InvalidPattern` for the first pattern that fails to compile
pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .map(|p| {
            Regex::new(p).map_err(|e| AutostubError::InvalidPattern {
                pattern: p.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Stubs to install for one recorded test case
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayPlan {
    /// Stubs in record order
    pub stubs: Vec<ResponseStub>,
    /// GET records left to the live backend
    pub skipped_get: usize,
    /// Records whose host index does not resolve against the current hosts
    pub skipped_unresolved: Vec<ApiRecord>,
}

/// Build the replay stubs for `recording`
///
/// GET records are never stubbed. Records whose host index is unmatched, out
/// of range or points at an empty host entry are left out; they do not
/// prevent the remaining stubs from being built.
pub fn replay_stubs(recording: &TestRecording, hosts: &HostList) -> ReplayPlan {
    let mut plan = ReplayPlan::default();

    for record in &recording.records {
        if record.is_get() {
            plan.skipped_get += 1;
            continue;
        }

        match hosts.rebuild(record.match_host_index, &record.url) {
            Some(url) => plan.stubs.push(ResponseStub {
                method: record.method.clone(),
                url,
                status: record.status,
                body: record.response.body.clone(),
            }),
            None => plan.skipped_unresolved.push(record.clone()),
        }
    }

    plan
}

/// Installs interception routes for a test case
pub struct StubInstaller;

impl StubInstaller {
    /// Route every method in [`PASSTHROUGH_METHODS`] through each pattern
    ///
    /// # Errors
    ///
    /// Returns error if the interceptor rejects a route
    pub fn install_recording<I: Interceptor + ?Sized>(
        interceptor: &mut I,
        patterns: &[Regex],
    ) -> Result<usize> {
        let mut installed = 0;
        for pattern in patterns {
            for method in PASSTHROUGH_METHODS {
                interceptor.route_passthrough(PassthroughRoute {
                    method,
                    pattern: pattern.clone(),
                })?;
                installed += 1;
            }
        }

        debug!("Installed {} pass-through routes", installed);
        Ok(installed)
    }

    /// Install replay stubs for `recording`
    ///
    /// # Errors
    ///
    /// Returns error if the interceptor rejects a stub
    pub fn install_replay<I: Interceptor + ?Sized>(
        interceptor: &mut I,
        recording: &TestRecording,
        hosts: &HostList,
    ) -> Result<ReplayPlan> {
        let plan = replay_stubs(recording, hosts);

        for record in &plan.skipped_unresolved {
            warn!(
                "Skipping recorded {} {}: host index {} not in current host list ({} hosts)",
                record.method,
                record.url,
                record.match_host_index,
                hosts.len()
            );
        }

        for stub in &plan.stubs {
            debug!("Stub {} {} -> {}", stub.method, stub.url, stub.status);
            interceptor.install_stub(stub.clone())?;
        }

        info!(
            "Installed {} replay stubs ({} GET left live, {} unresolvable)",
            plan.stubs.len(),
            plan.skipped_get,
            plan.skipped_unresolved.len()
        );
        Ok(plan)
    }
}
