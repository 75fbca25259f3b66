//! Normalization of observed exchanges into API records

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{Exchange, InFlightCounter, RequestObserver, SettleDelay};
use crate::decider::Mode;
use crate::fixture::{ApiRecord, Body};
use crate::hosts::HostList;

/// Per-test-case traffic capture
///
/// Tracks in-flight requests in both modes. In record mode every completed
/// exchange is also stored, host stripped, in completion order.
#[derive(Debug)]
pub struct TrafficCapture {
    mode: Mode,
    hosts: HostList,
    counter: InFlightCounter,
    settle: SettleDelay,
    records: Mutex<Vec<ApiRecord>>,
}

impl TrafficCapture {
    /// Fresh capture with an empty record buffer
    pub fn new(mode: Mode, hosts: HostList, counter: InFlightCounter, settle: SettleDelay) -> Self {
        Self {
            mode,
            hosts,
            counter,
            settle,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Mode the capture was created for
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Handle to the in-flight counter
    pub fn counter(&self) -> &InFlightCounter {
        &self.counter
    }

    /// Normalize an exchange against the configured hosts
    pub fn normalize(&self, exchange: &Exchange) -> ApiRecord {
        let matched = self.hosts.match_url(&exchange.url);
        ApiRecord {
            url: matched.stripped,
            method: exchange.method.clone(),
            status: exchange.status,
            request: Body::new(exchange.request_body.clone()),
            response: Body::new(exchange.response_body.clone()),
            match_host_index: matched.index,
        }
    }

    /// Snapshot of the records captured so far
    pub fn records(&self) -> Vec<ApiRecord> {
        self.lock().clone()
    }

    /// Drain the captured records
    pub fn take_records(&self) -> Vec<ApiRecord> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of captured records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been captured
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ApiRecord>> {
        // A panic mid-push cannot leave the Vec inconsistent
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RequestObserver for TrafficCapture {
    fn on_request_start(&self) {
        self.counter.start();
    }

    fn on_request_end(&self, exchange: &Exchange) {
        self.counter.finish(self.settle.for_mode(self.mode));

        if self.mode.is_record() {
            let record = self.normalize(exchange);
            debug!(
                "Captured {} {} -> {} (host index {})",
                record.method, record.url, record.status, record.match_host_index
            );
            self.lock().push(record);
        }
    }
}
