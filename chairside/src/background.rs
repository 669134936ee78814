//! Background delegation of lab computations.
//!
//! Requests travel to a dedicated worker thread as JSON envelopes
//! (`{"id", "type", "data"}`) and replies come back the same way. The worker
//! thread hands each encoded reply straight to the listener registered under
//! its random correlation id, so no runtime task sits between the two and the
//! shim keeps working after the runtime that created it is gone. Whenever the worker
//! cannot be used the same handler runs inline, so both paths produce the
//! same bytes.
//!
//! The first worker failure of any kind downgrades the shim to the inline
//! path for the rest of its life.

use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::interface::{ChairsideError, Result};
use crate::lab::{self, LabFilter, LabRequest, OverdueBuckets, Page, RequestDeliveryStatus};

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerRequest<'a> {
    CalculateDeliveryStatus {
        requests: Cow<'a, [LabRequest]>,
        today: NaiveDate,
    },
    CalculateOverdueBuckets {
        requests: Cow<'a, [LabRequest]>,
        today: NaiveDate,
    },
    FilterAndPaginate {
        requests: Cow<'a, [LabRequest]>,
        filter: Cow<'a, LabFilter>,
        page: usize,
        page_size: usize,
        today: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerResponse {
    DeliveryStatusCalculated(Vec<RequestDeliveryStatus>),
    OverdueBucketsCalculated(OverdueBuckets),
    BatchComplete(Page<LabRequest>),
    WorkerError { message: String },
}

impl WorkerRequest<'_> {
    /// Tag a successful reply to this request must carry
    pub fn completion_tag(&self) -> &'static str {
        match self {
            WorkerRequest::CalculateDeliveryStatus { .. } => "DELIVERY_STATUS_CALCULATED",
            WorkerRequest::CalculateOverdueBuckets { .. } => "OVERDUE_BUCKETS_CALCULATED",
            WorkerRequest::FilterAndPaginate { .. } => "BATCH_COMPLETE",
        }
    }
}

impl WorkerResponse {
    pub fn tag(&self) -> &'static str {
        match self {
            WorkerResponse::DeliveryStatusCalculated(_) => "DELIVERY_STATUS_CALCULATED",
            WorkerResponse::OverdueBucketsCalculated(_) => "OVERDUE_BUCKETS_CALCULATED",
            WorkerResponse::BatchComplete(_) => "BATCH_COMPLETE",
            WorkerResponse::WorkerError { .. } => "WORKER_ERROR",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<M> {
    id: u64,
    #[serde(flatten)]
    message: M,
}

#[derive(Deserialize)]
struct CorrelationId {
    id: u64,
}

/// The computation behind every request. Runs on the worker thread or inline.
pub fn handle_request(request: WorkerRequest<'_>) -> WorkerResponse {
    match request {
        WorkerRequest::CalculateDeliveryStatus { requests, today } => {
            WorkerResponse::DeliveryStatusCalculated(lab::delivery_statuses(&requests, today))
        }
        WorkerRequest::CalculateOverdueBuckets { requests, today } => {
            WorkerResponse::OverdueBucketsCalculated(lab::overdue_buckets(&requests, today))
        }
        WorkerRequest::FilterAndPaginate {
            requests,
            filter,
            page,
            page_size,
            today,
        } => WorkerResponse::BatchComplete(lab::filter_and_paginate(&requests, &filter, page, page_size, today)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHIM
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub enabled: bool,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Vec<u8>>>>>;

/// Dropping the request sender ends the worker loop.
struct WorkerLink {
    requests: mpsc::UnboundedSender<Vec<u8>>,
    pending: PendingReplies,
}

/// Removes a call's listener however the call ends.
struct ListenerGuard<'a> {
    pending: &'a PendingReplies,
    id: u64,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

pub struct BackgroundShim {
    link: Option<WorkerLink>,
    degraded: AtomicBool,
}

impl BackgroundShim {
    /// Start a worker thread running [`handle_request`].
    pub fn spawn() -> Self {
        Self::spawn_with(handle_request)
    }

    /// Start a worker thread with a custom handler
    pub fn spawn_with<F>(handler: F) -> Self
    where
        F: Fn(WorkerRequest<'static>) -> WorkerResponse + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));

        let worker_pending = Arc::clone(&pending);
        let spawned = std::thread::Builder::new()
            .name("chairside-worker".to_string())
            .spawn(move || worker_loop(request_rx, worker_pending, handler));
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start background worker, using synchronous path");
            return Self::unavailable();
        }

        Self {
            link: Some(WorkerLink {
                requests: request_tx,
                pending,
            }),
            degraded: AtomicBool::new(false),
        }
    }

    /// A shim that always computes inline
    pub fn unavailable() -> Self {
        Self {
            link: None,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &BackgroundConfig) -> Self {
        if config.enabled {
            Self::spawn()
        } else {
            Self::unavailable()
        }
    }

    /// Whether the next call will go to the worker
    pub fn uses_worker(&self) -> bool {
        self.link.is_some() && !self.is_degraded()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub async fn run(&self, request: WorkerRequest<'_>) -> WorkerResponse {
        if let Some(link) = self.link.as_ref().filter(|_| !self.is_degraded()) {
            match run_on_worker(link, &request).await {
                Ok(response) => return response,
                Err(e) => {
                    tracing::warn!(error = %e, "background worker failed, switching to synchronous path");
                    self.degraded.store(true, Ordering::SeqCst);
                }
            }
        }
        handle_request(request)
    }

    // The typed helpers lend their inputs to the request; the fallback arms
    // only run if `run` ever hands back a reply of another kind.

    pub async fn delivery_statuses(&self, requests: &[LabRequest], today: NaiveDate) -> Vec<RequestDeliveryStatus> {
        let request = WorkerRequest::CalculateDeliveryStatus {
            requests: Cow::Borrowed(requests),
            today,
        };
        match self.run(request).await {
            WorkerResponse::DeliveryStatusCalculated(statuses) => statuses,
            _ => lab::delivery_statuses(requests, today),
        }
    }

    pub async fn overdue_buckets(&self, requests: &[LabRequest], today: NaiveDate) -> OverdueBuckets {
        let request = WorkerRequest::CalculateOverdueBuckets {
            requests: Cow::Borrowed(requests),
            today,
        };
        match self.run(request).await {
            WorkerResponse::OverdueBucketsCalculated(buckets) => buckets,
            _ => lab::overdue_buckets(requests, today),
        }
    }

    pub async fn filter_and_paginate(
        &self,
        requests: &[LabRequest],
        filter: &LabFilter,
        page: usize,
        page_size: usize,
        today: NaiveDate,
    ) -> Page<LabRequest> {
        let request = WorkerRequest::FilterAndPaginate {
            requests: Cow::Borrowed(requests),
            filter: Cow::Borrowed(filter),
            page,
            page_size,
            today,
        };
        match self.run(request).await {
            WorkerResponse::BatchComplete(page) => page,
            _ => lab::filter_and_paginate(requests, filter, page, page_size, today),
        }
    }
}

async fn run_on_worker(link: &WorkerLink, request: &WorkerRequest<'_>) -> Result<WorkerResponse> {
    let id: u64 = rand::random();
    let (reply_tx, reply_rx) = oneshot::channel();
    link.pending.lock().insert(id, reply_tx);
    let _listener = ListenerGuard {
        pending: &link.pending,
        id,
    };

    let bytes = serde_json::to_vec(&Envelope { id, message: request })?;
    link.requests
        .send(bytes)
        .map_err(|_| ChairsideError::Worker("worker is gone".into()))?;

    let reply = reply_rx
        .await
        .map_err(|_| ChairsideError::Worker("worker hung up before replying".into()))?;
    let envelope: Envelope<WorkerResponse> = serde_json::from_slice(&reply)?;

    match envelope.message {
        WorkerResponse::WorkerError { message } => Err(ChairsideError::Worker(message)),
        response if response.tag() == request.completion_tag() => Ok(response),
        response => Err(ChairsideError::Worker(format!(
            "expected {} reply, got {}",
            request.completion_tag(),
            response.tag()
        ))),
    }
}

/// Fails every outstanding call once the worker thread exits, however it exits.
struct HangUpOnExit(PendingReplies);

impl Drop for HangUpOnExit {
    fn drop(&mut self) {
        self.0.lock().clear();
    }
}

fn deliver(pending: &PendingReplies, id: u64, reply: Vec<u8>) {
    let listener = pending.lock().remove(&id);
    match listener {
        Some(tx) => {
            let _ = tx.send(reply);
        }
        None => tracing::debug!(id, "no listener for worker reply"),
    }
}

fn worker_loop<F>(mut requests: mpsc::UnboundedReceiver<Vec<u8>>, pending: PendingReplies, handler: F)
where
    F: Fn(WorkerRequest<'static>) -> WorkerResponse,
{
    let _hang_up = HangUpOnExit(Arc::clone(&pending));

    while let Some(bytes) = requests.blocking_recv() {
        let envelope = match serde_json::from_slice::<Envelope<WorkerRequest<'static>>>(&bytes) {
            Ok(envelope) => {
                let id = envelope.id;
                let message = catch_unwind(AssertUnwindSafe(|| handler(envelope.message)))
                    .unwrap_or_else(|panic| WorkerResponse::WorkerError {
                        message: panic_message(panic.as_ref()),
                    });
                Envelope { id, message }
            }
            Err(e) => match serde_json::from_slice::<CorrelationId>(&bytes) {
                Ok(c) => Envelope {
                    id: c.id,
                    message: WorkerResponse::WorkerError { message: e.to_string() },
                },
                Err(_) => {
                    tracing::warn!(error = %e, "dropping worker request without correlation id");
                    continue;
                }
            },
        };

        let encoded = serde_json::to_vec(&envelope).or_else(|e| {
            serde_json::to_vec(&Envelope {
                id: envelope.id,
                message: WorkerResponse::WorkerError { message: e.to_string() },
            })
        });
        match encoded {
            Ok(reply) => deliver(&pending, envelope.id, reply),
            // dropping the listener fails the call
            Err(_) => {
                pending.lock().remove(&envelope.id);
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::{DeliveryStatus, LabStatus};
    use std::sync::atomic::AtomicUsize;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn requests() -> Vec<LabRequest> {
        ["2024-01-01", "2024-06-10", "2099-01-01"]
            .iter()
            .enumerate()
            .map(|(i, d)| LabRequest {
                id: format!("lab-{}", i),
                patient_id: "p-1".to_string(),
                patient_name: "Ahmad Ali".to_string(),
                lab_name: "Smile Lab".to_string(),
                work_type: "Crown".to_string(),
                status: LabStatus::Sent,
                sent_date: None,
                expected_return_date: Some(date(d)),
            })
            .collect()
    }

    fn status_request() -> WorkerRequest<'static> {
        WorkerRequest::CalculateDeliveryStatus {
            requests: requests().into(),
            today: date("2024-06-10"),
        }
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope {
            id: 7,
            message: WorkerResponse::WorkerError { message: "x".into() },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "WORKER_ERROR");
        assert_eq!(json["data"]["message"], "x");

        let back: Envelope<WorkerResponse> = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.message.tag(), "WORKER_ERROR");
    }

    #[tokio::test]
    async fn test_worker_and_inline_agree() {
        let shim = BackgroundShim::spawn();
        assert!(shim.uses_worker());

        let from_worker = shim.run(status_request()).await;
        let inline = handle_request(status_request());
        assert_eq!(serde_json::to_vec(&from_worker).unwrap(), serde_json::to_vec(&inline).unwrap());
        assert!(!shim.is_degraded());

        match from_worker {
            WorkerResponse::DeliveryStatusCalculated(statuses) => {
                assert_eq!(statuses[0].status, DeliveryStatus::Overdue { days: 161 });
                assert_eq!(statuses[1].status, DeliveryStatus::DueToday);
                assert!(matches!(statuses[2].status, DeliveryStatus::Remaining { .. }));
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_resolve_independently() {
        let shim = BackgroundShim::spawn();
        let today = date("2024-06-10");
        let requests = requests();
        let filter = LabFilter::default();
        let (statuses, buckets, page) = tokio::join!(
            shim.delivery_statuses(&requests, today),
            shim.overdue_buckets(&requests, today),
            shim.filter_and_paginate(&requests, &filter, 1, 2, today),
        );
        assert_eq!(statuses.len(), 3);
        assert_eq!(buckets.critical, vec!["lab-0"]);
        assert_eq!(buckets.due_today, vec!["lab-1"]);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.page_count, 2);
        assert!(!shim.is_degraded());
        assert!(shim.link.as_ref().unwrap().pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_worker_degrades_permanently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let shim = BackgroundShim::spawn_with(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("lab handler exploded");
        });

        let first = shim.run(status_request()).await;
        assert_eq!(first, handle_request(status_request()));
        assert!(shim.is_degraded());
        assert!(!shim.uses_worker());

        let second = shim.run(status_request()).await;
        assert_eq!(second, first);
        // never retried
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mismatched_tag_degrades() {
        let shim = BackgroundShim::spawn_with(|_| {
            WorkerResponse::OverdueBucketsCalculated(OverdueBuckets::default())
        });
        let response = shim.run(status_request()).await;
        assert_eq!(response.tag(), "DELIVERY_STATUS_CALCULATED");
        assert!(shim.is_degraded());
    }

    #[tokio::test]
    async fn test_unavailable_uses_inline_path() {
        let shim = BackgroundShim::from_config(&BackgroundConfig { enabled: false });
        assert!(!shim.uses_worker());
        assert!(!shim.is_degraded());
        let response = shim.run(status_request()).await;
        assert_eq!(response, handle_request(status_request()));
    }

    #[test]
    fn test_works_without_runtime() {
        let shim = BackgroundShim::spawn();
        let response = futures::executor::block_on(shim.run(status_request()));
        assert_eq!(response.tag(), "DELIVERY_STATUS_CALCULATED");
        assert!(!shim.is_degraded());
    }

    #[test]
    fn test_shim_outlives_creating_runtime() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let shim = rt.block_on(async { BackgroundShim::spawn() });
        drop(rt);

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let response = futures::executor::block_on(shim.run(status_request()));
            let _ = tx.send((response, shim.is_degraded()));
        });

        let (response, degraded) = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("call resolved after its runtime shut down");
        assert_eq!(response, handle_request(status_request()));
        assert!(!degraded);
    }

    #[test]
    fn test_dropped_shim_stops_worker() {
        let shim = BackgroundShim::spawn();
        let pending = Arc::clone(&shim.link.as_ref().unwrap().pending);
        pending.lock().insert(99, oneshot::channel().0);
        drop(shim);

        // the worker clears leftover listeners on its way out
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !pending.lock().is_empty() {
            assert!(std::time::Instant::now() < deadline, "worker never exited");
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }
}
