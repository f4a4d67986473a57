use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

const COUNTER_COUNT: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    WebhookEventsReceived,
    WebhookEventsDuplicate,
    WebhookEventsProcessed,
    WebhookEventsFailed,
    WebhookSignatureRejected,
    PaymentLinksCreated,
    PaymentsPosted,
    PaymentsFailed,
    WorkerCycles,
    WorkerCycleErrors,
    WorkerSalesProcessed,
    WorkerSalesSkipped,
    WorkerSalesFailed,
    SalesCalls,
    SalesCallErrors,
    PaymentPlatformCalls,
    PaymentPlatformCallErrors,
}

impl Counter {
    pub const ALL: [Counter; COUNTER_COUNT] = [
        Counter::WebhookEventsReceived,
        Counter::WebhookEventsDuplicate,
        Counter::WebhookEventsProcessed,
        Counter::WebhookEventsFailed,
        Counter::WebhookSignatureRejected,
        Counter::PaymentLinksCreated,
        Counter::PaymentsPosted,
        Counter::PaymentsFailed,
        Counter::WorkerCycles,
        Counter::WorkerCycleErrors,
        Counter::WorkerSalesProcessed,
        Counter::WorkerSalesSkipped,
        Counter::WorkerSalesFailed,
        Counter::SalesCalls,
        Counter::SalesCallErrors,
        Counter::PaymentPlatformCalls,
        Counter::PaymentPlatformCallErrors,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Counter::WebhookEventsReceived => "webhook_events_received_total",
            Counter::WebhookEventsDuplicate => "webhook_events_duplicate_total",
            Counter::WebhookEventsProcessed => "webhook_events_processed_total",
            Counter::WebhookEventsFailed => "webhook_events_failed_total",
            Counter::WebhookSignatureRejected => "webhook_signature_rejected_total",
            Counter::PaymentLinksCreated => "payment_links_created_total",
            Counter::PaymentsPosted => "payments_posted_total",
            Counter::PaymentsFailed => "payments_failed_total",
            Counter::WorkerCycles => "worker_cycles_total",
            Counter::WorkerCycleErrors => "worker_cycle_errors_total",
            Counter::WorkerSalesProcessed => "worker_sales_processed_total",
            Counter::WorkerSalesSkipped => "worker_sales_skipped_total",
            Counter::WorkerSalesFailed => "worker_sales_failed_total",
            Counter::SalesCalls => "sales_api_calls_total",
            Counter::SalesCallErrors => "sales_api_errors_total",
            Counter::PaymentPlatformCalls => "payment_api_calls_total",
            Counter::PaymentPlatformCallErrors => "payment_api_errors_total",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Sales,
    PaymentPlatform,
}

impl Upstream {
    fn counters(&self) -> (Counter, Counter) {
        match self {
            Upstream::Sales => (Counter::SalesCalls, Counter::SalesCallErrors),
            Upstream::PaymentPlatform => (
                Counter::PaymentPlatformCalls,
                Counter::PaymentPlatformCallErrors,
            ),
        }
    }
}

/// Counters for the sync pipeline. Each instance owns its Prometheus recorder, so
/// `/metrics` reflects exactly this pipeline; a mirror of plain totals backs the JSON snapshot.
pub struct SyncMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    values: [AtomicU64; COUNTER_COUNT],
}

impl SyncMetrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self {
            recorder,
            handle,
            values: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, value: u64) {
        if value == 0 {
            return;
        }
        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(counter.name()).increment(value);
        });
        self.values[counter.index()].fetch_add(value, Ordering::Relaxed);
    }

    /// Counts one outbound call, labelled by operation in the Prometheus output.
    pub fn outbound(&self, upstream: Upstream, operation: &'static str, ok: bool) {
        let (calls, errors) = upstream.counters();
        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(calls.name(), "operation" => operation).increment(1);
            if !ok {
                metrics::counter!(errors.name(), "operation" => operation).increment(1);
            }
        });
        self.values[calls.index()].fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.values[errors.index()].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        Counter::ALL
            .iter()
            .map(|counter| (counter.name(), self.get(*counter)))
            .collect()
    }

    /// Prometheus text exposition.
    pub fn render_prometheus(&self) -> String {
        self.handle.render()
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}
