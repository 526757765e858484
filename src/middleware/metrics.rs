use dashmap::DashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::core::{ChainResult, Middleware, Next};
use crate::context::RequestContext;
use crate::error::ErrorKind;

/// Request counters collected from the `middleware` group
///
/// All counters use relaxed atomics; values are eventually consistent and
/// cheap to update from many coroutines.
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    error_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    stack_size: AtomicUsize,
    auth_failures: AtomicUsize,
    /// status code → responses
    status_counts: DashMap<u16, AtomicUsize>,
    /// operation name → invocations
    operation_counts: DashMap<String, AtomicUsize>,
}

impl MetricsMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shareable instance; register a clone with [`super::MiddlewareEntry::from_arc`]
    /// and keep the original for reading counters
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn auth_failures(&self) -> usize {
        self.auth_failures.load(Ordering::Relaxed)
    }

    /// Mean processing time across all requests
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Coroutine stack size seen on the last request
    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack_size.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn status_count(&self, status: u16) -> usize {
        self.status_counts
            .get(&status)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn operation_count(&self, operation: &str) -> usize {
        self.operation_counts
            .get(operation)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Prometheus text exposition of the counters
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# TYPE brrtcore_requests_total counter");
        let _ = writeln!(out, "brrtcore_requests_total {}", self.request_count());
        let _ = writeln!(out, "# TYPE brrtcore_request_errors_total counter");
        let _ = writeln!(out, "brrtcore_request_errors_total {}", self.error_count());
        let _ = writeln!(out, "# TYPE brrtcore_auth_failures_total counter");
        let _ = writeln!(out, "brrtcore_auth_failures_total {}", self.auth_failures());
        let _ = writeln!(out, "# TYPE brrtcore_request_latency_seconds_avg gauge");
        let _ = writeln!(
            out,
            "brrtcore_request_latency_seconds_avg {:.6}",
            self.average_latency().as_secs_f64()
        );
        let mut statuses: Vec<(u16, usize)> = self
            .status_counts
            .iter()
            .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
            .collect();
        statuses.sort_unstable();
        let _ = writeln!(out, "# TYPE brrtcore_responses_total counter");
        for (status, count) in statuses {
            let _ = writeln!(out, "brrtcore_responses_total{{status=\"{status}\"}} {count}");
        }
        out
    }

    fn record_status(&self, status: u16) {
        self.status_counts
            .entry(status)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_stack(&self) {
        let size = if may::coroutine::is_coroutine() {
            may::coroutine::current().stack_size()
        } else {
            may::config().get_stack_size()
        };
        self.stack_size.store(size, Ordering::Relaxed);
    }
}

impl Middleware for MetricsMiddleware {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let result = next.run(ctx);

        let latency = ctx.elapsed();
        self.total_latency_ns.fetch_add(
            u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        self.record_stack();
        if let Some(matched) = ctx.matched_route() {
            self.operation_counts
                .entry(matched.spec.operation_name())
                .or_default()
                .fetch_add(1, Ordering::Relaxed);
        }

        match &result {
            Ok(Some(response)) => self.record_status(response.status),
            Ok(None) => {
                if let Some(status) = ctx.response().status() {
                    self.record_status(status);
                }
            }
            Err(err) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                if matches!(err.kind(), ErrorKind::Unauthorized | ErrorKind::Forbidden) {
                    self.auth_failures.fetch_add(1, Ordering::Relaxed);
                }
                if err.kind() != ErrorKind::RequestAborted {
                    self.record_status(err.status());
                }
            }
        }
        result
    }
}
