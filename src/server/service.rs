use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

use super::in_flight::InFlight;
use super::request::into_http_request;
use super::response::{status_reason, write_response};
use crate::dispatcher::Dispatcher;
use crate::http::{HandlerResponse, ResponseWriter};
use crate::middleware::MetricsMiddleware;

/// `may_minihttp` service: converts each request, runs it through the
/// [`Dispatcher`] and writes the single response back.
///
/// `GET /health` and, when metrics are attached, `GET /metrics` are
/// answered by the transport without entering the chain.
///
/// Every dispatched request is tracked in [`AppService::in_flight`] until its
/// response is written.
#[derive(Clone, Debug)]
pub struct AppService {
    dispatcher: Dispatcher,
    max_body_bytes: usize,
    metrics: Option<Arc<MetricsMiddleware>>,
    in_flight: InFlight,
}

impl AppService {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, max_body_bytes: usize) -> Self {
        Self {
            dispatcher,
            max_body_bytes,
            metrics: None,
            in_flight: InFlight::new(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsMiddleware>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }
}

/// `{"status":"ok"}`
pub fn health_endpoint(res: &mut Response) -> io::Result<()> {
    write_response(res, &HandlerResponse::ok(json!({ "status": "ok" })));
    Ok(())
}

/// Prometheus text exposition of the dispatcher counters
pub fn metrics_endpoint(res: &mut Response, metrics: &MetricsMiddleware) -> io::Result<()> {
    res.status_code(200, status_reason(200));
    res.header("Content-Type: text/plain; version=0.0.4");
    res.body_vec(metrics.render().into_bytes());
    Ok(())
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        if req.method() == "GET" {
            match req.path() {
                "/health" => return health_endpoint(res),
                "/metrics" => {
                    if let Some(metrics) = &self.metrics {
                        return metrics_endpoint(res, metrics);
                    }
                }
                _ => {}
            }
        }

        let request = match into_http_request(req, self.max_body_bytes) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, status = err.status(), "Rejected request");
                write_response(res, &err.to_response());
                return Ok(());
            }
        };

        let writer = ResponseWriter::new();
        let tracked = self.in_flight.track();
        let report = self.dispatcher.handle(request, &writer, tracked.abort_handle());
        drop(tracked);
        match writer.take() {
            Some(response) => {
                write_response(res, &response);
                Ok(())
            }
            None => {
                debug!(request_id = %report.request_id, "No response for aborted request");
                Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "request aborted",
                ))
            }
        }
    }
}
