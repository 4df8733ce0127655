//! Dashboard HTTP server.
//!
//! Serves the interaction history as a self-refreshing HTML page and a
//! JSON API with four index-aligned arrays. Strictly read-only; all
//! writes come from the pipeline worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Local;
use log::{info, warn};
use serde_json::json;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::history::{InteractionHistory, InteractionRecord};
use crate::pipeline::{PhaseCell, PipelinePhase};

struct ServerWorker {
    shutdown: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl ServerWorker {
    fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Err(err) = self.handle.join() {
            warn!("Failed to join dashboard server thread: {:?}", err);
        }
    }
}

pub struct DashboardServer {
    worker: Option<ServerWorker>,
}

impl DashboardServer {
    /// Bind `addr` and start serving in a background thread.
    ///
    /// Binding happens here, not in the worker, so an unusable bind
    /// address fails startup instead of leaving a dashboardless service
    /// running.
    pub fn start(
        addr: &str,
        history: Arc<InteractionHistory>,
        phase: Arc<PhaseCell>,
    ) -> Result<Self> {
        let server = Server::http(addr)
            .map_err(|err| anyhow!("Failed to bind dashboard server on {}: {}", addr, err))?;
        info!("Dashboard listening on http://{}/", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = thread::spawn(move || {
            run_server(server, history, phase, shutdown_clone);
        });

        Ok(Self {
            worker: Some(ServerWorker { shutdown, handle }),
        })
    }

    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Drop for DashboardServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_server(
    server: Server,
    history: Arc<InteractionHistory>,
    phase: Arc<PhaseCell>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(250)) {
            Ok(Some(request)) => handle_request(request, &history, &phase),
            Ok(None) => continue,
            Err(err) => {
                warn!("Dashboard server receive error: {}", err);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn handle_request(request: Request, history: &InteractionHistory, phase: &PhaseCell) {
    let method = request.method().clone();
    let url = request.url().to_string();

    if method != Method::Get {
        respond_error(request, StatusCode(405), "only GET is supported");
        return;
    }

    match url.as_str() {
        "/" => {
            let body = render_dashboard(&history.snapshot(), phase.get());
            respond(
                request,
                StatusCode(200),
                &body,
                Some("text/html; charset=utf-8"),
            );
        }
        "/api/data" => {
            let body = api_data_json(&history.snapshot());
            respond(request, StatusCode(200), &body, Some("application/json"));
        }
        "/health" => {
            let body = json!({
                "status": "ok",
                "phase": phase.get().as_str(),
                "records": history.len(),
            })
            .to_string();
            respond(request, StatusCode(200), &body, Some("application/json"));
        }
        _ => {
            respond(
                request,
                StatusCode(404),
                "{\"error\":\"not found\"}",
                Some("application/json"),
            );
        }
    }
}

/// The `/api/data` payload: four parallel arrays, index-aligned, in
/// append order.
fn api_data_json(records: &[InteractionRecord]) -> String {
    let transcriptions: Vec<&str> = records.iter().map(|r| r.transcript.as_str()).collect();
    let sentiments: Vec<&str> = records.iter().map(|r| r.sentiment.as_str()).collect();
    let tones: Vec<&str> = records.iter().map(|r| r.tone.as_str()).collect();
    let feedbacks: Vec<&str> = records.iter().map(|r| r.feedback.as_str()).collect();

    json!({
        "transcriptions": transcriptions,
        "sentiments": sentiments,
        "tones": tones,
        "feedbacks": feedbacks,
    })
    .to_string()
}

fn render_dashboard(records: &[InteractionRecord], phase: PipelinePhase) -> String {
    let mut rows = String::new();
    for record in records {
        let class = if record.is_error() {
            " class=\"error\""
        } else {
            ""
        };
        rows.push_str(&format!(
            "<tr{}><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            class,
            record.sequence,
            escape_html(&record.transcript),
            escape_html(&record.sentiment),
            escape_html(&record.tone),
            escape_html(&record.feedback),
        ));
    }

    let table = if records.is_empty() {
        "<p class=\"empty\">Waiting for the first interaction...</p>".to_string()
    } else {
        format!(
            "<table>\n<tr><th>#</th><th>Transcription</th><th>Sentiment</th><th>Tone</th><th>Feedback</th></tr>\n{}</table>",
            rows
        )
    };

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<meta http-equiv=\"refresh\" content=\"2\">\n<title>Live Coaching Dashboard</title>\n<style>\nbody {{ font-family: sans-serif; margin: 2em; }}\ntable {{ border-collapse: collapse; width: 100%; }}\nth, td {{ border: 1px solid #ccc; padding: 6px 10px; text-align: left; }}\nth {{ background: #f0f0f0; }}\ntr.error td {{ color: #a00; }}\n.status {{ color: #666; }}\n</style>\n</head>\n<body>\n<h1>Live Coaching Dashboard</h1>\n<p class=\"status\">Pipeline: {} &middot; {} records &middot; rendered {}</p>\n{}\n</body>\n</html>\n",
        phase.as_str(),
        records.len(),
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        table
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn respond(request: Request, status: StatusCode, body: &str, content_type: Option<&str>) {
    let mut response = Response::from_string(body.to_string()).with_status_code(status);

    if let Some(content_type) = content_type {
        if let Ok(header) = Header::from_bytes("Content-Type", content_type) {
            response.add_header(header);
        }
    }

    if let Err(err) = request.respond(response) {
        warn!("Failed to send dashboard response: {}", err);
    }
}

fn respond_error(request: Request, status: StatusCode, message: &str) {
    let body = json!({
        "error": {
            "code": status.0,
            "message": message
        }
    })
    .to_string();

    respond(request, status, &body, Some("application/json"));
}
