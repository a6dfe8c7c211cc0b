//! # Status Server Module
//!
//! Pagina HTTP di sola lettura sullo stato della pipeline.
//!
//! ## Endpoint:
//! - `GET /`: progresso, file corrente e log (più recente prima)
//! - `GET /details`: stdout/stderr dell'ultimo tentativo
//! - `GET /status.json`: lo stesso snapshot in JSON
//!
//! Ogni richiesta lavora su uno snapshot, quindi non blocca mai il driver.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::Html,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tracing::info;

use crate::json_output::StatusSnapshot;
use crate::pipeline::progress_tracker::ProgressTracker;

pub fn router(tracker: ProgressTracker) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/details", get(details))
        .route("/status.json", get(status_json))
        .with_state(tracker)
}

/// Serve the status page until the process stops
pub async fn serve(addr: SocketAddr, tracker: ProgressTracker) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status server to {}", addr))?;
    info!("Status page running at http://{}", addr);

    axum::serve(listener, router(tracker))
        .await
        .context("Status server error")?;
    Ok(())
}

async fn index(State(tracker): State<ProgressTracker>) -> Html<String> {
    Html(render_index(&tracker.snapshot()))
}

async fn details(State(tracker): State<ProgressTracker>) -> Html<String> {
    Html(render_details(&tracker.snapshot()))
}

async fn status_json(State(tracker): State<ProgressTracker>) -> Json<StatusSnapshot> {
    Json(tracker.snapshot())
}

fn render_index(snapshot: &StatusSnapshot) -> String {
    let mut html = String::from(
        "<html><body>\n<table style=\"padding: 0;border: none;font-family: monospace;font-size: 12px\">\n",
    );

    if snapshot.done {
        html.push_str("<tr style=\"font-weight: bold\"><td>All done!</td></tr>\n");
    } else {
        html.push_str(&format!(
            "<tr style=\"font-weight: bold\"><td>Converting file: {}</td></tr>\n",
            escape_html(&snapshot.current_file)
        ));
        html.push_str(&format!(
            "<tr style=\"font-weight: bold\"><td>Files converted: {}/{} ({}%)</td></tr>\n",
            snapshot.processed,
            snapshot.total,
            snapshot.whole_percent()
        ));
        html.push_str("<tr><td><a href=\"/details\" target=\"_blank\">Conversion details</a></td></tr>\n");
    }

    for line in &snapshot.log {
        html.push_str(&format!("<tr><td>{}</td></tr>\n", escape_html(line)));
    }

    html.push_str("</table></body></html>");
    html
}

fn render_details(snapshot: &StatusSnapshot) -> String {
    format!(
        "<html><body><div style=\"font-family: monospace;font-size: 12px;white-space: pre-wrap;\">{}<br/>{}</div></body></html>",
        escape_html(&snapshot.stdout),
        escape_html(&snapshot.stderr)
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
