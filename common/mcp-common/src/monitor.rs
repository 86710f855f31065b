//! Tool-call interceptor
//!
//! [`ToolMonitor`] wraps every tool dispatch of a server with one uniform
//! layer: it times the call, classifies the outcome, emits a tracing event
//! and (when enabled) aggregates per-tool counters. Servers route each tool
//! body through [`ToolMonitor::instrument`] instead of logging per tool.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use rmcp::{model::CallToolResult, ErrorData as McpError};
use serde::Serialize;
use tokio::sync::Mutex;

/// How a tool call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Returned a success envelope
    Success,
    /// Returned an error envelope (validation, permission, driver failure)
    Rejected,
    /// Failed at the protocol level
    Failed,
}

impl CallOutcome {
    pub fn of(result: &Result<CallToolResult, McpError>) -> Self {
        match result {
            Ok(r) if r.is_error.unwrap_or(false) => CallOutcome::Rejected,
            Ok(_) => CallOutcome::Success,
            Err(_) => CallOutcome::Failed,
        }
    }
}

/// Aggregated counters for one tool
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolStats {
    pub calls: u64,
    pub successes: u64,
    pub rejections: u64,
    pub failures: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

impl ToolStats {
    fn record(&mut self, outcome: CallOutcome, duration_ms: f64) {
        self.calls += 1;
        match outcome {
            CallOutcome::Success => self.successes += 1,
            CallOutcome::Rejected => self.rejections += 1,
            CallOutcome::Failed => self.failures += 1,
        }
        self.total_duration_ms += duration_ms;
        if duration_ms > self.max_duration_ms {
            self.max_duration_ms = duration_ms;
        }
    }
}

/// Uniform interceptor applied at the dispatch layer
#[derive(Clone)]
pub struct ToolMonitor {
    enabled: bool,
    stats: Arc<Mutex<BTreeMap<String, ToolStats>>>,
}

impl ToolMonitor {
    /// Create a monitor; with `enabled = false` calls are still traced but
    /// no counters are kept
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            stats: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run a tool body, recording name, duration and outcome
    pub async fn instrument<F>(&self, tool: &str, call: F) -> Result<CallToolResult, McpError>
    where
        F: Future<Output = Result<CallToolResult, McpError>>,
    {
        let start = Instant::now();
        let result = call.await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let outcome = CallOutcome::of(&result);

        match outcome {
            CallOutcome::Success => {
                tracing::info!(tool, duration_ms, outcome = "success", "tool call completed")
            }
            CallOutcome::Rejected => {
                tracing::warn!(tool, duration_ms, outcome = "rejected", "tool call rejected")
            }
            CallOutcome::Failed => {
                tracing::error!(tool, duration_ms, outcome = "failed", "tool call failed")
            }
        }

        if self.enabled {
            self.stats
                .lock()
                .await
                .entry(tool.to_string())
                .or_default()
                .record(outcome, duration_ms);
        }

        result
    }

    /// Snapshot of the per-tool counters, ordered by tool name
    pub async fn snapshot(&self) -> BTreeMap<String, ToolStats> {
        self.stats.lock().await.clone()
    }
}
