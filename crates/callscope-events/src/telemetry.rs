use callscope_core::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "callscope::telemetry";

pub const OP_EXPLAIN_REGION: &str = "ExplainRegion";
pub const OP_EXPLAIN_KNT: &str = "ExplainKeyNodeTree";
pub const OP_EXPLAIN_TRACE: &str = "ExplainTrace";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationLifecycle {
    Start,
    Success,
    Failure,
}

impl fmt::Display for OperationLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "operation_start"),
            Self::Success => write!(f, "operation_success"),
            Self::Failure => write!(f, "operation_failure"),
        }
    }
}

/// What an explanation call covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExplainSubject {
    Tree { root: NodeId },
    Region { root: NodeId, region: NodeId },
}

impl ExplainSubject {
    pub fn root(&self) -> NodeId {
        match self {
            Self::Tree { root } | Self::Region { root, .. } => *root,
        }
    }

    pub fn region(&self) -> Option<NodeId> {
        match self {
            Self::Tree { .. } => None,
            Self::Region { region, .. } => Some(*region),
        }
    }
}

/// One logged lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTelemetry {
    pub correlation_id: String,
    pub operation: String,
    pub subject: ExplainSubject,
    pub lifecycle: OperationLifecycle,
    pub error_reason: Option<String>,
    pub duration_ms: Option<u128>,
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// An explanation call in flight. Logs its start on creation and its
/// outcome, with the elapsed time, when finished.
#[derive(Debug)]
pub struct ExplainOperation {
    operation: &'static str,
    correlation_id: String,
    subject: ExplainSubject,
    started: Instant,
}

impl ExplainOperation {
    pub fn start(operation: &'static str, correlation_id: &str, subject: ExplainSubject) -> Self {
        info!(
            target: TELEMETRY_TARGET,
            operation,
            correlation_id = %correlation_id,
            root = %subject.root(),
            region = ?subject.region(),
            lifecycle = %OperationLifecycle::Start,
            timestamp_ms = now_unix_ms(),
            "operation_start"
        );
        Self {
            operation,
            correlation_id: correlation_id.to_string(),
            subject,
            started: Instant::now(),
        }
    }

    fn record(self, lifecycle: OperationLifecycle, error_reason: Option<String>) -> OperationTelemetry {
        OperationTelemetry {
            correlation_id: self.correlation_id,
            operation: self.operation.to_string(),
            subject: self.subject,
            lifecycle,
            error_reason,
            duration_ms: Some(self.started.elapsed().as_millis()),
        }
    }

    pub fn succeed(self) -> OperationTelemetry {
        let telemetry = self.record(OperationLifecycle::Success, None);
        info!(
            target: TELEMETRY_TARGET,
            operation = %telemetry.operation,
            correlation_id = %telemetry.correlation_id,
            root = %telemetry.subject.root(),
            region = ?telemetry.subject.region(),
            lifecycle = %telemetry.lifecycle,
            duration_ms = ?telemetry.duration_ms,
            timestamp_ms = now_unix_ms(),
            "operation_success"
        );
        telemetry
    }

    pub fn fail(self, reason: impl fmt::Display) -> OperationTelemetry {
        let telemetry = self.record(OperationLifecycle::Failure, Some(reason.to_string()));
        error!(
            target: TELEMETRY_TARGET,
            operation = %telemetry.operation,
            correlation_id = %telemetry.correlation_id,
            root = %telemetry.subject.root(),
            region = ?telemetry.subject.region(),
            lifecycle = %telemetry.lifecycle,
            error = telemetry.error_reason.as_deref().unwrap_or("unclassified"),
            duration_ms = ?telemetry.duration_ms,
            timestamp_ms = now_unix_ms(),
            "operation_failure"
        );
        telemetry
    }
}

/// Results of a whole run were written back onto the explainer.
pub fn explanations_applied(correlation_id: &str, regions: usize, trees: usize) {
    debug!(
        target: TELEMETRY_TARGET,
        correlation_id = %correlation_id,
        regions,
        trees,
        timestamp_ms = now_unix_ms(),
        "explanations_applied"
    );
}
