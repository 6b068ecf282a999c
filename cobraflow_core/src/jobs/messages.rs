//! Message bodies exchanged with workers
//!
//! Requests are strictly typed, result messages are decoded leniently: a result we can
//! attribute to a job but not understand still completes that job, with a
//! [`SolverErrorKind::MalformedPayload`] error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::{Category, CorrelationId, FvaParams, JobId, JobKind, JobOutcome, JobResult, NetworkId};
use crate::optimize::solvers::{SolverError, SolverErrorKind};
use crate::optimize::{FbaSolution, FvaSolution};

/// Body of a job request published on `<feed_prefix>.<category>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: JobId,
    pub category: Category,
    pub network_id: NetworkId,
    /// JSON document of the network with knockouts already applied
    pub model_snapshot: String,
    pub knocked_out_genes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fva_params: Option<FvaParams>,
}

/// Body of a result published on `<result_prefix>.<category>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub job_id: JobId,
    pub correlation_id: CorrelationId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SolverError>,
}

impl ResultMessage {
    pub fn success(job_id: JobId, correlation_id: CorrelationId, result: JobResult) -> Self {
        Self {
            job_id,
            correlation_id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(job_id: JobId, correlation_id: CorrelationId, error: SolverError) -> Self {
        Self {
            job_id,
            correlation_id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}

/// Body of a cancellation request published on the control key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub correlation_id: CorrelationId,
}

/// Result message as received, before it is matched to a job
#[derive(Debug, Clone, Default, Deserialize)]
struct RawResult {
    job_id: Option<Value>,
    correlation_id: Option<Value>,
    ok: Option<Value>,
    result: Option<Value>,
    error: Option<Value>,
}

/// Fields of a received result message, each decoded on its own
#[derive(Debug, Clone)]
pub struct ReceivedResult {
    raw: RawResult,
}

impl ReceivedResult {
    /// Wrap a message body, any JSON object is accepted
    pub fn new(body: &Value) -> Option<Self> {
        if !body.is_object() {
            return None;
        }
        serde_json::from_value::<RawResult>(body.clone())
            .ok()
            .map(|raw| Self { raw })
    }

    pub fn job_id(&self) -> Option<JobId> {
        decode(self.raw.job_id.as_ref())
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        decode(self.raw.correlation_id.as_ref())
    }

    /// Outcome for a job of `kind`, anything undecodable becomes a malformed payload error
    pub fn outcome(&self, kind: &JobKind) -> JobOutcome {
        match self.raw.ok.as_ref().and_then(Value::as_bool) {
            Some(true) => match self.result(kind) {
                Ok(result) => JobOutcome::Ok(result),
                Err(detail) => JobOutcome::Error(SolverError::new(
                    SolverErrorKind::MalformedPayload,
                    detail,
                )),
            },
            Some(false) => JobOutcome::Error(self.failure()),
            None => JobOutcome::Error(SolverError::new(
                SolverErrorKind::MalformedPayload,
                "result without an ok flag",
            )),
        }
    }

    /// Error of a failed result, a kind this crate does not know is kept in the detail
    fn failure(&self) -> SolverError {
        if let Some(error) = decode::<SolverError>(self.raw.error.as_ref()) {
            return error;
        }
        let error = self.raw.error.as_ref();
        let kind = error.and_then(|e| e.get("kind")).and_then(Value::as_str);
        let detail = error.and_then(|e| e.get("detail")).and_then(Value::as_str);
        match (kind, detail) {
            (Some(kind), Some(detail)) => {
                SolverError::new(SolverErrorKind::Other, format!("{kind}: {detail}"))
            }
            (Some(kind), None) => SolverError::new(SolverErrorKind::Other, kind),
            (None, _) => SolverError::new(
                SolverErrorKind::MalformedPayload,
                "failed result without a readable error",
            ),
        }
    }

    fn result(&self, kind: &JobKind) -> Result<JobResult, String> {
        let value = self
            .raw
            .result
            .clone()
            .ok_or_else(|| "successful result without a payload".to_string())?;
        let decoded = match kind.category() {
            Category::Fba => serde_json::from_value::<FbaSolution>(value).map(JobResult::Fba),
            Category::Fva => serde_json::from_value::<FvaSolution>(value).map(JobResult::Fva),
        };
        decoded.map_err(|err| format!("unreadable {} result: {err}", kind.category()))
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: Option<&Value>) -> Option<T> {
    value.and_then(|v| serde_json::from_value(v.clone()).ok())
}
