//! Data returned by the Read API's `analyzeResults` endpoint.
//!
//! Only `status`, the page order, the line order and each line's `text`
//! matter to us. Everything else is optional, so that small changes to the
//! service's payload don't break parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The state of an asynchronous Read operation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum OperationStatus {
    /// Queued, but not yet picked up.
    NotStarted,
    /// Recognition is in progress.
    Running,
    /// Recognition finished, and `analyzeResult` is available.
    Succeeded,
    /// Recognition failed. No further transitions will happen.
    Failed,
    /// A status we don't know about.
    Other(String),
}

impl OperationStatus {
    /// Will this operation change state again?
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Succeeded | OperationStatus::Failed)
    }

    /// The status as the service spells it.
    pub fn as_str(&self) -> &str {
        match self {
            OperationStatus::NotStarted => "notStarted",
            OperationStatus::Running => "running",
            OperationStatus::Succeeded => "succeeded",
            OperationStatus::Failed => "failed",
            OperationStatus::Other(status) => status,
        }
    }
}

impl From<String> for OperationStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "notStarted" => OperationStatus::NotStarted,
            "running" => OperationStatus::Running,
            "succeeded" => OperationStatus::Succeeded,
            "failed" => OperationStatus::Failed,
            _ => OperationStatus::Other(status),
        }
    }
}

impl From<OperationStatus> for String {
    fn from(status: OperationStatus) -> Self {
        match status {
            OperationStatus::Other(status) => status,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One poll of a Read operation.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOperationResult {
    /// Where the operation is in its lifecycle.
    pub status: OperationStatus,

    /// When the operation was submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,

    /// When the operation last changed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_date_time: Option<String>,

    /// The recognized text. Only present once `status` is `succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyze_result: Option<AnalyzeResult>,
}

/// The recognized text of a whole document.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    /// Schema version of the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Version of the OCR model that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,

    /// Pages, in document order.
    #[serde(default)]
    pub read_results: Vec<ReadResult>,
}

/// The recognized text of a single page.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResult {
    /// 1-based page number.
    #[serde(default)]
    pub page: u32,

    /// Detected text angle, in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    /// `pixel` for images, `inch` for PDFs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Lines, in reading order.
    #[serde(default)]
    pub lines: Vec<Line>,
}

/// A single line of text.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub text: String,

    /// Eight numbers: the four corners of the line, clockwise from top left.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding_box: Vec<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

/// A single word within a [`Line`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding_box: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// The error payload returned with non-2xx responses.
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorDetails {
    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (Some(code), None) => f.write_str(code),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("unknown error"),
        }
    }
}
