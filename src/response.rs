//! JSON bodies and status codes handed back to the transport layer.

use crate::ingest::{IngestReport, IngestTally};
use crate::record::Record;
use crate::store::StoreError;
use crate::IngestError;
use serde::Serialize;

const UPLOAD_OK: &str = "File processed successfully";
const UPLOAD_MISSING: &str = "No file was provided";
const UPLOAD_FAILED: &str = "Error processing the file";
const LIST_FAILED: &str = "Error listing records";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStats {
    pub records_processed: u64,
    pub errors: u64,
    pub processing_time_ms: u64,
    pub processing_time_seconds: f64,
}

/// Counters reported when an upload aborts part way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureStats {
    pub records_processed: u64,
    pub errors: u64,
}

impl From<&IngestReport> for UploadStats {
    fn from(report: &IngestReport) -> Self {
        Self {
            records_processed: report.tally.processed,
            errors: report.tally.errors,
            processing_time_ms: report.elapsed_ms(),
            processing_time_seconds: report.elapsed_seconds(),
        }
    }
}

impl From<&IngestTally> for FailureStats {
    fn from(tally: &IngestTally) -> Self {
        Self {
            records_processed: tally.processed,
            errors: tally.errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UploadReply {
    Processed {
        message: String,
        stats: UploadStats,
    },
    MissingFile {
        error: String,
    },
    Failed {
        error: String,
        details: String,
        stats: FailureStats,
    },
}

impl UploadReply {
    pub fn status(&self) -> u16 {
        match self {
            Self::Processed { .. } => 200,
            Self::MissingFile { .. } => 400,
            Self::Failed { .. } => 500,
        }
    }
}

impl From<Result<IngestReport, IngestError>> for UploadReply {
    fn from(outcome: Result<IngestReport, IngestError>) -> Self {
        match outcome {
            Ok(report) => Self::Processed {
                message: UPLOAD_OK.to_string(),
                stats: UploadStats::from(&report),
            },
            Err(IngestError::MissingFile) => Self::MissingFile {
                error: UPLOAD_MISSING.to_string(),
            },
            Err(IngestError::Stream { source, tally }) => Self::Failed {
                error: UPLOAD_FAILED.to_string(),
                details: source.to_string(),
                stats: FailureStats::from(&tally),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListReply {
    Records(Vec<Record>),
    Failed { error: String, details: String },
}

impl ListReply {
    pub fn status(&self) -> u16 {
        match self {
            Self::Records(_) => 200,
            Self::Failed { .. } => 500,
        }
    }
}

impl From<Result<Vec<Record>, StoreError>> for ListReply {
    fn from(outcome: Result<Vec<Record>, StoreError>) -> Self {
        match outcome {
            Ok(records) => Self::Records(records),
            Err(e) => Self::Failed {
                error: LIST_FAILED.to_string(),
                details: e.to_string(),
            },
        }
    }
}
