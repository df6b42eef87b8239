//! Streaming ingestion of record uploads into a document store.
//!
//! - Upload path: a temporary file (plain, gzip or zstd; any charset
//!   `encoding_rs` knows) is read line by line, split with a quote-aware
//!   comma splitter, and written to a [`RecordStore`] in batches of 1000.
//! - A failed batch falls back to one insert per record, so a bad row only
//!   costs itself.
//! - Listing path: the first 10 stored records, as the store returns them.
//!
//! Data shape:
//! - [`Record`] `{ id, firstname, lastname, email, email2, profession }`
//! - Replies: [`UploadReply`] / [`ListReply`], each with an HTTP status and a
//!   JSON body.
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
mod config;
mod ingest;
mod io;
mod jsonl;
mod list;
mod record;
mod response;
mod store;

pub use crate::config::{IngestConfig, DEFAULT_BATCH_SIZE};
pub use crate::ingest::{
    flush_batch, ingest_lines, ingest_reader, ingest_upload, IngestReport, IngestTally,
};
pub use crate::io::{decode_upload, lines, open_upload, Compression, UploadedFile};
pub use crate::jsonl::JsonlStore;
pub use crate::list::{list_records, LIST_LIMIT};
pub use crate::record::{looks_like_header, split_line, Record, RECORD_FIELDS};
pub use crate::response::{FailureStats, ListReply, UploadReply, UploadStats};
pub use crate::store::{MemoryStore, RecordStore, StoreError, StoreResult};

use thiserror::Error;

/// Failure reading the upload itself, as opposed to a single bad row.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("line {line} is longer than the configured maximum")]
    LineTooLong { line: u64 },
}

/// Error returned by [`ingest_upload`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no file was provided")]
    MissingFile,
    /// The stream broke mid-way; `tally` holds what was stored before that.
    #[error("{source}")]
    Stream {
        #[source]
        source: StreamError,
        tally: IngestTally,
    },
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
