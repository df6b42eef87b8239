use crate::config::IngestConfig;
use crate::io::{lines, open_upload, UploadedFile};
use crate::record::{looks_like_header, Record};
use crate::store::RecordStore;
use crate::{IngestError, IngestResult, StreamError};
use futures::{Stream, StreamExt};
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio_util::codec::LinesCodecError;
use tracing::{debug, error, info, trace, warn};

/// Counters for one ingest call. Never shared between calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestTally {
    /// Records the store accepted.
    pub processed: u64,
    /// Records the store refused during per-record fallback.
    pub errors: u64,
    /// Batches handed to the store.
    pub batches: u64,
    /// Batches whose bulk insert failed and were retried row by row.
    pub fallbacks: u64,
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestReport {
    pub tally: IngestTally,
    pub elapsed: Duration,
}

impl IngestReport {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    /// Elapsed seconds rounded to two decimals.
    pub fn elapsed_seconds(&self) -> f64 {
        (self.elapsed_ms() as f64 / 10.0).round() / 100.0
    }
}

/// Store one batch: a single unordered bulk insert, or on any failure one
/// insert per record in batch order.
///
/// Every record ends up counted exactly once, in `processed` or `errors`.
pub async fn flush_batch<S>(store: &S, batch: &[Record], tally: &mut IngestTally)
where
    S: RecordStore + ?Sized,
{
    if batch.is_empty() {
        return;
    }
    tally.batches += 1;

    match store.insert_many(batch).await {
        Ok(()) => {
            tally.processed += batch.len() as u64;
            trace!(size = batch.len(), "batch stored");
        }
        Err(e) => {
            tally.fallbacks += 1;
            warn!(
                size = batch.len(),
                error = %e,
                "bulk insert failed, inserting records one by one"
            );
            for record in batch {
                match store.insert_one(record).await {
                    Ok(()) => tally.processed += 1,
                    Err(e) => {
                        tally.errors += 1;
                        error!(
                            id = record.id,
                            email = %record.email,
                            error = %e,
                            "failed to insert record"
                        );
                    }
                }
            }
        }
    }
}

/// Drive a line stream through header detection, parsing and batching.
///
/// Stops at the first stream error. Rows already flushed stay counted in
/// `tally`; rows still waiting in the open batch are not stored.
pub async fn ingest_lines<L, S>(
    mut lines: L,
    store: &S,
    config: &IngestConfig,
    tally: &mut IngestTally,
) -> Result<(), StreamError>
where
    L: Stream<Item = Result<String, LinesCodecError>> + Unpin,
    S: RecordStore + ?Sized,
{
    let batch_size = config.effective_batch_size();
    let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
    let mut line_no = 0u64;

    while let Some(next) = lines.next().await {
        line_no += 1;
        let line = next.map_err(|e| match e {
            LinesCodecError::MaxLineLengthExceeded => StreamError::LineTooLong { line: line_no },
            LinesCodecError::Io(e) => StreamError::Io(e),
        })?;

        if line_no == 1 && looks_like_header(&line) {
            debug!("skipping header line");
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let Some(record) = Record::from_line(&line) else {
            trace!(line = line_no, "dropping short row");
            continue;
        };
        batch.push(record);

        if batch.len() >= batch_size {
            flush_batch(store, &batch, tally).await;
            batch.clear();
        }
    }

    flush_batch(store, &batch, tally).await;
    Ok(())
}

/// [`ingest_lines`] over an already decoded reader.
pub async fn ingest_reader<R, S>(
    reader: R,
    store: &S,
    config: &IngestConfig,
    tally: &mut IngestTally,
) -> Result<(), StreamError>
where
    R: AsyncRead + Unpin,
    S: RecordStore + ?Sized,
{
    ingest_lines(lines(reader, config.max_line_length), store, config, tally).await
}

/// Ingest one uploaded file and delete it afterwards.
///
/// Row and batch failures are absorbed into the tally. Only a broken stream
/// (unreadable file, corrupt compression, oversized line) fails the call, and
/// the temporary file is removed in that case too. Bytes that do not decode
/// in the upload's charset become U+FFFD rather than failing it.
#[tracing::instrument(skip_all, fields(path = tracing::field::Empty))]
pub async fn ingest_upload<S>(
    store: &S,
    upload: Option<&UploadedFile>,
    config: &IngestConfig,
) -> IngestResult<IngestReport>
where
    S: RecordStore + ?Sized,
{
    let started = Instant::now();
    let upload = upload.ok_or(IngestError::MissingFile)?;
    tracing::Span::current().record("path", tracing::field::display(upload.path.display()));

    let mut tally = IngestTally::default();
    let outcome = match open_upload(upload, config.charset).await {
        Ok(reader) => ingest_reader(reader, store, config, &mut tally).await,
        Err(e) => Err(e),
    };
    remove_upload(&upload.path).await;

    match outcome {
        Ok(()) => {
            let report = IngestReport {
                tally,
                elapsed: started.elapsed(),
            };
            info!(
                processed = tally.processed,
                errors = tally.errors,
                batches = tally.batches,
                fallbacks = tally.fallbacks,
                elapsed_ms = report.elapsed_ms(),
                "upload ingested"
            );
            Ok(report)
        }
        Err(source) => {
            error!(
                error = %source,
                processed = tally.processed,
                errors = tally.errors,
                "upload ingest aborted"
            );
            Err(IngestError::Stream { source, tally })
        }
    }
}

/// Best-effort removal of the temporary upload. Never fails the call.
async fn remove_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "temporary upload removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "failed to remove temporary upload"
        ),
    }
}
