use async_compression::tokio::write::{GzipEncoder, ZstdEncoder};
use record_ingest::{
    ingest_upload, list_records, IngestConfig, IngestError, JsonlStore, ListReply, MemoryStore,
    Record, StreamError, UploadReply, UploadedFile,
};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

fn write_upload(dir: &Path, name: &str, body: &[u8]) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path)?;
    f.write_all(body)?;
    Ok(path)
}

fn rows(n: usize) -> String {
    let mut out = String::new();
    for i in 1..=n {
        out.push_str(&format!("{i},First{i},Last{i},u{i}@x.io,b{i}@x.io,Clerk\n"));
    }
    out
}

#[tokio::test]
async fn header_two_rows_and_a_short_row() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let body = "id,firstname,lastname,email,email2,profession\n\
                1,Ada,Lovelace,ada@x.io,ada@y.io,Mathematician\n\
                2,\"Hopper, Grace\",Hopper,grace@x.io,,Admiral\n\
                3,Short,Row,short@x.io\n";
    let path = write_upload(dir.path(), "people.csv", body.as_bytes())?;
    let store = MemoryStore::new();

    let report = ingest_upload(&store, Some(&UploadedFile::new(&path)), &IngestConfig::default())
        .await?;

    assert_eq!(report.tally.processed, 2);
    assert_eq!(report.tally.errors, 0);
    let stored = store.snapshot().await;
    assert_eq!(stored[1].firstname, "Hopper, Grace");
    assert_eq!(stored[1].email2, "");
    assert!(!path.exists(), "temporary upload should be removed");
    Ok(())
}

#[tokio::test]
async fn missing_file_is_a_client_error() {
    let store = MemoryStore::new();
    let outcome = ingest_upload(&store, None, &IngestConfig::default()).await;
    assert!(matches!(outcome, Err(IngestError::MissingFile)));

    let reply = UploadReply::from(outcome);
    assert_eq!(reply.status(), 400);
    let body = serde_json::to_value(&reply).unwrap();
    assert!(body.get("stats").is_none());
    assert_eq!(store.bulk_calls(), 0);
}

#[tokio::test]
async fn fifteen_hundred_rows_take_two_flushes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_upload(dir.path(), "big.csv", rows(1500).as_bytes())?;
    let store = MemoryStore::new();

    let report = ingest_upload(&store, Some(&UploadedFile::new(&path)), &IngestConfig::default())
        .await?;

    assert_eq!(store.bulk_calls(), 2);
    assert_eq!(report.tally.batches, 2);
    assert_eq!(report.tally.processed, 1500);
    assert_eq!(report.tally.errors, 0);
    assert_eq!(store.len().await, 1500);
    Ok(())
}

#[tokio::test]
async fn rejected_rows_are_counted_as_errors() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut body = rows(5);
    body.push_str("0,NoId,Row,none@x.io,,Clerk\n");
    let path = write_upload(dir.path(), "mixed.csv", body.as_bytes())?;
    let store = MemoryStore::new()
        .reject_when(|r: &Record| (r.id == 0).then(|| "id must be positive".to_string()));

    let reply = UploadReply::from(
        ingest_upload(&store, Some(&UploadedFile::new(&path)), &IngestConfig::default()).await,
    );

    assert_eq!(reply.status(), 200);
    let body = serde_json::to_value(&reply)?;
    assert_eq!(body["stats"]["recordsProcessed"], 5);
    assert_eq!(body["stats"]["errors"], 1);
    assert_eq!(store.single_calls(), 6);
    Ok(())
}

#[tokio::test]
async fn gzip_upload_matches_plain_upload() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let gz_path = dir.path().join("people.csv.gz");
    let mut enc = GzipEncoder::new(tokio::fs::File::create(&gz_path).await?);
    enc.write_all(rows(42).as_bytes()).await?;
    enc.shutdown().await?;

    let store = MemoryStore::new();
    let report = ingest_upload(
        &store,
        Some(&UploadedFile::new(&gz_path)),
        &IngestConfig::default(),
    )
    .await?;

    assert_eq!(report.tally.processed, 42);
    assert_eq!(store.snapshot().await[41].email, "u42@x.io");
    Ok(())
}

#[tokio::test]
async fn zstd_upload_matches_plain_upload() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let zst_path = dir.path().join("people.csv.zst");
    let mut enc = ZstdEncoder::new(tokio::fs::File::create(&zst_path).await?);
    enc.write_all(rows(1200).as_bytes()).await?;
    enc.shutdown().await?;

    let plain_path = write_upload(dir.path(), "people.csv", rows(1200).as_bytes())?;
    let zst = MemoryStore::new();
    let plain = MemoryStore::new();
    let report = ingest_upload(
        &zst,
        Some(&UploadedFile::new(&zst_path)),
        &IngestConfig::default(),
    )
    .await?;
    ingest_upload(
        &plain,
        Some(&UploadedFile::new(&plain_path)),
        &IngestConfig::default(),
    )
    .await?;

    assert_eq!(report.tally.processed, 1200);
    assert_eq!(report.tally.batches, 2);
    assert_eq!(zst.snapshot().await, plain.snapshot().await);
    assert!(!zst_path.exists(), "temporary upload should be removed");
    Ok(())
}

#[tokio::test]
async fn crlf_and_lf_inputs_agree() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let lf = rows(3);
    let crlf = lf.replace('\n', "\r\n");
    let lf_path = write_upload(dir.path(), "lf.csv", lf.as_bytes())?;
    let crlf_path = write_upload(dir.path(), "crlf.csv", crlf.as_bytes())?;

    let a = MemoryStore::new();
    let b = MemoryStore::new();
    ingest_upload(&a, Some(&UploadedFile::new(&lf_path)), &IngestConfig::default()).await?;
    ingest_upload(&b, Some(&UploadedFile::new(&crlf_path)), &IngestConfig::default()).await?;

    assert_eq!(a.snapshot().await, b.snapshot().await);
    assert_eq!(b.snapshot().await[2].profession, "Clerk");
    Ok(())
}

#[tokio::test]
async fn bare_cr_line_endings_split_rows() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let lf = rows(3);
    let cr = lf.replace('\n', "\r");
    let lf_path = write_upload(dir.path(), "lf.csv", lf.as_bytes())?;
    let cr_path = write_upload(dir.path(), "cr.csv", cr.as_bytes())?;

    let a = MemoryStore::new();
    let b = MemoryStore::new();
    ingest_upload(&a, Some(&UploadedFile::new(&lf_path)), &IngestConfig::default()).await?;
    let report =
        ingest_upload(&b, Some(&UploadedFile::new(&cr_path)), &IngestConfig::default()).await?;

    assert_eq!(report.tally.processed, 3);
    assert_eq!(b.len().await, 3);
    assert_eq!(a.snapshot().await, b.snapshot().await);
    Ok(())
}

#[tokio::test]
async fn latin1_upload_is_transcoded() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_upload(
        dir.path(),
        "latin1.csv",
        b"7,Jos\xe9,Mu\xf1oz,jose@x.io,,Ingeniero\n",
    )?;
    let upload = UploadedFile::new(&path).with_content_type("text/csv; charset=iso-8859-1");
    let store = MemoryStore::new();

    ingest_upload(&store, Some(&upload), &IngestConfig::default()).await?;

    let stored = store.snapshot().await;
    assert_eq!(stored[0].firstname, "José");
    assert_eq!(stored[0].lastname, "Muñoz");
    Ok(())
}

#[tokio::test]
async fn invalid_utf8_is_stored_with_replacement_chars() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut body = b"1,Jos\xe9,Bad\xff\xfe,jose@x.io,,Clerk\n".to_vec();
    body.extend_from_slice(rows(2).as_bytes());
    let path = write_upload(dir.path(), "broken.csv", &body)?;
    let store = MemoryStore::new();

    let reply = UploadReply::from(
        ingest_upload(&store, Some(&UploadedFile::new(&path)), &IngestConfig::default()).await,
    );

    assert_eq!(reply.status(), 200);
    let stats = &serde_json::to_value(&reply)?["stats"];
    assert_eq!(stats["recordsProcessed"], 3);
    assert_eq!(stats["errors"], 0);
    let stored = store.snapshot().await;
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].firstname, "Jos\u{fffd}");
    assert_eq!(stored[0].lastname, "Bad\u{fffd}\u{fffd}");
    assert_eq!(stored[0].email, "jose@x.io");
    assert!(!path.exists(), "temporary upload should be removed");
    Ok(())
}

#[tokio::test]
async fn oversized_line_aborts_with_partial_stats() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut body = rows(3);
    body.push_str(&format!("4,{},Row,long@x.io,,Clerk\n", "x".repeat(200)));
    body.push_str(&rows(2));
    let path = write_upload(dir.path(), "long.csv", body.as_bytes())?;
    let store = MemoryStore::new();
    let config = IngestConfig::default()
        .with_batch_size(2)
        .with_max_line_length(80);

    let outcome = ingest_upload(&store, Some(&UploadedFile::new(&path)), &config).await;

    match &outcome {
        Err(IngestError::Stream {
            source: StreamError::LineTooLong { line },
            tally,
        }) => {
            assert_eq!(*line, 4);
            // the first full batch made it, the pending third row did not
            assert_eq!(tally.processed, 2);
        }
        other => panic!("expected a stream failure, got {other:?}"),
    }
    assert!(!path.exists(), "temporary upload should be removed on failure");

    let reply = UploadReply::from(outcome);
    assert_eq!(reply.status(), 500);
    let body = serde_json::to_value(&reply)?;
    assert_eq!(body["stats"], json!({ "recordsProcessed": 2, "errors": 0 }));
    assert!(!body["details"].as_str().unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn unreadable_upload_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.csv");
    let store = MemoryStore::new();

    let reply = UploadReply::from(
        ingest_upload(&store, Some(&UploadedFile::new(&missing)), &IngestConfig::default()).await,
    );

    assert_eq!(reply.status(), 500);
    let body = serde_json::to_value(&reply).unwrap();
    assert_eq!(body["stats"]["recordsProcessed"], 0);
}

#[tokio::test]
async fn listing_reads_back_through_the_file_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = JsonlStore::new(dir.path().join("records.jsonl"));

    let empty = ListReply::from(list_records(&store).await);
    assert_eq!(serde_json::to_value(&empty)?, json!([]));

    let path = write_upload(dir.path(), "upload.csv", rows(12).as_bytes())?;
    ingest_upload(&store, Some(&UploadedFile::new(&path)), &IngestConfig::default()).await?;

    let listed = ListReply::from(list_records(&store).await);
    assert_eq!(listed.status(), 200);
    let body = serde_json::to_value(&listed)?;
    let items = body.as_array().map(Vec::len).unwrap_or_default();
    assert_eq!(items, 10);
    assert_eq!(
        body[0],
        json!({
            "id": 1,
            "firstname": "First1",
            "lastname": "Last1",
            "email": "u1@x.io",
            "email2": "b1@x.io",
            "profession": "Clerk"
        })
    );
    Ok(())
}

#[tokio::test]
async fn listing_outage_reports_detail() {
    let store = MemoryStore::new();
    store.set_unavailable(true);
    let reply = ListReply::from(list_records(&store).await);
    assert_eq!(reply.status(), 500);
    let body = serde_json::to_value(&reply).unwrap();
    assert_eq!(body["details"], "store unavailable: memory store is offline");
}
