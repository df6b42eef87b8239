use anyhow::{anyhow, Context};
use clap::{Arg, ArgMatches, Command};
use record_ingest::{
    ingest_upload, list_records, IngestConfig, JsonlStore, ListReply, UploadReply, UploadedFile,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let store = Arg::new("store")
        .long("store")
        .help("JSON-lines file records are written to and listed from")
        .value_parser(clap::value_parser!(PathBuf))
        .required(true);

    Command::new("record-ingest")
        .subcommand_required(true)
        .subcommand(
            Command::new("upload")
                .about("Ingest a record file as if it had been uploaded")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .value_parser(clap::value_parser!(PathBuf))
                        .required(true),
                )
                .arg(store.clone())
                .arg(
                    Arg::new("batch-size")
                        .long("batch-size")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1000"),
                )
                .arg(
                    Arg::new("charset")
                        .long("charset")
                        .help("Charset label when the file is not UTF-8, e.g. latin1"),
                )
                .arg(
                    Arg::new("content-type")
                        .long("content-type")
                        .help("Upload content type, e.g. text/csv; charset=utf-16le"),
                )
                .arg(
                    Arg::new("content-encoding")
                        .long("content-encoding")
                        .help("gzip or zstd; otherwise sniffed from the extension"),
                )
                .arg(
                    Arg::new("max-line-length")
                        .long("max-line-length")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("Print the first stored records")
                .arg(store),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // stdout carries the reply, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let (status, body) = match matches.subcommand() {
        Some(("upload", sub)) => upload(sub).await?,
        Some(("list", sub)) => list(sub).await?,
        _ => return Err(anyhow!("unknown subcommand")),
    };

    println!("{body}");
    Ok(if status < 400 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn upload(args: &ArgMatches) -> anyhow::Result<(u16, String)> {
    let source = args
        .get_one::<PathBuf>("path")
        .ok_or_else(|| anyhow!("--path is required"))?;
    let store = JsonlStore::new(store_path(args)?);

    let mut config = IngestConfig::default().with_batch_size(
        args.get_one::<usize>("batch-size")
            .copied()
            .unwrap_or(record_ingest::DEFAULT_BATCH_SIZE),
    );
    if let Some(label) = args.get_one::<String>("charset") {
        config = config
            .with_charset_label(label)
            .ok_or_else(|| anyhow!("unknown charset label: {label}"))?;
    }
    if let Some(max) = args.get_one::<usize>("max-line-length") {
        config = config.with_max_line_length(*max);
    }

    // The pipeline deletes its input, so hand it a staged copy.
    let staged = stage_copy(source).await?;
    let mut upload = UploadedFile::new(staged);
    if let Some(name) = source.file_name().and_then(|s| s.to_str()) {
        upload = upload.with_original_name(name);
    }
    if let Some(ct) = args.get_one::<String>("content-type") {
        upload = upload.with_content_type(ct.as_str());
    }
    if let Some(ce) = args.get_one::<String>("content-encoding") {
        upload = upload.with_content_encoding(ce.as_str());
    }

    let reply = UploadReply::from(ingest_upload(&store, Some(&upload), &config).await);
    Ok((reply.status(), serde_json::to_string_pretty(&reply)?))
}

async fn list(args: &ArgMatches) -> anyhow::Result<(u16, String)> {
    let store = JsonlStore::new(store_path(args)?);
    let reply = ListReply::from(list_records(&store).await);
    Ok((reply.status(), serde_json::to_string_pretty(&reply)?))
}

fn store_path(args: &ArgMatches) -> anyhow::Result<PathBuf> {
    args.get_one::<PathBuf>("store")
        .cloned()
        .ok_or_else(|| anyhow!("--store is required"))
}

async fn stage_copy(source: &Path) -> anyhow::Result<PathBuf> {
    let staged = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile()
        .context("creating temporary upload")?;
    // keep the file on disk; ingest_upload owns its removal
    let (_file, path) = staged.keep().context("keeping temporary upload")?;
    tokio::fs::copy(source, &path)
        .await
        .with_context(|| format!("staging {}", source.display()))?;
    Ok(path)
}
