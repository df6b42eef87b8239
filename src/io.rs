use crate::codec::{CharsetDecoder, LineDecoder};
use crate::StreamError;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use encoding_rs::Encoding;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

/// Read buffer for uploads (1 MiB).
const READ_BUFFER: usize = 1 << 20;

/// A temporary file handed over by the upload layer.
///
/// The ingest call owns the file at `path` and deletes it when done.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub path: PathBuf,
    /// Client-side file name, used for extension sniffing.
    pub original_name: Option<String>,
    /// e.g. "text/csv; charset=windows-1252" or "application/gzip"
    pub content_type: Option<String>,
    /// e.g. "gzip", "zstd"
    pub content_encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl UploadedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    /// Name used for extension sniffing: the client name, else the temp path.
    fn name_hint(&self) -> String {
        match &self.original_name {
            Some(name) => name.to_ascii_lowercase(),
            None => file_name(&self.path).to_ascii_lowercase(),
        }
    }

    /// Compression choice: encoding -> type -> extension.
    pub fn compression(&self) -> Compression {
        let ce = self
            .content_encoding
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let ct = self.mime().to_ascii_lowercase();
        let name = self.name_hint();

        if ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || name.ends_with(".gz")
        {
            Compression::Gzip
        } else if ce.split(',').any(|s| s.trim() == "zstd")
            || ct == "application/zstd"
            || name.ends_with(".zst")
        {
            Compression::Zstd
        } else {
            Compression::None
        }
    }

    /// `charset=` parameter of the content type, else `fallback`.
    pub fn charset(&self, fallback: &'static Encoding) -> &'static Encoding {
        self.content_type
            .as_deref()
            .and_then(|ct| {
                ct.split(';').skip(1).find_map(|param| {
                    let (key, value) = param.split_once('=')?;
                    if key.trim().eq_ignore_ascii_case("charset") {
                        Encoding::for_label(value.trim().trim_matches('"').as_bytes())
                    } else {
                        None
                    }
                })
            })
            .unwrap_or(fallback)
    }

    fn mime(&self) -> &str {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .unwrap_or_default()
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
}

/// Wrap a raw upload with optional decompression and UTF-8 transcoding.
pub fn decode_upload<R>(
    raw: R,
    compression: Compression,
    charset: &'static Encoding,
) -> Box<dyn AsyncRead + Unpin + Send>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = BufReader::with_capacity(READ_BUFFER, raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = match compression {
        Compression::Gzip => Box::new(GzipDecoder::new(buf)),
        Compression::Zstd => Box::new(ZstdDecoder::new(buf)),
        Compression::None => Box::new(buf),
    };

    // UTF-8 is decoded as well, so stray bytes turn into U+FFFD instead of
    // failing the upload
    let framed = FramedRead::new(decompressed, CharsetDecoder::new(charset));
    Box::new(StreamReader::new(framed))
}

/// Open an upload for streaming, honoring its compression and charset.
pub async fn open_upload(
    upload: &UploadedFile,
    default_charset: &'static Encoding,
) -> Result<Box<dyn AsyncRead + Unpin + Send>, StreamError> {
    let file = File::open(&upload.path).await?;
    Ok(decode_upload(
        file,
        upload.compression(),
        upload.charset(default_charset),
    ))
}

/// Split a decoded upload into lines on `\n`, `\r\n` or a lone `\r`.
pub fn lines<R>(reader: R, max_line_length: Option<usize>) -> FramedRead<R, LineDecoder>
where
    R: AsyncRead,
{
    FramedRead::with_capacity(reader, LineDecoder::new(max_line_length), READ_BUFFER)
}
