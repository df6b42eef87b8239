use encoding_rs::Encoding;

/// Records per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Per-call ingest settings.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Flush threshold; a value of 0 is treated as 1.
    pub batch_size: usize,
    /// Charset assumed when the upload's content type names none.
    pub charset: &'static Encoding,
    /// Longest accepted line in bytes. `None` means unbounded.
    pub max_line_length: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            charset: encoding_rs::UTF_8,
            max_line_length: None,
        }
    }
}

impl IngestConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_charset(mut self, charset: &'static Encoding) -> Self {
        self.charset = charset;
        self
    }

    /// Resolve a WHATWG label such as "latin1" or "utf-16le".
    pub fn with_charset_label(self, label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(|enc| self.with_charset(enc))
    }

    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = Some(max);
        self
    }

    pub(crate) fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}
