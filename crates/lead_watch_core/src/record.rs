use std::time::SystemTime;

/// Upper bound (in chars) of the diagnostic excerpt kept on each record.
pub const RAW_EXCERPT_MAX_CHARS: usize = 200;

/// Bytes captured by one fetch. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSnapshot {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub captured_at: SystemTime,
}

impl RawSnapshot {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
            captured_at: SystemTime::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Where a record's identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentitySource {
    /// Upstream supplied an explicit id field.
    Explicit,
    /// Composite key built from best-effort fields.
    Derived,
    /// `lead-<token>` match found by the text scan.
    Scanned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub identity: String,
    pub identity_source: IdentitySource,
    /// Ordered name → value pairs.
    pub fields: Vec<(String, String)>,
    pub raw_excerpt: String,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_reliable_identity(&self) -> bool {
        self.identity_source != IdentitySource::Derived
    }
}

/// How a snapshot was normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotMode {
    Structured,
    /// Opaque text; `canonical_digest` is the SHA-256 of the text with
    /// volatile substrings removed.
    TextScan { canonical_digest: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSnapshot {
    pub records: Vec<Record>,
    pub mode: SnapshotMode,
}

impl NormalizedSnapshot {
    pub fn structured(records: Vec<Record>) -> Self {
        Self {
            records,
            mode: SnapshotMode::Structured,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Records present in the current snapshot but not in the baseline, in
/// current-snapshot order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewRecordBatch {
    pub records: Vec<Record>,
}

impl NewRecordBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn identities(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|record| record.identity.clone())
            .collect()
    }
}

/// Truncate to at most [`RAW_EXCERPT_MAX_CHARS`] chars, on a char boundary.
pub fn bounded_excerpt(text: &str) -> String {
    match text.char_indices().nth(RAW_EXCERPT_MAX_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
