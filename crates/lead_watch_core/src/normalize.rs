use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use watch_logging::watch_debug;

use crate::decode::decode_text_lossy;
use crate::record::{
    bounded_excerpt, IdentitySource, NormalizedSnapshot, RawSnapshot, Record, SnapshotMode,
};

/// Clock times such as `09:15:02`.
static TIME_OF_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}:\d{2}:\d{2}\b").expect("valid time regex"));

/// Numeric dates: `2024-01-31`, `31/01/2024`, `1.31.24`.
static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}\b").expect("valid date regex")
});

/// `csrf_token = "..."`, `"sessionId": "..."`, `nonce=...` style assignments.
static TOKEN_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:csrf|xsrf|authenticity|session|sess|token|nonce)[\w-]*["']?\s*[:=]\s*["']?[A-Za-z0-9._~+/=-]+"#,
    )
    .expect("valid token regex")
});

/// `<meta name="csrf-token" content="...">`
static TOKEN_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:csrf|xsrf)[\w-]*["']\s+content=["'][^"']*["']"#)
        .expect("valid meta token regex")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static LEAD_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\blead-[A-Za-z0-9]+(?:[-_][A-Za-z0-9]+)*").expect("valid lead id regex")
});

const SCAN_CONTEXT_CHARS: usize = 40;

/// How records are located inside a structured payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    /// Every mapping element of the top-level collection is a record.
    DirectArray,
    /// Record-like elements are taken directly; other elements are searched
    /// at most `depth` mapping levels deep. Collections do not consume depth.
    NestedSearch { depth: usize },
}

impl Default for ExtractionRule {
    fn default() -> Self {
        ExtractionRule::NestedSearch { depth: 1 }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizerSettings {
    pub extraction: ExtractionRule,
    /// Fields holding an upstream identity, first match wins.
    pub id_fields: Vec<String>,
    /// Priority order of fields concatenated into a derived identity.
    pub identity_fields: Vec<String>,
    pub identity_separator: String,
    /// Field names that mark a mapping as record-like.
    pub known_fields: Vec<String>,
    /// Key fragments that mark a mapping as record-like when their value is scalar.
    pub record_terms: Vec<String>,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            extraction: ExtractionRule::default(),
            id_fields: strings(&["id", "leadId", "lead_id"]),
            identity_fields: strings(&[
                "name", "title", "location", "address", "job", "type", "category",
            ]),
            identity_separator: "|".to_string(),
            known_fields: strings(&[
                "id",
                "leadId",
                "name",
                "title",
                "location",
                "address",
                "job",
                "jobType",
                "type",
                "category",
                "timestamp",
                "description",
            ]),
            record_terms: strings(&["lead", "job", "customer", "client", "request"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Turns raw snapshots into comparable record sequences. Never fails: input
/// that is not a JSON collection degrades to a text scan.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    settings: NormalizerSettings,
}

impl Normalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &NormalizerSettings {
        &self.settings
    }

    pub fn normalize(&self, raw: &RawSnapshot) -> NormalizedSnapshot {
        let text = decode_text_lossy(&raw.bytes, raw.content_type.as_deref());
        match serde_json::from_str::<Value>(&text) {
            Ok(value @ (Value::Array(_) | Value::Object(_))) => {
                let records = self.extract(&value);
                watch_debug!("structured snapshot normalized to {} records", records.len());
                NormalizedSnapshot::structured(records)
            }
            Ok(_) | Err(_) => {
                let snapshot = scan_text(&text);
                watch_debug!(
                    "unstructured snapshot scanned, {} lead ids found",
                    snapshot.records.len()
                );
                snapshot
            }
        }
    }

    fn extract(&self, value: &Value) -> Vec<Record> {
        let elements: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let mut records = Vec::new();
        for element in elements {
            match self.settings.extraction {
                ExtractionRule::DirectArray => {
                    if let Value::Object(map) = element {
                        records.push(self.record_from(map));
                    }
                }
                ExtractionRule::NestedSearch { depth } => {
                    self.search(element, depth, &mut records);
                }
            }
        }
        records
    }

    fn search(&self, value: &Value, remaining: usize, out: &mut Vec<Record>) {
        match value {
            Value::Object(map) if self.is_record_like(map) => out.push(self.record_from(map)),
            Value::Object(map) if remaining > 0 => {
                for nested in map.values() {
                    self.search(nested, remaining - 1, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.search(item, remaining, out);
                }
            }
            _ => {}
        }
    }

    fn is_record_like(&self, map: &Map<String, Value>) -> bool {
        if map
            .keys()
            .any(|key| self.settings.known_fields.iter().any(|known| known == key))
        {
            return true;
        }
        map.iter().any(|(key, value)| {
            let key = key.to_ascii_lowercase();
            scalar_text(value).is_some()
                && self
                    .settings
                    .record_terms
                    .iter()
                    .any(|term| key.contains(term.as_str()))
        })
    }

    fn record_from(&self, map: &Map<String, Value>) -> Record {
        let fields: Vec<(String, String)> = map
            .iter()
            .filter_map(|(key, value)| scalar_text(value).map(|text| (key.clone(), text)))
            .collect();
        let raw_excerpt = bounded_excerpt(&serde_json::to_string(map).unwrap_or_default());

        let explicit = self.settings.id_fields.iter().find_map(|id_field| {
            fields
                .iter()
                .find(|(key, value)| key == id_field && !value.trim().is_empty())
                .map(|(_, value)| value.trim().to_string())
        });
        if let Some(identity) = explicit {
            return Record {
                identity,
                identity_source: IdentitySource::Explicit,
                fields,
                raw_excerpt,
            };
        }

        let parts: Vec<&str> = self
            .settings
            .identity_fields
            .iter()
            .filter_map(|name| {
                fields
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.trim())
                    .filter(|value| !value.is_empty())
            })
            .collect();
        let identity = if parts.is_empty() {
            // Nothing to key on; the scalar content itself is the key.
            let scalars: Map<String, Value> = fields
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect();
            Value::Object(scalars).to_string()
        } else {
            parts.join(&self.settings.identity_separator)
        };

        Record {
            identity,
            identity_source: IdentitySource::Derived,
            fields,
            raw_excerpt,
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Text with times, dates and session tokens removed and whitespace collapsed.
/// Lead identifiers are kept verbatim even when they contain date-like parts.
pub fn canonical_text(text: &str) -> String {
    let mut kept = String::with_capacity(text.len());
    let mut last = 0;
    for found in LEAD_ID.find_iter(text) {
        kept.push_str(&strip_volatile(&text[last..found.start()]));
        kept.push_str(found.as_str());
        last = found.end();
    }
    kept.push_str(&strip_volatile(&text[last..]));

    WHITESPACE_RUN.replace_all(&kept, " ").trim().to_string()
}

fn strip_volatile(text: &str) -> String {
    let stripped = TIME_OF_DAY.replace_all(text, "");
    let stripped = NUMERIC_DATE.replace_all(&stripped, "");
    let stripped = TOKEN_META.replace_all(&stripped, "");
    TOKEN_ASSIGNMENT.replace_all(&stripped, "").into_owned()
}

fn scan_text(text: &str) -> NormalizedSnapshot {
    let canonical = canonical_text(text);
    let canonical_digest = hex_digest(&canonical);

    let mut seen = HashSet::new();
    let records = LEAD_ID
        .find_iter(text)
        .filter(|found| seen.insert(found.as_str()))
        .map(|found| Record {
            identity: found.as_str().to_string(),
            identity_source: IdentitySource::Scanned,
            fields: Vec::new(),
            raw_excerpt: bounded_excerpt(context_window(text, found.start(), found.end())),
        })
        .collect();

    NormalizedSnapshot {
        records,
        mode: SnapshotMode::TextScan { canonical_digest },
    }
}

fn context_window(text: &str, start: usize, end: usize) -> &str {
    let mut from = start.saturating_sub(SCAN_CONTEXT_CHARS);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + SCAN_CONTEXT_CHARS).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    &text[from..to]
}

fn hex_digest(input: &str) -> String {
    use std::fmt::Write;

    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
