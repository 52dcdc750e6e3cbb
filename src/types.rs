use serde::{Deserialize, Serialize};

/// Raw cell value handed to the resolver by an adapter.
///
/// Adapters normalize whatever their wire format carries (plain strings,
/// numbers rendered as text, or markup elements) into this union before it
/// reaches the core; the core never sees a raw markup object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawValue {
    /// A markup-derived cell: its visible text plus an optional link
    /// (image src / href) for plan extraction.
    Node { text: String, link: Option<String> },
    /// A plain text cell.
    Text(String),
}

impl RawValue {
    pub fn text(&self) -> &str {
        match self {
            RawValue::Text(t) => t,
            RawValue::Node { text, .. } => text,
        }
    }

    pub fn link(&self) -> Option<&str> {
        match self {
            RawValue::Text(_) => None,
            RawValue::Node { link, .. } => link.as_deref(),
        }
    }

    /// Converts an arbitrary JSON scalar into a text value; numbers and
    /// booleans are rendered as their literal form, null as empty text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => RawValue::Text(s.clone()),
            serde_json::Value::Null => RawValue::Text(String::new()),
            other => RawValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

/// One row of tabular input. Header cells and data cells are kept apart so
/// the resolver can recognize the three physical table shapes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub headers: Vec<RawValue>,
    pub cells: Vec<RawValue>,
}

/// Tabular per-unit input as extracted by an adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

/// Typed result of `CanonicalRecord::finalize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FinalizeOutcome {
    /// Record passed validation and corrective rewrites; safe to emit.
    Accepted,
    /// Record must not be persisted; the reason says why.
    Rejected(RejectReason),
}

impl FinalizeOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FinalizeOutcome::Accepted)
    }
}

/// Why a record was excluded rather than emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Classified into the skip bucket (villas, land plots, hotels, ...).
    SkippedType,
    /// Structural validation failed under `skip_wrong`.
    InvalidData(String),
    /// Price validation failed under `skip_wrong`.
    InvalidPrice(String),
}
