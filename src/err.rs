use thiserror::Error;

pub type XmlTreeResult<T> = std::result::Result<T, XmlTreeError>;
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;
pub type CellResult<T> = std::result::Result<T, CellError>;

/// Errors raised while building a namespace-stripped tree out of a payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XmlTreeError {
    #[error("Offset {position}: malformed XML: {message}")]
    Malformed { position: u64, message: String },

    #[error("Offset {position}: closing tag `</{found}>` does not match any open element")]
    UnexpectedClosingTag { found: String, position: u64 },

    #[error("Reached end of input with element `<{name}>` still open")]
    UnclosedElement { name: String },

    #[error("Document does not contain a root element")]
    NoRootElement,

    #[error("Offset {position}: found a second root element `<{name}>`")]
    MultipleRootElements { name: String, position: u64 },

    #[error("Offset {position}: unexpected text outside of the root element")]
    TextOutsideRoot { position: u64 },
}

impl XmlTreeError {
    pub(crate) fn malformed(err: impl std::fmt::Display, position: u64) -> Self {
        XmlTreeError::Malformed {
            position,
            message: err.to_string(),
        }
    }
}

/// A required element, attribute or text node was absent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{missing}` is missing while looking up `{path}`")]
pub struct LookupError {
    /// The full path that was requested, joined with `/`.
    pub path: String,
    /// The first segment which could not be resolved.
    pub missing: String,
}

impl LookupError {
    pub(crate) fn new(path: &[&str], missing: impl Into<String>) -> Self {
        LookupError {
            path: path.join("/"),
            missing: missing.into(),
        }
    }
}

/// Per-record failures when deriving fields from a payload.
///
/// These never affect other records in an index, and are never cached.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Failed to parse record payload: {0}")]
    Parse(#[from] XmlTreeError),

    #[error("Record payload is missing a required field: {0}")]
    Lookup(#[from] LookupError),

    #[error("Level `{value}` is not an integer in the range 0-5")]
    LevelRange { value: String },
}

/// Out-of-bounds table addressing. This is a caller contract violation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Row {row} is out of range (table has {row_count} rows)")]
    RowOutOfRange { row: usize, row_count: usize },

    #[error("Column {column} is out of range (table has {column_count} columns)")]
    ColumnOutOfRange { column: usize, column_count: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CellError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Errors raised while reading raw records from an external source.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("An I/O error has occurred while reading records: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: invalid raw record: {source}")]
    InvalidJsonLine {
        line: usize,
        source: serde_json::Error,
    },

    #[error("The EVTX decoder failed: {0}")]
    Decoder(#[source] Box<dyn std::error::Error + Send + Sync>),
}
