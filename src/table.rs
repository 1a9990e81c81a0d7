use crate::err::{CellResult, ExtractionResult, IndexError};
use crate::event_fields::FieldName;
use crate::record_entry::RecordEntry;
use crate::record_index::RecordIndex;

use std::fmt;

/// The fixed columns of the event table, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    TimeCreated,
    Provider,
    EventId,
    Level,
}

pub const COLUMNS: [Column; 4] = [
    Column::TimeCreated,
    Column::Provider,
    Column::EventId,
    Column::Level,
];

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::TimeCreated => "TimeCreated",
            Column::Provider => "Provider",
            Column::EventId => "EventID",
            Column::Level => "Level",
        }
    }

    fn value(self, entry: &RecordEntry) -> ExtractionResult<DisplayValue> {
        let field = match self {
            Column::TimeCreated => {
                return Ok(DisplayValue::Timestamp(entry.timestamp().to_owned()));
            }
            Column::Provider => FieldName::Provider,
            Column::EventId => FieldName::EventId,
            Column::Level => FieldName::Level,
        };

        Ok(DisplayValue::Field {
            name: field,
            value: entry.field(field)?,
        })
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The content of a single table cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayValue {
    Timestamp(String),
    Field { name: FieldName, value: String },
}

impl DisplayValue {
    pub fn as_str(&self) -> &str {
        match self {
            DisplayValue::Timestamp(value) | DisplayValue::Field { value, .. } => value,
        }
    }
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only `(row, column)` view over a [`RecordIndex`].
#[derive(Debug, Clone, Copy)]
pub struct TableAdapter<'a> {
    index: &'a RecordIndex,
}

impl<'a> TableAdapter<'a> {
    pub fn new(index: &'a RecordIndex) -> Self {
        TableAdapter { index }
    }

    pub fn row_count(&self) -> usize {
        self.index.row_count()
    }

    pub fn column_count(&self) -> usize {
        COLUMNS.len()
    }

    pub fn columns(&self) -> &'static [Column] {
        &COLUMNS
    }

    pub fn column(&self, column: usize) -> Result<Column, IndexError> {
        COLUMNS
            .get(column)
            .copied()
            .ok_or(IndexError::ColumnOutOfRange {
                column,
                column_count: COLUMNS.len(),
            })
    }

    pub fn column_name(&self, column: usize) -> Result<&'static str, IndexError> {
        self.column(column).map(Column::name)
    }

    /// Extraction failures are propagated unchanged, rendering them is up to the caller.
    pub fn cell_value(&self, row: usize, column: usize) -> CellResult<DisplayValue> {
        let column = self.column(column)?;
        let entry = self.index.entry_at(row)?;

        Ok(column.value(entry)?)
    }

    /// All cells of a row. Each cell fails or succeeds on its own.
    pub fn row(&self, row: usize) -> Result<Vec<ExtractionResult<DisplayValue>>, IndexError> {
        let entry = self.index.entry_at(row)?;

        Ok(COLUMNS.iter().map(|column| column.value(entry)).collect())
    }
}
