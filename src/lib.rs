pub mod decoder;
pub mod err;
pub mod event_fields;
pub mod record_entry;
pub mod record_index;
pub mod table;
pub mod xml_tree;

pub use decoder::raw_records_from_jsonl;
#[cfg(feature = "evtx_input")]
pub use decoder::raw_records_from_evtx;
pub use event_fields::{EventFields, FieldExtractor, FieldName, Level};
pub use record_entry::{FieldCache, RawRecord, RecordEntry};
pub use record_index::{IndexSettings, RecordIndex};
pub use table::{COLUMNS, Column, DisplayValue, TableAdapter};
pub use xml_tree::{DuplicateChildPolicy, XmlNode};

#[cfg(test)]
use std::sync::Once;
#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}
