//! Sources of [`RawRecord`]s.
//!
//! The index itself never does I/O. These helpers materialize the `(id, timestamp, xml)` triples
//! it is loaded from, either from an EVTX file or from JSON lines.

use crate::err::LoadError;
use crate::record_entry::RawRecord;

use log::debug;
use std::io::BufRead;

#[cfg(feature = "evtx_input")]
use std::path::Path;

/// Reads one JSON encoded [`RawRecord`] per line. Blank lines are skipped.
pub fn raw_records_from_jsonl(reader: impl BufRead) -> Result<Vec<RawRecord>, LoadError> {
    let mut records = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record = serde_json::from_str(line).map_err(|source| LoadError::InvalidJsonLine {
            line: line_no + 1,
            source,
        })?;
        records.push(record);
    }

    debug!("read {} raw records from JSON lines", records.len());
    Ok(records)
}

/// Decodes every record of an EVTX file into its XML form.
///
/// Records the decoder cannot handle are logged and skipped, the rest of the file is still
/// returned.
#[cfg(feature = "evtx_input")]
pub fn raw_records_from_evtx(path: impl AsRef<Path>) -> Result<Vec<RawRecord>, LoadError> {
    let path = path.as_ref();
    let mut parser =
        evtx::EvtxParser::from_path(path).map_err(|e| LoadError::Decoder(Box::new(e)))?;

    let mut records = Vec::new();
    let mut skipped = 0_usize;

    for record in parser.records() {
        match record {
            Ok(r) => records.push(RawRecord::new(
                r.event_record_id,
                r.timestamp.to_string(),
                r.data,
            )),
            Err(e) => {
                skipped += 1;
                log::warn!("skipping record in {}: {}", path.display(), e);
            }
        }
    }

    debug!(
        "decoded {} records from {} ({} skipped)",
        records.len(),
        path.display(),
        skipped
    );

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_reads_json_lines() {
        let input = concat!(
            r#"{"event_record_id": 2, "timestamp": "b", "data": "<x/>"}"#,
            "\n\n",
            r#"{"event_record_id": 1, "timestamp": "a", "data": "<y/>"}"#,
            "\n"
        );

        let records = raw_records_from_jsonl(Cursor::new(input)).unwrap();

        assert_eq!(
            records,
            vec![RawRecord::new(2, "b", "<x/>"), RawRecord::new(1, "a", "<y/>")]
        );
    }

    #[test]
    fn test_reports_the_offending_line() {
        let input = "{\"event_record_id\": 1, \"timestamp\": \"a\", \"data\": \"\"}\n{oops}\n";

        match raw_records_from_jsonl(Cursor::new(input)) {
            Err(LoadError::InvalidJsonLine { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected an invalid line error, got {:?}", other),
        }
    }

    /// A file header followed by no chunks, as written for a freshly created log.
    #[cfg(feature = "evtx_input")]
    fn empty_evtx_file() -> Vec<u8> {
        let mut header = Vec::with_capacity(4096);
        header.extend_from_slice(b"ElfFile\x00");
        header.extend_from_slice(&0_u64.to_le_bytes()); // first chunk
        header.extend_from_slice(&0_u64.to_le_bytes()); // last chunk
        header.extend_from_slice(&1_u64.to_le_bytes()); // next record id
        header.extend_from_slice(&128_u32.to_le_bytes());
        header.extend_from_slice(&1_u16.to_le_bytes());
        header.extend_from_slice(&3_u16.to_le_bytes());
        header.extend_from_slice(&4096_u16.to_le_bytes());
        header.extend_from_slice(&0_u16.to_le_bytes()); // chunk count
        header.resize(120, 0);
        header.extend_from_slice(&0_u32.to_le_bytes()); // flags
        header.extend_from_slice(&0_u32.to_le_bytes()); // checksum
        header.resize(4096, 0);
        header
    }

    #[cfg(feature = "evtx_input")]
    #[test]
    fn test_decodes_a_log_without_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.evtx");
        std::fs::write(&path, empty_evtx_file()).unwrap();

        assert_eq!(raw_records_from_evtx(&path).unwrap(), Vec::new());
    }

    #[cfg(feature = "evtx_input")]
    #[test]
    fn test_rejects_files_without_evtx_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_log.evtx");
        let mut data = empty_evtx_file();
        data[..8].copy_from_slice(b"NotAnEvt");
        std::fs::write(&path, data).unwrap();

        assert!(matches!(
            raw_records_from_evtx(&path),
            Err(LoadError::Decoder(_))
        ));
    }
}
