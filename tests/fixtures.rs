#![allow(dead_code)]
use std::path::PathBuf;

use std::sync::Once;

use evtx_table::RawRecord;

static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}

pub fn samples_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("samples")
        .canonicalize()
        .unwrap()
}

pub fn jsonl_sample() -> PathBuf {
    samples_dir().join("system_records.jsonl")
}

pub fn security_event_xml() -> &'static str {
    include_str!("../samples/security_event_4624.xml")
}

/// A minimal record payload the way `evtx` renders it, with a prefixed namespace on `System`.
pub fn event_xml(provider: &str, event_id: u32, level: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<ev:Event xmlns:ev="http://schemas.microsoft.com/win/2004/08/events/event">
  <ev:System>
    <ev:Provider Name="{}" />
    <ev:EventID>{}</ev:EventID>
    <ev:Level>{}</ev:Level>
  </ev:System>
</ev:Event>"#,
        provider, event_id, level
    )
}

pub fn raw_record(id: u64, provider: &str, event_id: u32, level: &str) -> RawRecord {
    RawRecord::new(
        id,
        format!("2019-02-04 14:{:02}:00.000000 UTC", id % 60),
        event_xml(provider, event_id, level),
    )
}
