use crate::err::ExtractionResult;
use crate::event_fields::{EventFields, FieldExtractor, FieldName};

use log::trace;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// A record as handed over by the container decoder.
///
/// The serialized form uses the field names of `evtx` records, so JSON lines produced by
/// `evtx_dump -o jsonl`-style tooling with raw XML data can be fed back in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "event_record_id")]
    pub id: u64,
    pub timestamp: String,
    #[serde(rename = "data")]
    pub payload: String,
}

impl RawRecord {
    pub fn new(id: u64, timestamp: impl Into<String>, payload: impl Into<String>) -> Self {
        RawRecord {
            id,
            timestamp: timestamp.into(),
            payload: payload.into(),
        }
    }
}

/// Memoized derived fields of a single record.
///
/// The only legal transition is `Unparsed -> Parsed`, and it happens at most once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldCache {
    #[default]
    Unparsed,
    Parsed(EventFields),
}

#[derive(Debug)]
pub struct RecordEntry {
    id: u64,
    timestamp: String,
    payload: String,
    cache: RwLock<FieldCache>,
    extractor: Arc<FieldExtractor>,
}

impl RecordEntry {
    pub fn new(raw: RawRecord, extractor: Arc<FieldExtractor>) -> Self {
        RecordEntry {
            id: raw.id,
            timestamp: raw.timestamp,
            payload: raw.payload,
            cache: RwLock::new(FieldCache::Unparsed),
            extractor,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn is_parsed(&self) -> bool {
        matches!(
            *self.cache.read().expect("lock poisoned"),
            FieldCache::Parsed(_)
        )
    }

    /// A snapshot of the current cache state.
    pub fn cache_state(&self) -> FieldCache {
        self.cache.read().expect("lock poisoned").clone()
    }

    /// Returns a single derived field, parsing the payload on first access.
    ///
    /// Failures are returned as-is and leave the entry unparsed, so the next access retries.
    pub fn field(&self, name: FieldName) -> ExtractionResult<String> {
        if let FieldCache::Parsed(fields) = &*self.cache.read().expect("lock poisoned") {
            return Ok(fields.get(name));
        }

        Ok(self.fields()?.get(name))
    }

    /// Returns all derived fields, parsing the payload on first access.
    pub fn fields(&self) -> ExtractionResult<EventFields> {
        if let FieldCache::Parsed(fields) = &*self.cache.read().expect("lock poisoned") {
            return Ok(fields.clone());
        }

        // Parse without holding the lock, concurrent readers of other fields are not blocked.
        let fields = self.extractor.extract(&self.payload)?;

        let mut cache = self.cache.write().expect("lock poisoned");
        match &*cache {
            // First writer wins, our own result is dropped.
            FieldCache::Parsed(existing) => {
                trace!("record {} was parsed concurrently", self.id);
                Ok(existing.clone())
            }
            FieldCache::Unparsed => {
                *cache = FieldCache::Parsed(fields.clone());
                Ok(fields)
            }
        }
    }
}
