use crate::err::IndexError;
use crate::event_fields::FieldExtractor;
use crate::record_entry::{RawRecord, RecordEntry};
use crate::xml_tree::DuplicateChildPolicy;

use hashbrown::HashMap;
use log::{debug, info};
use std::sync::Arc;

#[cfg(feature = "multithreading")]
use rayon::prelude::*;

type FastMap<K, V> = HashMap<K, V, ahash::RandomState>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSettings {
    /// Controls the number of threads used by [`RecordIndex::parse_all`].
    /// `0` uses the global rayon pool, `1` parses on the calling thread.
    num_threads: usize,
    duplicate_children: DuplicateChildPolicy,
}

impl IndexSettings {
    pub fn new() -> Self {
        IndexSettings::default()
    }

    /// Sets the number of worker threads.
    /// `0` will let rayon decide.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = if cfg!(feature = "multithreading") {
            num_threads
        } else {
            // Without rayon everything runs on the calling thread.
            1
        };
        self
    }

    /// Sets which of several same-named sibling elements is used during field extraction.
    pub fn duplicate_children(mut self, policy: DuplicateChildPolicy) -> Self {
        self.duplicate_children = policy;
        self
    }

    pub fn get_num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn get_duplicate_children(&self) -> DuplicateChildPolicy {
        self.duplicate_children
    }
}

/// All records of a log, addressable both by record id and by row.
///
/// Rows are the record ids in ascending order. The ordering is computed once in
/// [`RecordIndex::load`] and kept separately from the id lookup table.
#[derive(Debug)]
pub struct RecordIndex {
    entries: FastMap<u64, RecordEntry>,
    ordered_ids: Vec<u64>,
    extractor: Arc<FieldExtractor>,
    settings: IndexSettings,
}

impl RecordIndex {
    pub fn load(records: impl IntoIterator<Item = RawRecord>) -> Self {
        Self::load_with_settings(records, IndexSettings::default())
    }

    /// Builds an index, a record replaces any earlier record with the same id.
    ///
    /// No payload is parsed here.
    pub fn load_with_settings(
        records: impl IntoIterator<Item = RawRecord>,
        settings: IndexSettings,
    ) -> Self {
        let extractor = Arc::new(FieldExtractor::with_policy(settings.duplicate_children));
        let mut entries = FastMap::default();
        let mut received = 0_usize;

        for record in records {
            received += 1;
            let id = record.id;
            if entries
                .insert(id, RecordEntry::new(record, Arc::clone(&extractor)))
                .is_some()
            {
                debug!("record {} appeared more than once, keeping the last one", id);
            }
        }

        let mut ordered_ids: Vec<u64> = entries.keys().copied().collect();
        ordered_ids.sort_unstable();

        info!(
            "indexed {} records ({} received)",
            ordered_ids.len(),
            received
        );

        RecordIndex {
            entries,
            ordered_ids,
            extractor,
            settings,
        }
    }

    pub fn row_count(&self) -> usize {
        self.ordered_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_ids.is_empty()
    }

    pub fn entry_at(&self, row: usize) -> Result<&RecordEntry, IndexError> {
        let id = self
            .ordered_ids
            .get(row)
            .ok_or(IndexError::RowOutOfRange {
                row,
                row_count: self.row_count(),
            })?;

        Ok(&self.entries[id])
    }

    pub fn get(&self, id: u64) -> Option<&RecordEntry> {
        self.entries.get(&id)
    }

    /// The row a record id is displayed at.
    pub fn row_of(&self, id: u64) -> Option<usize> {
        self.ordered_ids.binary_search(&id).ok()
    }

    /// Record ids in row order.
    pub fn ids(&self) -> &[u64] {
        &self.ordered_ids
    }

    /// Entries in row order.
    pub fn iter(&self) -> impl Iterator<Item = &RecordEntry> + '_ {
        self.ordered_ids.iter().map(move |id| &self.entries[id])
    }

    pub fn extractor(&self) -> &FieldExtractor {
        &self.extractor
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Parses the fields of every entry that has not been parsed yet.
    ///
    /// Returns the number of entries whose payload failed to yield fields. Those stay unparsed.
    pub fn parse_all(&self) -> usize {
        let failures = match self.settings.num_threads {
            1 => self.parse_all_sequential(),
            #[cfg(feature = "multithreading")]
            0 => self.parse_all_parallel(),
            #[cfg(feature = "multithreading")]
            n => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => pool.install(|| self.parse_all_parallel()),
                Err(e) => {
                    log::warn!("failed to build a thread pool ({}), parsing sequentially", e);
                    self.parse_all_sequential()
                }
            },
            #[cfg(not(feature = "multithreading"))]
            _ => self.parse_all_sequential(),
        };

        debug!(
            "parsed {} records, {} failed",
            self.row_count() - failures,
            failures
        );

        failures
    }

    fn parse_all_sequential(&self) -> usize {
        self.iter().filter(|entry| entry.fields().is_err()).count()
    }

    #[cfg(feature = "multithreading")]
    fn parse_all_parallel(&self) -> usize {
        self.ordered_ids
            .par_iter()
            .filter(|id| self.entries[*id].fields().is_err())
            .count()
    }
}
