//! Foreign-key resolution with a single-entry cache.
//!
//! Source records usually arrive grouped by foreign key (runs of parts from
//! the same supplier), so remembering only the last key and its result
//! removes almost every repeated lookup.

use crate::btree::{KeyLookup, SearchMode};
use bytes::Bytes;
use keydex_common::{RecordPointer, Result, display_key};
use tracing::{debug, warn};

/// Outcome of resolving a foreign key for a dependent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// Key found and pointer within the target store.
    Linked(RecordPointer),
    /// Key not present in the target index.
    Unlinked,
    /// Key found but the pointer lies beyond the target store's valid range.
    OutOfRange(RecordPointer),
}

impl Association {
    /// Returns the pointer only for a usable association.
    pub fn pointer(&self) -> Option<RecordPointer> {
        match self {
            Association::Linked(p) => Some(*p),
            Association::Unlinked | Association::OutOfRange(_) => None,
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, Association::Linked(_))
    }
}

/// Resolver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Lookups passed to the underlying index.
    pub lookups: u64,
    /// Requests answered from the cache.
    pub hits: u64,
    /// Underlying lookups that found nothing.
    pub misses: u64,
    /// Associations rejected because the pointer was out of range.
    pub out_of_range: u64,
}

/// Resolves foreign keys through a [`KeyLookup`], caching the most recent result.
pub struct ForeignKeyResolver<L: KeyLookup> {
    lookup: L,
    mode: SearchMode,
    /// Highest valid pointer in the target store, if checked.
    valid_max: Option<u32>,
    cached: Option<(Bytes, Option<RecordPointer>)>,
    stats: ResolverStats,
}

impl<L: KeyLookup> ForeignKeyResolver<L> {
    pub fn new(lookup: L, mode: SearchMode) -> Self {
        Self {
            lookup,
            mode,
            valid_max: None,
            cached: None,
            stats: ResolverStats::default(),
        }
    }

    /// Treats pointers above `max` as out of range in [`associate`](Self::associate).
    /// Usually the record count of the target store.
    pub fn with_valid_range(mut self, max: u32) -> Self {
        self.valid_max = Some(max);
        self
    }

    /// Returns the target pointer for `foreign_key`, or `None` if absent.
    ///
    /// Repeating the previous key is answered from the cache. Errors are
    /// propagated and never cached.
    pub fn resolve(&mut self, foreign_key: &[u8]) -> Result<Option<RecordPointer>> {
        if let Some((key, result)) = &self.cached {
            if key.as_ref() == foreign_key {
                self.stats.hits += 1;
                return Ok(*result);
            }
        }

        let result = self.lookup.lookup(foreign_key, self.mode)?;
        self.stats.lookups += 1;
        if result.is_none() {
            self.stats.misses += 1;
        }
        self.cached = Some((Bytes::copy_from_slice(foreign_key), result));
        Ok(result)
    }

    /// Resolves `foreign_key` and applies the valid-range check.
    pub fn associate(&mut self, foreign_key: &[u8]) -> Result<Association> {
        let pointer = match self.resolve(foreign_key)? {
            Some(p) => p,
            None => return Ok(Association::Unlinked),
        };

        match self.valid_max {
            Some(max) if pointer.get() > max => {
                self.stats.out_of_range += 1;
                if self.stats.out_of_range == 1 {
                    warn!(
                        key = %display_key(foreign_key),
                        %pointer,
                        max,
                        "foreign key resolved outside the target store"
                    );
                } else {
                    debug!(key = %display_key(foreign_key), %pointer, "out of range association");
                }
                Ok(Association::OutOfRange(pointer))
            }
            _ => Ok(Association::Linked(pointer)),
        }
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Forgets the cached key, forcing the next request to hit the index.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn get_mut(&mut self) -> &mut L {
        &mut self.lookup
    }

    /// Returns the underlying lookup.
    pub fn into_inner(self) -> L {
        self.lookup
    }
}
