//! Term dictionary: term string → dense id + document frequency.
//!
//! Entries live in the `terms` tree as bincode records, fronted by a shared
//! in-memory read cache. Writes go through a single transaction-scoped
//! queue so a batch touching the same term many times persists one record,
//! and so nothing reaches the store until the surrounding store transaction
//! commits.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::keys::{TermId, MAX_TERM_ID};

/// Persisted dictionary record for one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    pub id: TermId,
    /// Number of distinct documents containing the term.
    pub count: u64,
}

/// Cache fill state. `Warm` means every persisted entry is cached, so a
/// cache miss is an authoritative absence and the store is not consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheState {
    Cold,
    Partial,
    Warm,
}

struct TermCache {
    entries: HashMap<String, TermEntry>,
    state: CacheState,
}

/// Pending updates of the active write transaction.
struct WriteQueue {
    /// New-or-updated entries keyed by term.
    queue: HashMap<String, TermEntry>,
    /// Terms first seen in this transaction; persisted with add-if-absent.
    inserts: HashSet<String>,
    /// Persisted entry count at `begin`, the base for id allocation.
    persisted: u64,
}

pub struct TermDictionary {
    tree: sled::Tree,
    cache: RwLock<TermCache>,
    txn: Mutex<Option<WriteQueue>>,
}

impl TermDictionary {
    pub(crate) fn new(tree: sled::Tree) -> Self {
        TermDictionary {
            tree,
            cache: RwLock::new(TermCache {
                entries: HashMap::new(),
                state: CacheState::Cold,
            }),
            txn: Mutex::new(None),
        }
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.tree
    }

    /// Open the single allowed write transaction.
    pub(crate) fn begin(&self) -> Result<()> {
        let mut txn = self.txn.lock();
        if txn.is_some() {
            return Err(Error::State(
                "a dictionary write transaction is already open".into(),
            ));
        }
        let persisted = {
            let cache = self.cache.read();
            if cache.state == CacheState::Warm {
                cache.entries.len() as u64
            } else {
                self.tree.len() as u64
            }
        };
        *txn = Some(WriteQueue {
            queue: HashMap::new(),
            inserts: HashSet::new(),
            persisted,
        });
        Ok(())
    }

    /// Look up a term, cache first. Misses against a non-warm cache fall
    /// back to the store and populate the cache.
    pub fn lookup(&self, term: &str) -> Result<Option<TermEntry>> {
        {
            let cache = self.cache.read();
            if let Some(entry) = cache.entries.get(term) {
                return Ok(Some(entry.clone()));
            }
            if cache.state == CacheState::Warm {
                return Ok(None);
            }
        }
        match self.tree.get(term.as_bytes())? {
            Some(raw) => {
                let entry: TermEntry = bincode::deserialize(&raw)?;
                let mut cache = self.cache.write();
                cache.entries.insert(term.to_owned(), entry.clone());
                if cache.state == CacheState::Cold {
                    cache.state = CacheState::Partial;
                }
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Load every persisted entry into the cache and mark it warm, so bulk
    /// loads stop paying a store read per term. Idempotent.
    pub fn prefetch(&self) -> Result<()> {
        if self.cache.read().state == CacheState::Warm {
            return Ok(());
        }
        let mut entries = HashMap::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            let term = std::str::from_utf8(&key)
                .map_err(|_| Error::Corrupt("term key is not valid UTF-8".into()))?
                .to_owned();
            entries.insert(term, bincode::deserialize(&value)?);
        }
        tracing::debug!(terms = entries.len(), "warmed term cache");
        let mut cache = self.cache.write();
        cache.entries.extend(entries);
        cache.state = CacheState::Warm;
        Ok(())
    }

    /// Resolve a term to its id and bump its document frequency by one.
    /// Unseen terms are allocated the next dense id, with frequency 1.
    pub fn resolve_and_bump(&self, term: &str) -> Result<TermId> {
        let mut guard = self.txn.lock();
        let txn = guard.as_mut().ok_or_else(|| {
            Error::State("no open dictionary write transaction".into())
        })?;

        if let Some(entry) = txn.queue.get_mut(term) {
            entry.count += 1;
            return Ok(entry.id);
        }

        match self.lookup(term)? {
            Some(existing) => {
                txn.queue.insert(
                    term.to_owned(),
                    TermEntry {
                        id: existing.id,
                        count: existing.count + 1,
                    },
                );
                Ok(existing.id)
            }
            None => {
                let next = txn.persisted + txn.inserts.len() as u64;
                if next >= u64::from(MAX_TERM_ID) {
                    return Err(Error::Range(format!(
                        "term dictionary full: {next} ids allocated"
                    )));
                }
                let id = next as TermId;
                txn.inserts.insert(term.to_owned());
                txn.queue.insert(term.to_owned(), TermEntry { id, count: 1 });
                Ok(id)
            }
        }
    }

    /// Write the queued entries into the transactional `terms` tree. New
    /// terms are add-if-absent: a record already present under a queued
    /// insert means another writer slipped past the transaction guard, and
    /// the transaction aborts rather than clobber an id. Safe to run again
    /// if sled retries the surrounding transaction.
    pub(crate) fn flush(
        &self,
        tree: &TransactionalTree,
    ) -> ConflictableTransactionResult<(), Error> {
        let guard = self.txn.lock();
        let txn = guard.as_ref().ok_or_else(|| {
            ConflictableTransactionError::Abort(Error::State(
                "no open dictionary write transaction".into(),
            ))
        })?;
        for (term, entry) in &txn.queue {
            let value = bincode::serialize(entry)
                .map_err(|e| ConflictableTransactionError::Abort(Error::from(e)))?;
            let prior = tree.insert(term.as_bytes(), value)?;
            if prior.is_some() && txn.inserts.contains(term) {
                return Err(ConflictableTransactionError::Abort(Error::State(format!(
                    "term {term:?} was persisted outside the open transaction"
                ))));
            }
        }
        Ok(())
    }

    /// Merge the flushed queue into the shared cache and close the
    /// transaction. Call only after the store transaction committed.
    pub(crate) fn commit(&self) {
        let mut guard = self.txn.lock();
        if let Some(txn) = guard.take() {
            let mut cache = self.cache.write();
            if cache.state == CacheState::Cold && !txn.queue.is_empty() {
                cache.state = CacheState::Partial;
            }
            cache.entries.extend(txn.queue);
        }
    }

    /// Discard the queued updates without touching store or cache.
    pub(crate) fn abort(&self) {
        *self.txn.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dict() -> (sled::Db, TermDictionary) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tree = db.open_tree("terms").unwrap();
        (db, TermDictionary::new(tree))
    }

    fn commit_through_store(dict: &TermDictionary) {
        dict.tree()
            .transaction(|tree| dict.flush(tree))
            .expect("terms transaction");
        dict.commit();
    }

    #[test]
    fn allocates_dense_ids_and_counts_documents() {
        let (_db, dict) = temp_dict();
        dict.begin().unwrap();
        assert_eq!(dict.resolve_and_bump("fox").unwrap(), 0);
        assert_eq!(dict.resolve_and_bump("dog").unwrap(), 1);
        // Same term again, as if from a second document in the batch.
        assert_eq!(dict.resolve_and_bump("fox").unwrap(), 0);
        commit_through_store(&dict);

        let fox = dict.lookup("fox").unwrap().unwrap();
        assert_eq!(fox, TermEntry { id: 0, count: 2 });
        let dog = dict.lookup("dog").unwrap().unwrap();
        assert_eq!(dog, TermEntry { id: 1, count: 1 });
    }

    #[test]
    fn id_allocation_continues_across_transactions() {
        let (_db, dict) = temp_dict();
        dict.begin().unwrap();
        dict.resolve_and_bump("fox").unwrap();
        dict.resolve_and_bump("dog").unwrap();
        commit_through_store(&dict);

        dict.begin().unwrap();
        assert_eq!(dict.resolve_and_bump("wolf").unwrap(), 2);
        assert_eq!(dict.resolve_and_bump("fox").unwrap(), 0);
        commit_through_store(&dict);
        assert_eq!(dict.lookup("fox").unwrap().unwrap().count, 2);
    }

    #[test]
    fn second_begin_fails_while_open() {
        let (_db, dict) = temp_dict();
        dict.begin().unwrap();
        assert!(matches!(dict.begin(), Err(Error::State(_))));
        dict.abort();
        dict.begin().unwrap();
    }

    #[test]
    fn resolve_requires_an_open_transaction() {
        let (_db, dict) = temp_dict();
        assert!(matches!(dict.resolve_and_bump("fox"), Err(Error::State(_))));
    }

    #[test]
    fn abort_discards_queued_updates() {
        let (_db, dict) = temp_dict();
        dict.begin().unwrap();
        dict.resolve_and_bump("fox").unwrap();
        dict.abort();
        assert_eq!(dict.lookup("fox").unwrap(), None);
        assert_eq!(dict.tree().len(), 0);
    }

    #[test]
    fn warm_cache_misses_are_authoritative() {
        let (_db, dict) = temp_dict();
        dict.begin().unwrap();
        dict.resolve_and_bump("fox").unwrap();
        commit_through_store(&dict);

        dict.prefetch().unwrap();
        // Sneak a record into the tree behind the dictionary's back; a warm
        // cache must not read it.
        let rogue = bincode::serialize(&TermEntry { id: 99, count: 1 }).unwrap();
        dict.tree().insert("wolf".as_bytes(), rogue).unwrap();
        assert_eq!(dict.lookup("wolf").unwrap(), None);
        assert!(dict.lookup("fox").unwrap().is_some());
    }

    #[test]
    fn prefetch_is_idempotent() {
        let (_db, dict) = temp_dict();
        dict.begin().unwrap();
        dict.resolve_and_bump("fox").unwrap();
        commit_through_store(&dict);
        dict.prefetch().unwrap();
        dict.prefetch().unwrap();
        assert_eq!(dict.lookup("fox").unwrap().unwrap().id, 0);
    }

    #[test]
    fn cold_lookup_falls_back_to_the_store() {
        let (_db, dict) = temp_dict();
        let entry = TermEntry { id: 0, count: 3 };
        dict.tree()
            .insert("fox".as_bytes(), bincode::serialize(&entry).unwrap())
            .unwrap();
        assert_eq!(dict.lookup("fox").unwrap(), Some(entry));
    }
}
