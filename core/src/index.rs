//! The index: document store, index writer, query engine and the
//! transaction controller tying them together.
//!
//! One logical operation (a single add or one batch) stages everything in
//! memory first, then commits in a single multi-tree sled transaction
//! spanning `docs`, `terms` and the postings, so no partial index state is
//! ever visible to readers that open after the commit.

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::keys::{self, DocId, PostingKey, Score};
use crate::terms::TermDictionary;
use crate::tokenizer;

const DOCS_TREE: &str = "docs";
const TERMS_TREE: &str = "terms";
const POSTINGS_TREE: &str = "index";

/// Stored excerpt length, in characters.
const EXCERPT_CHARS: usize = 64;

/// BM15 saturation constant: how quickly repeat occurrences stop paying.
const BM15_K1: f64 = 1.2;

/// Conventional result limit for single-word queries.
pub const DEFAULT_LIMIT: usize = 10;

/// A document to be indexed. The id is optional; without one the store
/// assigns the next auto-incrementing id.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub id: Option<DocId>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Document {
            text: text.into(),
            id: None,
        }
    }

    pub fn with_id(text: impl Into<String>, id: DocId) -> Self {
        Document {
            text: text.into(),
            id: Some(id),
        }
    }
}

/// One scored hit from a single-word query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub score: Score,
    pub doc_id: DocId,
}

/// Ranked result of a single-word query.
#[derive(Debug, Clone)]
pub struct SearchResults {
    /// Rarity weight of the term: ln(document count / document frequency).
    pub idf: f64,
    /// Number of documents containing the term.
    pub total: u64,
    /// Top hits, highest score first; ties order by descending doc id.
    pub documents: Vec<Hit>,
}

impl SearchResults {
    fn empty() -> Self {
        SearchResults {
            idf: 0.0,
            total: 0,
            documents: Vec::new(),
        }
    }
}

/// One staged document record, ready for the commit transaction.
struct DocRecord {
    doc_id: DocId,
    excerpt: String,
}

/// An open search index backed by three sled trees.
pub struct Index {
    db: sled::Db,
    docs: sled::Tree,
    postings: sled::Tree,
    dictionary: TermDictionary,
}

impl Index {
    /// Open or create an index at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_db(sled::open(path)?)
    }

    /// Open an index over an already configured database, e.g. a temporary
    /// one.
    pub fn with_db(db: sled::Db) -> Result<Self> {
        let docs = db.open_tree(DOCS_TREE)?;
        let terms = db.open_tree(TERMS_TREE)?;
        let postings = db.open_tree(POSTINGS_TREE)?;
        Ok(Index {
            db,
            docs,
            postings,
            dictionary: TermDictionary::new(terms),
        })
    }

    /// Force all committed writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> u64 {
        self.docs.len() as u64
    }

    /// Read a stored document excerpt.
    pub fn document(&self, doc_id: DocId) -> Result<Option<String>> {
        match self.docs.get(doc_id.to_be_bytes())? {
            Some(raw) => {
                let text = std::str::from_utf8(&raw)
                    .map_err(|_| Error::Corrupt(format!("excerpt of doc {doc_id} is not UTF-8")))?
                    .to_owned();
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    /// Index one document. Returns the number of unique terms it contained.
    pub fn add(&self, doc: &Document) -> Result<usize> {
        let counts = self.run_write(std::slice::from_ref(doc), false)?;
        Ok(counts[0])
    }

    /// Index a batch of documents atomically: either every document is
    /// indexed or none is. Repeated terms across the batch share one queued
    /// dictionary update. `prefill` warms the term cache first, trading one
    /// full scan of the dictionary for per-term store reads.
    pub fn batch_add(&self, docs: &[Document], prefill: bool) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        self.run_write(docs, prefill)?;
        Ok(())
    }

    /// Rank documents for a single-word query, highest score first. The
    /// word is analyzed exactly as at index time and must come out as one
    /// non-stopword term.
    pub fn search_single_word(&self, word: &str, limit: usize) -> Result<SearchResults> {
        let tokens = tokenizer::word_tokens(word);
        let term = match tokens.as_slice() {
            [] => {
                return Err(Error::Validation(
                    "query contains no searchable words".into(),
                ))
            }
            [token] => tokenizer::normalize(token).ok_or_else(|| {
                Error::Validation(format!("query word {token:?} is a stop word"))
            })?,
            _ => {
                return Err(Error::Validation(format!(
                    "expected a single word, found {} words",
                    tokens.len()
                )))
            }
        };

        let entry = match self.dictionary.lookup(&term)? {
            Some(entry) => entry,
            None => return Ok(SearchResults::empty()),
        };

        // High scores pack into high keys, so walking the term's range in
        // reverse yields best documents first and can stop at the limit.
        let (lower, upper) = keys::bounds(entry.id)?;
        let mut documents = Vec::new();
        for item in self
            .postings
            .range(lower.to_bytes()..=upper.to_bytes())
            .rev()
        {
            if documents.len() >= limit {
                break;
            }
            let (raw, _) = item?;
            let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
                Error::Corrupt(format!("posting key of {} bytes", raw.len()))
            })?;
            let (score, doc_id) = keys::decode(PostingKey::from_bytes(bytes));
            documents.push(Hit { score, doc_id });
        }

        // df is never 0 for an existing term; if storage ever decayed into
        // that state the infinite idf is propagated as-is.
        let idf = (self.document_count() as f64 / entry.count as f64).ln();
        Ok(SearchResults {
            idf,
            total: entry.count,
            documents,
        })
    }

    /// Run one write operation: open the dictionary transaction, stage and
    /// commit, abort on any failure.
    fn run_write(&self, docs: &[Document], prefill: bool) -> Result<Vec<usize>> {
        self.dictionary.begin()?;
        match self.stage_and_commit(docs, prefill) {
            Ok(counts) => {
                self.dictionary.commit();
                Ok(counts)
            }
            Err(err) => {
                self.dictionary.abort();
                Err(err)
            }
        }
    }

    fn stage_and_commit(&self, docs: &[Document], prefill: bool) -> Result<Vec<usize>> {
        if prefill {
            self.dictionary.prefetch()?;
        }

        let mut next_id = self.next_doc_id()?;
        let mut records = Vec::with_capacity(docs.len());
        let mut posting_keys: Vec<PostingKey> = Vec::new();
        let mut counts = Vec::with_capacity(docs.len());

        for doc in docs {
            if doc.text.is_empty() {
                return Err(Error::Validation(
                    "document text must be a non-empty string".into(),
                ));
            }
            let doc_id = match doc.id {
                Some(id) => id,
                None => {
                    if next_id > u64::from(DocId::MAX) {
                        return Err(Error::Range("document id space exhausted".into()));
                    }
                    next_id as DocId
                }
            };
            // Auto ids stay ahead of every id seen so far, caller-supplied
            // ones included.
            next_id = next_id.max(u64::from(doc_id) + 1);

            let terms = tokenizer::analyze(&doc.text);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for term in terms {
                *tf.entry(term).or_insert(0) += 1;
            }
            counts.push(tf.len());

            for (term, raw_count) in &tf {
                let term_id = self.dictionary.resolve_and_bump(term)?;
                let score = quantize_tf(*raw_count);
                posting_keys.push(keys::encode(term_id, score, doc_id)?);
            }
            records.push(DocRecord {
                doc_id,
                excerpt: doc.text.chars().take(EXCERPT_CHARS).collect(),
            });
        }

        self.commit_staged(&records, &posting_keys)?;
        tracing::debug!(
            documents = records.len(),
            postings = posting_keys.len(),
            "committed batch"
        );
        Ok(counts)
    }

    /// One multi-tree transaction over docs, terms and postings. Document
    /// records use add-if-absent so re-adding an existing id rejects the
    /// whole operation.
    fn commit_staged(&self, records: &[DocRecord], posting_keys: &[PostingKey]) -> Result<()> {
        let outcome = (&self.docs, self.dictionary.tree(), &self.postings).transaction(
            |(docs_t, terms_t, postings_t)| {
                for record in records {
                    let prior =
                        docs_t.insert(&record.doc_id.to_be_bytes()[..], record.excerpt.as_bytes())?;
                    if prior.is_some() {
                        return Err(ConflictableTransactionError::Abort(Error::Validation(
                            format!("document id {} already exists", record.doc_id),
                        )));
                    }
                }
                self.dictionary.flush(terms_t)?;
                for key in posting_keys {
                    postings_t.insert(&key.to_bytes()[..], &[][..])?;
                }
                Ok(())
            },
        );
        match outcome {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(Error::Storage(err)),
        }
    }

    /// Next auto-assigned document id; the store's ids start at 1.
    fn next_doc_id(&self) -> Result<u64> {
        match self.docs.last()? {
            Some((key, _)) => {
                let bytes: [u8; 4] = key.as_ref().try_into().map_err(|_| {
                    Error::Corrupt(format!("document key of {} bytes", key.len()))
                })?;
                Ok(u64::from(DocId::from_be_bytes(bytes)) + 1)
            }
            None => Ok(1),
        }
    }
}

/// Quantize a raw term count into the 8-bit score band with a saturating
/// BM15 transform: each extra occurrence pays less, bounded by 255.
fn quantize_tf(raw_count: u32) -> Score {
    let tc = f64::from(raw_count);
    (255.0 * tc / (tc + BM15_K1)).floor() as Score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantized_scores_grow_with_diminishing_returns() {
        let s1 = quantize_tf(1);
        let s2 = quantize_tf(2);
        let s3 = quantize_tf(3);
        assert_eq!(s1, 115);
        assert!(s2 > s1);
        assert!(s3 > s2);
        assert!(s2 - s1 > s3 - s2);
        // Large counts crowd the top of the band without overflowing it.
        assert_eq!(quantize_tf(100_000), 254);
    }
}
