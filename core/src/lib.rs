//! Embedded single-term full-text search over a sled key-value store.
//!
//! Documents are tokenized, stemmed and stopword-filtered, then recorded in
//! an inverted index whose postings are bare sort keys: each key packs
//! (term id, quantized score, doc id) so that ranked top-K retrieval is one
//! bounded reverse range scan, with no value payload and no sort step.
//!
//! ```no_run
//! use keyrank_core::{Document, Index, DEFAULT_LIMIT};
//!
//! let index = Index::open("/tmp/my-index")?;
//! index.add(&Document::new("the quick brown fox"))?;
//! let results = index.search_single_word("fox", DEFAULT_LIMIT)?;
//! assert_eq!(results.total, 1);
//! # Ok::<(), keyrank_core::Error>(())
//! ```

pub mod error;
pub mod index;
pub mod keys;
pub mod terms;
pub mod tokenizer;

pub use error::{Error, Result};
pub use index::{Document, Hit, Index, SearchResults, DEFAULT_LIMIT};
pub use keys::{DocId, PostingKey, Score, TermId};
pub use terms::TermEntry;
