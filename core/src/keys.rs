//! Posting key codec.
//!
//! A posting is stored as a single 8-byte key with no value. The key packs
//! the term id, the quantized score and the document id so that, for a fixed
//! term, the store's own key order ranks documents by score:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-----------------------------------------------+---------------+
//! |                  Term ID (24)                 |   Score (8)   |
//! +-----------------------------------------------+---------------+
//! |                        Document ID (32)                       |
//! +---------------------------------------------------------------+
//! ```
//!
//! Keys are written as the big-endian bytes of the packed u64, so sled's
//! lexicographic ordering equals the numeric ordering of the packed value
//! for every term id the dictionary can allocate. A bounded reverse scan
//! over one term's range therefore yields documents in descending score
//! order directly, with no sort step and no value payload.

use crate::error::{Error, Result};

/// Dense identifier assigned to a term by the dictionary.
pub type TermId = u32;

/// Identifier of a stored document.
pub type DocId = u32;

/// Quantized per-document term weight, embedded in the posting key.
pub type Score = u8;

/// Exclusive upper bound of the term id space (24-bit key field, capped to
/// 2^23 allocatable ids).
pub const MAX_TERM_ID: TermId = 1 << 23;

/// A packed (term, score, document) posting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostingKey(u64);

impl PostingKey {
    /// The key as stored: big-endian bytes, ordered like the packed value.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        PostingKey(u64::from_be_bytes(bytes))
    }
}

/// Pack a (term, score, document) triple into a posting key.
///
/// Score and document id are range-checked by their types; the term id must
/// stay below [`MAX_TERM_ID`].
pub fn encode(term_id: TermId, score: Score, doc_id: DocId) -> Result<PostingKey> {
    if term_id >= MAX_TERM_ID {
        return Err(Error::Range(format!(
            "term id {term_id} does not fit the key's term field (max {})",
            MAX_TERM_ID - 1
        )));
    }
    let high = (u64::from(term_id) << 8) | u64::from(score);
    Ok(PostingKey(high << 32 | u64::from(doc_id)))
}

/// Unpack the score and document id from a posting key.
///
/// The term id is not recovered; callers scanning a term's range already
/// know it.
pub fn decode(key: PostingKey) -> (Score, DocId) {
    let score = ((key.0 >> 32) & 0xFF) as Score;
    let doc_id = key.0 as DocId;
    (score, doc_id)
}

/// The inclusive key range covering every possible (score, document id)
/// pair for one term.
pub fn bounds(term_id: TermId) -> Result<(PostingKey, PostingKey)> {
    let lower = encode(term_id, 0, 0)?;
    let upper = encode(term_id, Score::MAX, DocId::MAX)?;
    Ok((lower, upper))
}
