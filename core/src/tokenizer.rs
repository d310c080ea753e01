//! Text analysis: word extraction, normalization, stopword removal and
//! Porter-style stemming.
//!
//! The query engine needs to tell "no words" from "too many words" from
//! "only a stopword", so the pipeline is exposed in two layers:
//! [`word_tokens`] extracts normalized words, [`normalize`] applies the
//! stopword test and the stemmer to one word, and [`analyze`] chains both.

use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Extract lowercased, NFKC-normalized word tokens. Stopwords are kept.
pub fn word_tokens(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    WORD.find_iter(&normalized)
        .map(|m| m.as_str().to_owned())
        .collect()
}

/// Stem one word token, or `None` when it is a stopword.
pub fn normalize(token: &str) -> Option<String> {
    if is_stopword(token) {
        return None;
    }
    Some(STEMMER.stem(token).to_string())
}

/// Full pipeline: tokenize, drop stopwords, stem. Occurrences are kept, so
/// the result's length is the document length the scorer counts against.
pub fn analyze(text: &str) -> Vec<String> {
    word_tokens(text)
        .iter()
        .filter_map(|token| normalize(token))
        .collect()
}
