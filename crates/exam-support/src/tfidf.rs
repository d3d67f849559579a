/// TF-IDF vectorization and cosine similarity over a small in-memory corpus.
///
/// Weighting: raw term counts scaled by a smoothed idf, `ln((1 + n) / (1 + df)) + 1`, then
/// L2-normalized. Tokens are lowercased runs of two or more word characters.
///
/// Vectors are `BTreeMap`s so dot products always sum in the same order and scores are
/// bit-for-bit reproducible.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

pub type TermCounts = BTreeMap<String, u32>;
pub type SparseVector = BTreeMap<String, f64>;

fn token_re() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("valid regex"))
}

pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_re()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn term_counts(text: &str) -> TermCounts {
    let mut counts = TermCounts::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

/// Fit idf weights over `documents` and return one normalized vector per document, in order.
pub fn fit_transform(documents: &[&TermCounts]) -> Vec<SparseVector> {
    let idf = inverse_document_frequency(documents);
    documents
        .iter()
        .map(|counts| {
            let mut vector: SparseVector = counts
                .iter()
                .map(|(term, &tf)| (term.clone(), tf as f64 * idf[term]))
                .collect();
            normalize(&mut vector);
            vector
        })
        .collect()
}

fn inverse_document_frequency(documents: &[&TermCounts]) -> BTreeMap<String, f64> {
    let n = documents.len() as f64;
    let mut df: BTreeMap<&str, u32> = BTreeMap::new();
    for counts in documents {
        let unique: BTreeSet<&str> = counts.keys().map(String::as_str).collect();
        for term in unique {
            *df.entry(term).or_insert(0) += 1;
        }
    }
    df.into_iter()
        .map(|(term, df)| {
            let idf = ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0;
            (term.to_string(), idf)
        })
        .collect()
}

fn normalize(vector: &mut SparseVector) {
    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in vector.values_mut() {
            *w /= norm;
        }
    }
}

/// Cosine similarity of two L2-normalized vectors. Empty vectors score 0.
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_single_chars_and_lowercases() {
        assert_eq!(
            tokenize("My Screen is FROZEN, a b c!"),
            vec!["my", "screen", "is", "frozen"]
        );
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("a ? !").is_empty());
    }

    #[test]
    fn tokenize_keeps_unicode_words() {
        assert_eq!(tokenize("Écran gelé"), vec!["écran", "gelé"]);
    }

    #[test]
    fn term_counts_accumulate() {
        let counts = term_counts("exam exam timer");
        assert_eq!(counts.get("exam"), Some(&2));
        assert_eq!(counts.get("timer"), Some(&1));
    }

    #[test]
    fn smoothed_idf_weights() {
        let query = term_counts("my screen is frozen");
        let first = term_counts("screen froze");
        let second = term_counts("excel not working");
        let vectors = fit_transform(&[&query, &first, &second]);

        let sim = cosine(&vectors[0], &vectors[1]);
        assert!((sim - 0.243_374_462).abs() < 1e-6, "got {sim}");
        assert_eq!(cosine(&vectors[0], &vectors[2]), 0.0);
    }

    #[test]
    fn identical_documents_score_one() {
        let a = term_counts("exam page will not load");
        let b = term_counts("exam page will not load");
        let vectors = fit_transform(&[&a, &b]);
        assert!((cosine(&vectors[0], &vectors[1]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_vector_scores_zero() {
        let empty = term_counts("?");
        let doc = term_counts("browser crashed");
        let vectors = fit_transform(&[&empty, &doc]);
        assert!(vectors[0].is_empty());
        assert_eq!(cosine(&vectors[0], &vectors[1]), 0.0);
    }

    #[test]
    fn vectors_are_unit_length() {
        let a = term_counts("wifi dropped wifi reconnect");
        let b = term_counts("wifi slow");
        for vector in fit_transform(&[&a, &b]) {
            let norm: f64 = vector.values().map(|w| w * w).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }
}
