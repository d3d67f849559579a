/// Nearest-issue lookup over the dataset.
///
/// The query is vectorized together with every stored description (TF-IDF over the combined
/// vocabulary) and compared by cosine similarity. The best description wins if it clears the
/// threshold; otherwise the caller gets `NotFound` and should consult the fallback.
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::AppError;
use crate::model::MatchResult;
use crate::tfidf::{self, TermCounts};

pub struct Matcher {
    dataset: Dataset,
    description_terms: Vec<TermCounts>,
    threshold: f32,
}

impl Matcher {
    /// Take ownership of the dataset. Fails with `EmptyDataset` when there is nothing to
    /// match against.
    pub fn new(dataset: Dataset, threshold: f32) -> Result<Self, AppError> {
        if dataset.is_empty() {
            return Err(AppError::EmptyDataset);
        }
        let description_terms = dataset
            .records()
            .iter()
            .map(|r| tfidf::term_counts(&r.description))
            .collect();
        Ok(Self {
            dataset,
            description_terms,
            threshold,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn find_match(&self, query: &str) -> Result<MatchResult, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::EmptyQuery);
        }
        let query_terms = tfidf::term_counts(query);
        let best = best_match(&query_terms, &self.description_terms);
        Ok(self.judge(best))
    }

    fn judge(&self, best: Option<(usize, f32)>) -> MatchResult {
        match best {
            Some((idx, score)) if score >= self.threshold => {
                let record = &self.dataset.records()[idx];
                debug!(
                    score,
                    threshold = self.threshold,
                    issue = %record.description,
                    "dataset match found"
                );
                MatchResult::Found {
                    solution: record.solution.clone(),
                    score,
                }
            }
            Some((_, score)) => {
                debug!(score, threshold = self.threshold, "best match below threshold");
                MatchResult::NotFound
            }
            None => MatchResult::NotFound,
        }
    }
}

/// Index and score of the most similar description. Ties keep the earliest index.
fn best_match(query: &TermCounts, descriptions: &[TermCounts]) -> Option<(usize, f32)> {
    let mut corpus: Vec<&TermCounts> = Vec::with_capacity(descriptions.len() + 1);
    corpus.push(query);
    corpus.extend(descriptions.iter());

    let vectors = tfidf::fit_transform(&corpus);
    let (query_vec, description_vecs) = vectors.split_first()?;

    let mut best: Option<(usize, f32)> = None;
    for (idx, vector) in description_vecs.iter().enumerate() {
        let score = tfidf::cosine(query_vec, vector) as f32;
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
    }
    best
}
