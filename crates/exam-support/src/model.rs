/// One known issue and its stored solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    pub description: String,
    pub solution: String,
}

impl IssueRecord {
    pub fn new(description: impl Into<String>, solution: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            solution: solution.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Found { solution: String, score: f32 },
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolutionSource {
    Dataset { score: f32 },
    Fallback,
}

/// The answer to a single submission, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub text: String,
    pub source: ResolutionSource,
}
