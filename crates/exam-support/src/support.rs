use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use support_common::error::CommonError;

use crate::error::AppError;
use crate::fallback::Responder;
use crate::matcher::Matcher;
use crate::model::{MatchResult, Resolution, ResolutionSource};

/// Resolves one submission: dataset lookup first, language-model fallback second.
pub struct SupportService {
    matcher: Matcher,
    responder: Arc<dyn Responder>,
    fallback_deadline: Duration,
}

impl SupportService {
    pub fn new(matcher: Matcher, responder: Arc<dyn Responder>, fallback_deadline: Duration) -> Self {
        Self {
            matcher,
            responder,
            fallback_deadline,
        }
    }

    pub async fn resolve(&self, query: &str) -> Result<Resolution, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::EmptyQuery);
        }

        if let MatchResult::Found { solution, score } = self.matcher.find_match(query)? {
            info!(score, "answered from dataset");
            return Ok(Resolution {
                text: solution,
                source: ResolutionSource::Dataset { score },
            });
        }

        info!("no confident dataset match, consulting fallback");
        let text = match tokio::time::timeout(self.fallback_deadline, self.responder.respond(query))
            .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, "fallback failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    deadline_ms = self.fallback_deadline.as_millis(),
                    "fallback exceeded deadline"
                );
                return Err(CommonError::Timeout(self.fallback_deadline).into());
            }
        };

        Ok(Resolution {
            text,
            source: ResolutionSource::Fallback,
        })
    }
}
