/// MCP server exposing the support bot as a single `find_solution` tool.
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::model::{Resolution, ResolutionSource};
use crate::support::SupportService;

#[derive(Clone)]
pub struct ExamSupportServer {
    service: Arc<SupportService>,
    // Submissions are handled one at a time, start to finish.
    gate: Arc<Mutex<()>>,
    tool_router: ToolRouter<ExamSupportServer>,
}

impl ExamSupportServer {
    pub fn new(service: Arc<SupportService>) -> Self {
        Self {
            service,
            gate: Arc::new(Mutex::new(())),
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FindSolutionParams {
    /// Free-text description of the technical issue.
    issue: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
enum SolutionSource {
    Dataset,
    Fallback,
}

#[derive(Debug, Serialize, JsonSchema)]
struct FindSolutionResponse {
    solution: String,
    source: SolutionSource,
    /// Similarity of the matched known issue; absent for fallback answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
}

impl From<Resolution> for FindSolutionResponse {
    fn from(resolution: Resolution) -> Self {
        let (source, score) = match resolution.source {
            ResolutionSource::Dataset { score } => (SolutionSource::Dataset, Some(score)),
            ResolutionSource::Fallback => (SolutionSource::Fallback, None),
        };
        Self {
            solution: resolution.text,
            source,
            score,
        }
    }
}

#[tool_router]
impl ExamSupportServer {
    #[tool(description = "Find a solution for a technical issue hit during an online exam. Looks up the closest known issue and returns its stored solution, or asks the support assistant when no known issue matches well.")]
    async fn find_solution(
        &self,
        Parameters(params): Parameters<FindSolutionParams>,
    ) -> Result<Json<FindSolutionResponse>, String> {
        let _turn = self.gate.lock().await;
        let resolution = self.service.resolve(&params.issue).await.map_err(|e| match e {
            AppError::EmptyQuery => "Please describe the issue before submitting!".to_string(),
            e if e.is_service_failure() => {
                tracing::error!(error = %e, "find_solution failed");
                format!("support assistant unavailable, try again later: {e}")
            }
            e => format!("find_solution failed: {e}"),
        })?;
        Ok(Json(resolution.into()))
    }
}

#[tool_handler]
impl ServerHandler for ExamSupportServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "exam-support".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Exemplify Exam Support Bot. Call find_solution with a description of the \
issue the student is facing; the response says whether the answer came from the known-issue \
dataset or from the support assistant."
                    .to_string(),
            ),
        }
    }
}
