use std::path::PathBuf;
use std::time::Duration;

use support_common::openai::OpenAiClientConfig;

use crate::error::AppError;

pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.2;
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an AI assistant that helps students resolve issues during online exams.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Interactive prompt on stdin/stdout.
    Terminal,
    /// MCP server exposing a single `find_solution` tool.
    Mcp,
}

/// Settings for the language-model fallback, passed into the responder at construction.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Overall bound on one fallback step, retries included.
    pub deadline: Duration,
}

/// Application configuration loaded explicitly from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub dataset_path: PathBuf,
    pub match_threshold: f32,
    pub mode: Mode,
    /// In MCP mode, serve on this TCP address instead of stdio.
    pub mcp_tcp_listen_addr: Option<String>,
    pub fallback: FallbackConfig,
    pub openai: OpenAiClientConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `SUPPORT_DATASET_PATH` (default: "data/issues.csv")
    /// - `SUPPORT_MATCH_THRESHOLD` (default: 0.2, must be within [0, 1])
    /// - `SUPPORT_BOT_MODE`: "terminal" (default) or "mcp"
    /// - `SUPPORT_FALLBACK_DEADLINE_SECS` (default: 25)
    /// - `MCP_TCP_LISTEN_ADDR` (MCP mode only; default: serve on stdio)
    /// - `OPENAI_MODEL`, `FALLBACK_MAX_TOKENS`, `FALLBACK_TEMPERATURE`, `FALLBACK_SYSTEM_PROMPT`
    /// - `OPENAI_*` client settings, see [`OpenAiClientConfig::from_vars`]
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let dataset_path = var("SUPPORT_DATASET_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/issues.csv"));

        let match_threshold = match var("SUPPORT_MATCH_THRESHOLD") {
            Some(raw) => {
                let value = raw.trim().parse::<f32>().map_err(|_| {
                    AppError::Config(format!("SUPPORT_MATCH_THRESHOLD is not a number: {raw}"))
                })?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(AppError::Config(format!(
                        "SUPPORT_MATCH_THRESHOLD must be within [0, 1], got {value}"
                    )));
                }
                value
            }
            None => DEFAULT_MATCH_THRESHOLD,
        };

        let mode = match var("SUPPORT_BOT_MODE").as_deref().map(str::trim) {
            None | Some("") | Some("terminal") => Mode::Terminal,
            Some("mcp") => Mode::Mcp,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "SUPPORT_BOT_MODE must be 'terminal' or 'mcp', got '{other}'"
                )))
            }
        };

        let mcp_tcp_listen_addr = var("MCP_TCP_LISTEN_ADDR")
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty());

        let deadline = match var("SUPPORT_FALLBACK_DEADLINE_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "SUPPORT_FALLBACK_DEADLINE_SECS must be a positive integer, got {raw}"
                    ))
                })?,
            None => Duration::from_secs(25),
        };

        let fallback = FallbackConfig {
            model: var("OPENAI_MODEL")
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "gpt-4".to_string()),
            system_prompt: var("FALLBACK_SYSTEM_PROMPT")
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: var("FALLBACK_MAX_TOKENS")
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(150),
            temperature: var("FALLBACK_TEMPERATURE")
                .and_then(|s| s.parse::<f32>().ok())
                .unwrap_or(0.7),
            deadline,
        };

        Ok(Self {
            dataset_path,
            match_threshold,
            mode,
            mcp_tcp_listen_addr,
            fallback,
            openai: OpenAiClientConfig::from_vars(&var),
        })
    }
}
