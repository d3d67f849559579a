mod config;
mod dataset;
mod error;
mod fallback;
mod matcher;
mod model;
mod server;
mod support;
mod terminal;
mod tfidf;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use support_common::openai::OpenAiClient;

use config::{Config, Mode};
use dataset::Dataset;
use fallback::OpenAiResponder;
use matcher::Matcher;
use server::ExamSupportServer;
use support::SupportService;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // stdout carries the dialogue or the MCP JSON-RPC stream; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting exam-support bot");

    let config = Config::from_env()?;
    info!(
        dataset = %config.dataset_path.display(),
        threshold = config.match_threshold,
        mode = ?config.mode,
        mcp_tcp = ?config.mcp_tcp_listen_addr,
        base_url = %config.openai.base_url,
        model = %config.fallback.model,
        api_key = config.openai.api_key.is_some(),
        timeout_ms = config.openai.default_timeout.as_millis(),
        max_retries = config.openai.max_retries,
        "configuration loaded"
    );

    let dataset = Dataset::load(&config.dataset_path)?;
    let matcher = Matcher::new(dataset, config.match_threshold)?;
    info!(
        records = matcher.dataset().len(),
        threshold = matcher.threshold(),
        "matcher ready"
    );

    let client = OpenAiClient::new(config.openai.clone())?;
    let responder = Arc::new(OpenAiResponder::new(client, config.fallback.clone()));
    let service = Arc::new(SupportService::new(
        matcher,
        responder,
        config.fallback.deadline,
    ));

    match config.mode {
        Mode::Terminal => {
            let input = BufReader::new(tokio::io::stdin());
            terminal::run(&service, input, tokio::io::stdout()).await?;
            info!("session ended");
        }
        Mode::Mcp => {
            serve_mcp(
                ExamSupportServer::new(service),
                config.mcp_tcp_listen_addr.as_deref(),
            )
            .await?
        }
    }
    Ok(())
}

async fn serve_mcp(server: ExamSupportServer, tcp_addr: Option<&str>) -> anyhow::Result<()> {
    if let Some(addr) = tcp_addr {
        let listener = TcpListener::bind(addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
        Ok(())
    }
}
