/// Interactive terminal front end: one prompt, one "find solution" action per line.
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::error;

use crate::error::AppError;
use crate::model::Resolution;
use crate::support::SupportService;

const BANNER: &str = "\
Exemplify Exam Support Bot
Facing technical issues during exams? Describe your problem below, and we'll provide you with real-time assistance!

How it works:
  1. Describe your issue: enter the issue you're facing during the exam.
  2. Get an instant solution: we match your issue with our database or consult the assistant if needed.
  3. Professional help: we provide tailored solutions to help you complete your exam smoothly.
";

const PROMPT: &str = "Describe the issue you're facing during the exam:";
const EMPTY_INPUT: &str = "Please describe the issue before submitting!";
const TRY_AGAIN: &str =
    "The support assistant is unavailable right now. Please try again later.";

/// Serve submissions from `input` until EOF, writing the dialogue to `output`.
pub async fn run<R, W>(service: &SupportService, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(BANNER.as_bytes()).await?;
    let mut lines = input.lines();

    loop {
        output.write_all(format!("\n{PROMPT}\n> ").as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let reply = render(service.resolve(&line).await);
        output.write_all(reply.as_bytes()).await?;
    }

    output.write_all(b"\n").await?;
    output.flush().await
}

fn render(result: Result<Resolution, AppError>) -> String {
    match result {
        Ok(resolution) => format!(
            "Here's a solution for you:\nSolution: {}\n",
            resolution.text
        ),
        Err(AppError::EmptyQuery) => format!("{EMPTY_INPUT}\n"),
        Err(e) if e.is_service_failure() => {
            error!(error = %e, "request failed");
            format!("{TRY_AGAIN}\n")
        }
        Err(e) => {
            error!(error = %e, "request failed");
            format!("Something went wrong: {e}\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::support::tests::{service_with, FakeResponder};

    async fn session(service: &SupportService, input: &str) -> String {
        let mut output: Vec<u8> = Vec::new();
        run(service, input.as_bytes(), &mut output)
            .await
            .expect("in-memory io does not fail");
        String::from_utf8(output).expect("utf-8 output")
    }

    #[tokio::test]
    async fn answers_each_line_until_eof() {
        let service = service_with(FakeResponder::replying("Ask your proctor"), Duration::from_secs(1));
        let transcript = session(
            &service,
            "my screen is frozen\npurple elephant migration patterns\n",
        )
        .await;

        assert!(transcript.starts_with("Exemplify Exam Support Bot"));
        assert!(transcript.contains("Solution: restart browser"));
        assert!(transcript.contains("Solution: Ask your proctor (purple elephant migration patterns)"));
        assert_eq!(transcript.matches(PROMPT).count(), 3);
    }

    #[tokio::test]
    async fn blank_line_asks_for_a_description() {
        let service = service_with(FakeResponder::replying("unused"), Duration::from_secs(1));
        let transcript = session(&service, "   \n").await;
        assert!(transcript.contains(EMPTY_INPUT));
        assert!(!transcript.contains("Solution:"));
    }

    #[tokio::test]
    async fn fallback_outage_keeps_the_session_alive() {
        let service = service_with(FakeResponder::hanging(), Duration::from_millis(50));
        let transcript = session(
            &service,
            "purple elephant migration patterns\nexcel not working\n",
        )
        .await;

        assert!(transcript.contains(TRY_AGAIN));
        assert!(transcript.contains("Solution: reopen file"));
    }
}
