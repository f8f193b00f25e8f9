//! One-shot and interactive question answering from the command line.

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use context_faq_core::clock::{Clock, SystemClock};
use context_faq_core::{FaqMatcher, MatchResult, Partition, SessionState};

use crate::config::Config;
use crate::ingest::build_matcher;

/// Answer a single question, printing the result to stdout.
///
/// `context` starts the session in that context instead of the default;
/// a trigger phrase in `text` still takes precedence.
pub async fn run_ask(config: &Config, text: &str, context: Option<&str>, json: bool) -> Result<()> {
    if text.trim().is_empty() {
        bail!("question must not be empty");
    }
    let start = match context {
        Some(name) => {
            let partition = Partition::new(name);
            if !config.partitions().contains(&partition) {
                bail!("Unknown context: '{}'", name);
            }
            partition
        }
        None => config.default_partition(),
    };

    let matcher = build_matcher(config).await?;
    let mut session = SessionState::new(start);
    let result = matcher.answer(&mut session, text, SystemClock.now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

/// Hold one conversation over stdin/stdout until EOF or `/quit`.
pub async fn run_chat(config: &Config) -> Result<()> {
    let matcher = build_matcher(config).await?;
    let mut session = SessionState::new(config.default_partition());
    chat_loop(
        &matcher,
        &mut session,
        &SystemClock,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Read questions line by line from `input` and write answers to `output`.
///
/// Embedding failures are reported inline and the conversation continues.
pub async fn chat_loop<R, W>(
    matcher: &FaqMatcher,
    session: &mut SessionState,
    clock: &dyn Clock,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output.write_all(b"> ").await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text == "/quit" {
            break;
        }
        if !text.is_empty() {
            let reply = match matcher.answer(session, text, clock.now()).await {
                Ok(result) => format!("[{}] {}\n", result.context, result.answer),
                Err(e) if !e.is_permanent() => format!("error: {}\n", e),
                Err(e) => return Err(e.into()),
            };
            output.write_all(reply.as_bytes()).await?;
        }
        output.write_all(b"> ").await?;
        output.flush().await?;
    }
    output.flush().await?;
    Ok(())
}

fn print_result(result: &MatchResult) {
    println!("{}", result.answer);
    println!(
        "  context: {}  score: {:.3}  matched: {}{}",
        result.context,
        result.score,
        result.matched_question,
        if result.is_fallback { "  (fallback)" } else { "" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedProvider;
    use chrono::{Duration, TimeZone, Utc};
    use context_faq_core::clock::ManualClock;
    use context_faq_core::{ContextTracker, EmbeddingIndex};
    use std::sync::Arc;

    async fn matcher() -> FaqMatcher {
        let provider = Arc::new(HashedProvider::new(128).unwrap());
        let mut index = EmbeddingIndex::new();
        index
            .load(
                Partition::general(),
                vec!["What are your opening hours?".to_string()],
                vec!["9am to 5pm.".to_string()],
                provider.as_ref(),
                8,
            )
            .await
            .unwrap();
        index
            .load(
                Partition::goldcard(),
                vec!["What is the gold card annual fee?".to_string()],
                vec!["No fee in the first year.".to_string()],
                provider.as_ref(),
                8,
            )
            .await
            .unwrap();
        FaqMatcher::new(Arc::new(index), provider, ContextTracker::default())
    }

    #[tokio::test]
    async fn test_chat_loop_tracks_context_across_lines() {
        let matcher = matcher().await;
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        let mut session = SessionState::default();
        let input = b"What are your opening hours?\nTell me about the Gold Card\n\n/quit\nignored\n";
        let mut output = Vec::new();

        chat_loop(&matcher, &mut session, &clock, &input[..], &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("[GENERAL] 9am to 5pm."));
        assert!(text.contains("[GOLDCARD]"));
        assert!(!text.contains("ignored"));
        assert_eq!(session.active_context, Partition::goldcard());

        clock.advance(Duration::seconds(301));
        let result = matcher
            .answer(&mut session, "opening hours", clock.now())
            .await
            .unwrap();
        assert_eq!(result.context, Partition::general());
    }
}
