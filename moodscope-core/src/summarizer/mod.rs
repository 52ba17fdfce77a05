//! LLM-backed monthly summaries
//!
//! Sends a month of merged journal entries to the configured provider and
//! returns the narrative text the digest sections are built from. Supports
//! Ollama (local), Claude, and OpenAI via plain HTTP.

use crate::config::{LlmProvider, SummarizerConfig};
use crate::error::{Error, Result};
use crate::period::MonthWindow;
use crate::types::MergedEntry;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = r#"You are a reflective journaling coach. You receive one month of a person's mood journal: one line per day with an optional mood score from 1 (low) to 5 (high), contributing factors in brackets, and free text.

Write a supportive monthly reflection as EXACTLY five paragraphs separated by blank lines, in this order:

1. Overview of the month's overall mood and how it moved.
2. Positive trends worth reinforcing.
3. Likely reasons behind low-mood days, grounded in the factors and text.
4. Concrete, gentle recommendations for the coming weeks.
5. Two or three reflection questions for the person to sit with.

Address the person directly as "you". Do not number or title the paragraphs. Do not invent events that are not in the entries. If the month is still in progress, reflect only on the days recorded so far."#;

/// Entry lines beyond this are cut from the prompt. Keeps requests well
/// inside every provider's context window even for daily long-form writers.
const MAX_ENTRIES_CHARS: usize = 16_000;

/// Client interface for generating summaries (allows mocking in tests)
pub trait SummaryClient: Send + Sync {
    fn summarize(&self, prompt: &str) -> Result<String>;
}

/// HTTP client for LLM providers
pub struct HttpSummaryClient {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl HttpSummaryClient {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Io)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Summarizer(format!("failed to build http client: {e}")))?;

        let api_key = config.api_key.clone().or_else(|| match config.provider {
            LlmProvider::Claude => std::env::var("ANTHROPIC_API_KEY").ok(),
            LlmProvider::OpenAI => std::env::var("OPENAI_API_KEY").ok(),
            LlmProvider::Ollama => None,
        });

        if api_key.is_none() && !matches!(config.provider, LlmProvider::Ollama) {
            return Err(Error::Config(format!(
                "summarizer provider '{}' requires an api_key in config or the matching environment variable",
                config.provider.as_str()
            )));
        }

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            runtime,
            http,
        })
    }

    fn complete_ollama(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
        self.runtime.block_on(async {
            let resp = self
                .http
                .post(url)
                .json(&json!({
                    "model": self.model,
                    "prompt": format!("{SYSTEM_PROMPT}\n\n{prompt}"),
                    "stream": false,
                }))
                .send()
                .await
                .map_err(|e| Error::Summarizer(format!("ollama request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| Error::Summarizer(format!("ollama read body failed: {e}")))?;
            if !status.is_success() {
                return Err(Error::Summarizer(format!(
                    "ollama returned {}: {}",
                    status.as_u16(),
                    body
                )));
            }

            let json: serde_json::Value = serde_json::from_str(&body)?;
            json["response"]
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    Error::Summarizer("ollama response missing 'response' field".to_string())
                })
        })
    }

    fn complete_claude(&self, prompt: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("claude api key missing".to_string()))?;

        let url = format!("{}/v1/messages", self.endpoint.trim_end_matches('/'));
        self.runtime.block_on(async {
            let resp = self
                .http
                .post(url)
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": self.model,
                    "max_tokens": 1024,
                    "system": SYSTEM_PROMPT,
                    "messages": [{"role": "user", "content": prompt}],
                }))
                .send()
                .await
                .map_err(|e| Error::Summarizer(format!("claude request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| Error::Summarizer(format!("claude read body failed: {e}")))?;
            if !status.is_success() {
                return Err(Error::Summarizer(format!(
                    "claude returned {}: {}",
                    status.as_u16(),
                    body
                )));
            }

            let json: serde_json::Value = serde_json::from_str(&body)?;
            json["content"][0]["text"]
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    Error::Summarizer("claude response missing content text".to_string())
                })
        })
    }

    fn complete_openai(&self, prompt: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("openai api key missing".to_string()))?;

        let url = format!("{}/v1/chat/completions", self.endpoint.trim_end_matches('/'));
        self.runtime.block_on(async {
            let resp = self
                .http
                .post(url)
                .header("Authorization", format!("Bearer {key}"))
                .json(&json!({
                    "model": self.model,
                    "messages": [
                        {"role": "system", "content": SYSTEM_PROMPT},
                        {"role": "user", "content": prompt},
                    ],
                }))
                .send()
                .await
                .map_err(|e| Error::Summarizer(format!("openai request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| Error::Summarizer(format!("openai read body failed: {e}")))?;
            if !status.is_success() {
                return Err(Error::Summarizer(format!(
                    "openai returned {}: {}",
                    status.as_u16(),
                    body
                )));
            }

            let json: serde_json::Value = serde_json::from_str(&body)?;
            json["choices"][0]["message"]["content"]
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    Error::Summarizer("openai response missing message content".to_string())
                })
        })
    }
}

impl SummaryClient for HttpSummaryClient {
    fn summarize(&self, prompt: &str) -> Result<String> {
        debug!(
            provider = self.provider.as_str(),
            model = %self.model,
            prompt_chars = prompt.len(),
            "requesting summary"
        );
        match self.provider {
            LlmProvider::Ollama => self.complete_ollama(prompt),
            LlmProvider::Claude => self.complete_claude(prompt),
            LlmProvider::OpenAI => self.complete_openai(prompt),
        }
    }
}

/// Build a summary client from config
pub fn create_summary_client(config: &SummarizerConfig) -> Result<Box<dyn SummaryClient>> {
    Ok(Box::new(HttpSummaryClient::new(config)?))
}

/// Summarize one month of merged entries into narrative text.
///
/// The returned text is the raw provider output; callers split it into
/// sections. An empty response is an error so a flaky provider never
/// produces a blank digest.
pub fn summarize_month(
    client: &dyn SummaryClient,
    entries: &[MergedEntry],
    window: &MonthWindow,
) -> Result<String> {
    let prompt = build_prompt(entries, window);
    let text = client.summarize(&prompt)?;
    if text.trim().is_empty() {
        return Err(Error::Summarizer("provider returned an empty summary".to_string()));
    }
    Ok(text)
}

fn build_prompt(entries: &[MergedEntry], window: &MonthWindow) -> String {
    let mut body = String::new();
    for entry in entries {
        let mood = match entry.mood_score {
            Some(score) => format!("{score}/5"),
            None => "-".to_string(),
        };
        let factors = if entry.factors.is_empty() {
            String::new()
        } else {
            format!(" [{}]", entry.factors.join(", "))
        };
        // One line per day; merged free text may span lines
        let text = entry.text.replace('\n', " ");
        body.push_str(&format!(
            "{} mood {}{}: {}\n",
            entry.entry_date.format("%Y-%m-%d"),
            mood,
            factors,
            text
        ));
    }

    if body.len() > MAX_ENTRIES_CHARS {
        let mut cut = MAX_ENTRIES_CHARS;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("\n...[truncated]");
    }

    format!(
        "{}: {} of the month's days elapsed (week {}), {} day(s) journaled.\n\nEntries, one line per day:\n{}",
        window.display_name(),
        window.days_elapsed,
        window.week_index,
        entries.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    struct MockClient {
        response: String,
    }

    impl SummaryClient for MockClient {
        fn summarize(&self, _prompt: &str) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    fn merged(date: &str, mood: Option<i32>, factors: &[&str], text: &str) -> MergedEntry {
        MergedEntry {
            entry_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            mood_score: mood,
            factors: factors.iter().map(|f| f.to_string()).collect(),
            text: text.to_string(),
        }
    }

    fn window() -> MonthWindow {
        MonthWindow::compute(2025, 3, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()).unwrap()
    }

    /// Serve exactly one HTTP request, then hand back its request line.
    fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line == "\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = reader.into_inner();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            request_line
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_build_prompt_contains_window_and_entries() {
        let entries = vec![
            merged("2025-03-01", Some(4), &["sleep"], "Slept well, good start."),
            merged("2025-03-08", None, &[], "Forgot to rate today."),
        ];

        let prompt = build_prompt(&entries, &window());
        assert!(prompt.contains("March 2025"));
        assert!(prompt.contains("10 of the month's days elapsed (week 2)"));
        assert!(prompt.contains("2 day(s) journaled"));
        assert!(prompt.contains("2025-03-01 mood 4/5 [sleep]: Slept well, good start."));
        assert!(prompt.contains("2025-03-08 mood -: Forgot to rate today."));
    }

    #[test]
    fn test_build_prompt_flattens_multiline_text() {
        let entries = vec![merged("2025-03-02", Some(3), &[], "morning note\nevening note")];
        let prompt = build_prompt(&entries, &window());
        assert!(prompt.contains("morning note evening note"));
    }

    #[test]
    fn test_build_prompt_truncates_long_months() {
        let long_text = "a".repeat(2_000);
        let entries: Vec<MergedEntry> = (1..=28)
            .map(|day| merged(&format!("2025-03-{day:02}"), Some(3), &[], &long_text))
            .collect();

        let prompt = build_prompt(&entries, &window());
        assert!(prompt.contains("...[truncated]"));
        assert!(prompt.len() < MAX_ENTRIES_CHARS + 500);
    }

    #[test]
    fn test_summarize_month_passes_through_text() {
        let client = MockClient {
            response: "A calm month.\n\nWalks helped.\n\nWork stress.\n\nKeep walking.\n\nWhat restores you?".to_string(),
        };
        let entries = vec![merged("2025-03-01", Some(4), &[], "fine")];
        let text = summarize_month(&client, &entries, &window()).unwrap();
        assert!(text.starts_with("A calm month."));
    }

    #[test]
    fn test_summarize_month_rejects_empty_response() {
        let client = MockClient {
            response: "   \n".to_string(),
        };
        let entries = vec![merged("2025-03-01", Some(4), &[], "fine")];
        let err = summarize_month(&client, &entries, &window()).unwrap_err();
        assert!(matches!(err, Error::Summarizer(_)));
    }

    #[test]
    fn test_http_client_builds_for_ollama_without_key() {
        let config = SummarizerConfig {
            provider: LlmProvider::Ollama,
            model: "llama3".to_string(),
            endpoint: None,
            api_key: None,
            timeout_secs: 5,
        };
        let client = HttpSummaryClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_http_error_keeps_upstream_status_and_body() {
        let (endpoint, server) = serve_once(
            "401 Unauthorized",
            r#"{"error":{"message":"invalid x-api-key header"}}"#,
        );
        let config = SummarizerConfig {
            provider: LlmProvider::Claude,
            model: "claude-3-haiku".to_string(),
            // Trailing slash must not leak a "//" into the request path
            endpoint: Some(format!("{endpoint}/")),
            api_key: Some("test-key".to_string()),
            timeout_secs: 5,
        };

        let client = HttpSummaryClient::new(&config).unwrap();
        let err = client.summarize("2025-03-01 mood 4/5: fine").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("401"), "status missing from: {message}");
        assert!(
            message.contains("invalid x-api-key header"),
            "upstream body missing from: {message}"
        );

        let request_line = server.join().unwrap();
        assert!(
            request_line.starts_with("POST /v1/messages "),
            "unexpected request line: {request_line}"
        );
    }
}
