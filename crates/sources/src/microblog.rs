//! Microblog source: samples a public "sample stream" of short posts
//! over a long-lived HTTP connection and verifies a pulse's claimed
//! window of posts against the buffer.
//!
//! Grounded on `original_source/verifier/twitter/source.py`. Two details
//! worth calling out:
//!
//! - The beacon's claimed list and the verifier's buffered list are
//!   compared with a sorted symmetric-difference walk that orders by
//!   **id only** (the original's `Tweet` only implements `__gt__` by
//!   id; Python falls back to the reflected operator for `<`, so the
//!   merge never actually looks at the timestamp). We reproduce that.
//! - The collector authenticates once via OAuth2 client-credentials,
//!   then reads newline-delimited JSON objects off a single streaming
//!   response body forever.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Timelike, Utc};
use tracing::{error, warn};

use verifier_core::{MicroblogBuffer, Source, Tweet, VerifierResult, VerifyParams};

const BUFFER_SIZE: usize = 20_000;
const STREAM_URL: &str =
    "https://api.twitter.com/2/tweets/sample/stream?tweet.fields=created_at&expansions=author_id";
const BEARER_TOKEN_URL: &str = "https://api.twitter.com/oauth2/token";

#[derive(Debug, Clone)]
pub struct MicroblogConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub tweet_interval_secs: i64,
    pub second_start: u32,
}

pub struct MicroblogSource {
    config: MicroblogConfig,
    buffer: MicroblogBuffer,
    client: reqwest::Client,
    stream: Option<reqwest::Response>,
    line_buf: Vec<u8>,
}

impl MicroblogSource {
    #[must_use]
    pub fn new(config: MicroblogConfig) -> Self {
        let second_start = config.second_start;
        Self {
            config,
            buffer: MicroblogBuffer::new(BUFFER_SIZE, second_start),
            client: reqwest::Client::new(),
            stream: None,
            line_buf: Vec::new(),
        }
    }

    async fn fetch_bearer_token(&self) -> anyhow::Result<String> {
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
        }
        let resp = self
            .client
            .post(BEARER_TOKEN_URL)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .form(&[("grant_type", "client_credentials")])
            .header("User-Agent", "TwitterDevSampledStreamQuickStartPython")
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("cannot get a bearer token (HTTP {}): {}", resp.status(), resp.text().await?);
        }
        Ok(resp.json::<TokenResponse>().await?.access_token)
    }

    /// Extracts complete `\n`-terminated JSON lines accumulated in
    /// `line_buf`, parsing each into a [`Tweet`].
    fn drain_lines(&mut self) -> Vec<Tweet> {
        let mut tweets = Vec::new();
        while let Some(pos) = self.line_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.line_buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            match parse_stream_record(line) {
                Ok(Some(tweet)) => tweets.push(tweet),
                Ok(None) => {}
                Err(e) => error!("cannot parse sampled-stream record: {e}"),
            }
        }
        tweets
    }
}

fn parse_stream_record(line: &[u8]) -> anyhow::Result<Option<Tweet>> {
    let value: serde_json::Value = serde_json::from_slice(line)?;
    let Some(data) = value.get("data") else {
        anyhow::bail!("record has no \"data\" field: {value}");
    };
    let id: u64 = data["id"].as_str().unwrap_or_default().parse()?;
    let created_at = data["created_at"].as_str().unwrap_or_default().to_string();
    let author_id = data["author_id"].as_str().unwrap_or_default().to_string();
    let text = data["text"].as_str().unwrap_or_default().to_string();
    Ok(Some(Tweet::new(id, created_at, author_id, text)?))
}

/// Parses the beacon's claimed tweet list, in the same encoding the
/// collector produces it: a JSON array of `{id, created_at, author_id,
/// text}` objects.
#[must_use]
pub fn parse_tweet_list(raw: &str) -> Vec<Tweet> {
    if raw.is_empty() {
        return Vec::new();
    }
    let parsed: Result<Vec<serde_json::Value>, _> = serde_json::from_str(raw);
    match parsed {
        Ok(values) => values
            .into_iter()
            .filter_map(|v| {
                let id = v["id"].as_str()?.parse().ok()?;
                Some(Tweet::new(
                    id,
                    v["created_at"].as_str()?.to_string(),
                    v["author_id"].as_str().unwrap_or_default().to_string(),
                    v["text"].as_str().unwrap_or_default().to_string(),
                ))
            })
            .filter_map(Result::ok)
            .collect(),
        Err(e) => {
            warn!("cannot parse tweet list: {e}");
            Vec::new()
        }
    }
}

/// Sorted symmetric-difference merge, ordered by tweet **id only** —
/// reproducing the original's accidental id-only comparison.
fn symmetric_difference(ours: &[Tweet], theirs: &[Tweet]) -> (Vec<Tweet>, Vec<Tweet>) {
    let (mut i, mut j) = (0, 0);
    let (mut our_uniq, mut their_uniq) = (Vec::new(), Vec::new());
    while i < ours.len() && j < theirs.len() {
        match ours[i].id.cmp(&theirs[j].id) {
            std::cmp::Ordering::Less => {
                our_uniq.push(ours[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                their_uniq.push(theirs[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    our_uniq.extend_from_slice(&ours[i..]);
    their_uniq.extend_from_slice(&theirs[j..]);
    (our_uniq, their_uniq)
}

#[async_trait]
impl Source for MicroblogSource {
    fn name(&self) -> &str {
        "twitter"
    }

    async fn init_collector(&mut self) -> anyhow::Result<()> {
        let token = self.fetch_bearer_token().await?;
        let resp = self
            .client
            .get(STREAM_URL)
            .bearer_auth(token)
            .header("User-Agent", "RandomVerifier-Rust")
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("sampled stream request failed: HTTP {}", resp.status());
        }
        self.stream = Some(resp);
        self.line_buf.clear();
        Ok(())
    }

    async fn collect(&mut self) -> anyhow::Result<()> {
        let resp = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("microblog collector not initialized"))?;
        let Some(chunk) = resp.chunk().await? else {
            anyhow::bail!("sampled stream ended");
        };
        self.line_buf.extend_from_slice(&chunk);
        for tweet in self.drain_lines() {
            // window anchor: the tweet's own timestamp with its second
            // replaced by `second_start` (sub-second precision is kept,
            // matching the original's `tweet.date.replace(second=...)`)
            let start_date = tweet
                .date
                .with_second(self.config.second_start)
                .unwrap_or(tweet.date);
            let end_date = start_date + chrono::Duration::seconds(self.config.tweet_interval_secs);
            if tweet.date >= start_date && tweet.date <= end_date {
                self.buffer.add(tweet);
            }
        }
        Ok(())
    }

    async fn finish_collector(&mut self) -> anyhow::Result<()> {
        self.stream = None;
        Ok(())
    }

    async fn verify(&mut self, params: &VerifyParams) -> VerifierResult {
        let mut result = VerifierResult::new(self.name(), Utc::now());
        result.possible = self.buffer.possible();
        result.ext_value_status = params.status;
        if params.status & 0b10 == 0b10 {
            result.status = verifier_core::VerifierStatus::WrongStatusCode;
            result.add_detail(format!("ExtValue is not valid, status={}", params.status));
            result.finish(Utc::now());
            return result;
        }

        let their_list = parse_tweet_list(&params.raw);
        let start_date = match parse_marker_date(&params.metadata) {
            Ok(d) => d,
            Err(e) => {
                result.status = verifier_core::VerifierStatus::InvalidExtractionParameters;
                result.add_detail(format!("cannot parse metadata timestamp: {e}"));
                result.finish(Utc::now());
                return result;
            }
        };
        let end_date = start_date + chrono::Duration::seconds(self.config.tweet_interval_secs);
        if start_date.second() != self.config.second_start {
            result.status = verifier_core::VerifierStatus::InvalidExtractionParameters;
            result.add_detail(format!(
                "marker did not start in expected second, second={}",
                self.config.second_start
            ));
        } else if their_list.is_empty() {
            result.status = verifier_core::VerifierStatus::DataNotFoundInBuffer;
            result.add_detail("beacon reported an empty tweet list");
        } else if self.buffer.check_marker(start_date) {
            let our_list = self.buffer.get_list(end_date);
            if our_list.is_empty() {
                result.status = verifier_core::VerifierStatus::DataNotFoundInBuffer;
                result.add_detail("verifier reported an empty tweet list");
            } else {
                let (our_uniq, their_uniq) = symmetric_difference(&our_list, &their_list);
                metrics::histogram!("twitter_verifier_extra_tweets", "owner" => "verifier")
                    .record(our_uniq.len() as f64);
                metrics::histogram!("twitter_verifier_extra_tweets", "owner" => "beacon")
                    .record(their_uniq.len() as f64);
                if !our_uniq.is_empty() || !their_uniq.is_empty() {
                    result.status = verifier_core::VerifierStatus::DataDoesNotMatchBuffer;
                    result.add_detail(format!(
                        "some items are not on both lists, our_len={}, their_len={}, our_uniq={}, their_uniq={}",
                        our_list.len(),
                        their_list.len(),
                        our_uniq.len(),
                        their_uniq.len()
                    ));
                }
            }
        } else {
            result.status = verifier_core::VerifierStatus::DataNotFoundInBuffer;
            result.add_detail(format!(
                "metadata not found, metadata={}, buffer_size={}",
                params.metadata,
                self.buffer.len()
            ));
        }
        result.finish(Utc::now());
        result
    }

    fn possible(&self) -> usize {
        self.buffer.possible()
    }

    fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

fn parse_marker_date(metadata: &str) -> anyhow::Result<NaiveDateTime> {
    let without_suffix = &metadata[..metadata.len().saturating_sub(1)];
    Ok(NaiveDateTime::parse_from_str(without_suffix, "%Y-%m-%dT%H:%M:%S%.f")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet(id: u64, iso: &str) -> Tweet {
        Tweet::new(id, iso, "author", "text").unwrap()
    }

    #[test]
    fn symmetric_difference_orders_by_id_only() {
        let ours = vec![tweet(1, "2025-01-01T12:00:01.000Z"), tweet(3, "2025-01-01T12:00:03.000Z")];
        let theirs = vec![tweet(2, "2025-01-01T12:00:02.000Z"), tweet(3, "2025-01-01T12:00:03.000Z")];
        let (our_uniq, their_uniq) = symmetric_difference(&ours, &theirs);
        assert_eq!(our_uniq.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(their_uniq.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn parse_tweet_list_recovers_json_array() {
        let raw = r#"[{"id":"1","created_at":"2025-01-01T12:00:00.000Z","author_id":"a","text":"hi"}]"#;
        let tweets = parse_tweet_list(raw);
        assert_eq!(tweets.len(), 1);
        assert_eq!(tweets[0].id, 1);
    }

    #[test]
    fn parse_tweet_list_on_empty_string_is_empty() {
        assert!(parse_tweet_list("").is_empty());
    }

    #[test]
    fn marker_date_strips_trailing_designator() {
        let d = parse_marker_date("2025-01-01T12:00:00.000Z").unwrap();
        assert_eq!(d.second(), 0);
    }
}
