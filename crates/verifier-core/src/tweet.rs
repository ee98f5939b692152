//! Tweet record for the microblog source.
//!
//! Grounded on `original_source/verifier/twitter/tweet.py`: equality is
//! over the full `(created_at, id, author, text)` tuple, ordering for
//! the symmetric-difference merge walk is by `id`, and the parsed
//! `date` drops the trailing UTC designator before calling the
//! ISO-8601 parser (the original parses `created_at[:-1]` as a naive
//! datetime).

use chrono::NaiveDateTime;

/// A single sampled-stream tweet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tweet {
    pub id: u64,
    pub created_at: String,
    pub author_id: String,
    pub text: String,
    pub date: NaiveDateTime,
}

/// Error parsing a tweet's `created_at` timestamp.
#[derive(Debug, thiserror::Error)]
#[error("invalid tweet timestamp {0:?}: {1}")]
pub struct TweetDateError(String, chrono::ParseError);

impl Tweet {
    /// Construct a tweet, parsing `created_at` the way the beacon's
    /// own stream timestamps are formatted (`...Z` suffix, millisecond
    /// precision).
    ///
    /// # Errors
    /// Returns a [`TweetDateError`] if `created_at` cannot be parsed.
    pub fn new(
        id: u64,
        created_at: impl Into<String>,
        author_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, TweetDateError> {
        let created_at = created_at.into();
        let date = parse_tweet_date(&created_at).map_err(|e| TweetDateError(created_at.clone(), e))?;
        Ok(Self {
            id,
            created_at,
            author_id: author_id.into(),
            text: text.into(),
            date,
        })
    }

    /// Ordering key used by the heap buffer: `(date, id)`.
    #[must_use]
    pub fn heap_key(&self) -> (NaiveDateTime, u64) {
        (self.date, self.id)
    }
}

fn parse_tweet_date(created_at: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    // strip the trailing designator (matches `created_at[:-1]` in the original)
    let without_suffix = &created_at[..created_at.len().saturating_sub(1)];
    NaiveDateTime::parse_from_str(without_suffix, "%Y-%m-%dT%H:%M:%S%.f")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millisecond_precision_timestamp() {
        let tweet = Tweet::new(1, "2025-01-01T12:00:00.000Z", "author", "hello").unwrap();
        assert_eq!(tweet.date.to_string(), "2025-01-01 12:00:00");
    }

    #[test]
    fn equality_is_over_full_tuple() {
        let a = Tweet::new(1, "2025-01-01T12:00:00.000Z", "author", "hello").unwrap();
        let b = Tweet::new(1, "2025-01-01T12:00:00.000Z", "author", "different").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert!(Tweet::new(1, "not-a-date", "author", "hello").is_err());
    }
}
