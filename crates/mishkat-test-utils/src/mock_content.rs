// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content lookup doubles.

use std::time::Duration;

use async_trait::async_trait;
use mishkat_core::{ContentLookup, MishkatError};

/// Returns one excerpt for any query mentioning `keyword`.
pub struct StaticContentLookup {
    keyword: String,
    excerpt: String,
}

impl StaticContentLookup {
    pub fn new(keyword: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into().to_lowercase(),
            excerpt: excerpt.into(),
        }
    }
}

#[async_trait]
impl ContentLookup for StaticContentLookup {
    async fn lookup(&self, query: &str) -> Result<Option<String>, MishkatError> {
        Ok(query
            .to_lowercase()
            .contains(&self.keyword)
            .then(|| self.excerpt.clone()))
    }
}

/// Sleeps for a fixed delay and then finds nothing. Used to trigger
/// generation timeouts and cancellation.
pub struct SlowContentLookup {
    delay: Duration,
}

impl SlowContentLookup {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ContentLookup for SlowContentLookup {
    async fn lookup(&self, _query: &str) -> Result<Option<String>, MishkatError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_lookup_matches_case_insensitively() {
        let lookup = StaticContentLookup::new("Smiling", "excerpt");
        assert_eq!(
            lookup.lookup("hadith about SMILING").await.unwrap(),
            Some("excerpt".to_string())
        );
        assert_eq!(lookup.lookup("fasting").await.unwrap(), None);
    }
}
