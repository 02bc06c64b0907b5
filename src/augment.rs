use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;

use crate::error::SessionError;
use crate::types::AugmentationContext;

/// Retrieves supporting context text for one finalized user utterance.
///
/// A trait seam so the orchestrator can be exercised in tests with a
/// `mockall` double instead of a live retrieval service. One attempt per
/// query, no caching: each question gets its own fresh retrieval, since a
/// live conversation drifts too fast for reuse to be safe.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<AugmentationContext, SessionError>;
}

#[derive(Debug, Deserialize)]
struct ChunksResponse {
    chunks: Vec<String>,
}

impl ChunksResponse {
    fn into_context(self) -> AugmentationContext {
        AugmentationContext::new(self.chunks.join("\n\n"))
    }
}

/// Retrieval over HTTP: `GET {base}/chunks?q=<query>` returning
/// `{"chunks": [...]}`, joined with blank lines into one context blob.
pub struct HttpRetriever {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRetriever {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ContextRetriever for HttpRetriever {
    async fn fetch(&self, query: &str) -> Result<AugmentationContext, SessionError> {
        let response = self
            .client
            .get(format!("{}/chunks", self.base_url))
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|err| SessionError::Retrieval(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SessionError::Retrieval(format!(
                "retrieval endpoint returned {}",
                response.status()
            )));
        }

        let body = response
            .json::<ChunksResponse>()
            .await
            .map_err(|err| SessionError::Retrieval(err.to_string()))?;

        Ok(body.into_context())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_join_with_blank_line_separator() {
        let body: ChunksResponse =
            serde_json::from_str(r#"{"chunks": ["Policy A", "Policy B"]}"#).expect("valid body");
        assert_eq!(body.into_context().as_str(), "Policy A\n\nPolicy B");
    }

    #[test]
    fn empty_chunk_list_yields_empty_context() {
        let body: ChunksResponse = serde_json::from_str(r#"{"chunks": []}"#).expect("valid body");
        assert!(body.into_context().is_empty());
    }
}
