use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::{Number, State};
use crate::error::{Error, Result};

/// Text-to-vector capability consumed by the indexing and retrieval paths.
///
/// Implementations must either return a vector of the configured dimension or
/// fail; a failed embedding is never replaced with a placeholder vector.
pub trait EmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<Number>>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<Number>>,
}

/// Embedding capability behind an HTTP endpoint speaking the
/// `{"model", "input"}` / `{"embeddings": [[...]]}` convention.
pub struct HttpEmbeddingProvider {
    client: Client,
    endpoint: String,
    model: String,
}

impl HttpEmbeddingProvider {
    pub fn new(state: &State) -> Result<Self> {
        Self::with_endpoint(
            &state.embed_endpoint,
            &state.embed_model,
            Duration::from_secs(state.request_timeout_secs),
        )
    }

    pub fn with_endpoint(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Gateway(format!("failed to build HTTP client: {}", err)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        })
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<Number>> {
        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| Error::Gateway(format!("embedding request failed: {}", err)))?
            .error_for_status()
            .map_err(|err| Error::Gateway(format!("embedding endpoint rejected the request: {}", err)))?;

        let body: EmbedResponse = response
            .json()
            .map_err(|err| Error::Gateway(format!("malformed embedding response: {}", err)))?;

        body.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Gateway("embedding response contained no vectors".to_string()))
    }
}

/// Deterministic offline provider: hashes the input text into a
/// fixed-dimension vector. Identical text always maps to the identical
/// vector, which is all the pipeline relies on. Useful for tests and for
/// exercising the index without a live endpoint.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<Number>> {
        let mut values = Vec::with_capacity(self.dimensions);
        let mut counter: u32 = 0;
        while values.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for pair in digest.chunks_exact(2) {
                if values.len() == self.dimensions {
                    break;
                }
                let raw = u16::from_le_bytes([pair[0], pair[1]]);
                values.push(raw as Number / u16::MAX as Number - 0.5);
            }
            counter += 1;
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new(24);
        let first = provider.embed("hello world").unwrap();
        let second = provider.embed("hello world").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 24);
        assert_ne!(first, provider.embed("goodbye world").unwrap());
    }

    #[test]
    fn http_provider_takes_first_embedding_row() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/embed")
                .json_body_partial(r#"{"model": "nomic-embed-text", "input": "a chunk"}"#);
            then.status(200)
                .json_body(serde_json::json!({ "embeddings": [[0.25, -0.5, 1.0]] }));
        });

        let provider = HttpEmbeddingProvider::with_endpoint(
            &server.url("/api/embed"),
            "nomic-embed-text",
            Duration::from_secs(5),
        )
        .unwrap();

        let vector = provider.embed("a chunk").unwrap();
        mock.assert();
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn http_provider_surfaces_server_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(503);
        });

        let provider = HttpEmbeddingProvider::with_endpoint(
            &server.url("/api/embed"),
            "nomic-embed-text",
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(matches!(provider.embed("a chunk"), Err(Error::Gateway(_))));
    }

    #[test]
    fn http_provider_rejects_empty_embedding_lists() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200)
                .json_body(serde_json::json!({ "embeddings": [] }));
        });

        let provider = HttpEmbeddingProvider::with_endpoint(
            &server.url("/api/embed"),
            "nomic-embed-text",
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(matches!(provider.embed("a chunk"), Err(Error::Gateway(_))));
    }
}
