use tracing::warn;

use crate::embeddings::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::index::Index;

/// Result of a retrieval query.
///
/// `NoRelevantFragments` is a defined outcome, not an error: vector search
/// found candidates, but none of them shared a token with the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Chunk texts that survived the lexical filter, best match first.
    Context(Vec<String>),
    NoRelevantFragments,
}

impl QueryOutcome {
    pub fn context(&self) -> Option<&[String]> {
        match self {
            QueryOutcome::Context(fragments) => Some(fragments),
            QueryOutcome::NoRelevantFragments => None,
        }
    }
}

/// Read-only retrieval engine over an opened index.
///
/// Holds a shared borrow of the index, so queries can never interleave with
/// `index_document`, which needs the handle exclusively.
pub struct Retriever<'a> {
    index: &'a Index,
    embedder: &'a dyn EmbeddingProvider,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a Index, embedder: &'a dyn EmbeddingProvider) -> Self {
        Self { index, embedder }
    }

    /// Embeds `question`, retrieves the `k` nearest chunks, and keeps only
    /// those sharing at least one query token as a case-insensitive
    /// substring. Results are capped at `k` and ordered best-first.
    pub fn query(&self, question: &str, k: usize) -> Result<QueryOutcome> {
        let query_vector = self
            .embedder
            .embed(question)
            .map_err(|err| Error::Retrieval(err.to_string()))?;

        let hits = self.index.vectors().search(&query_vector, k)?;

        let mut candidates = Vec::with_capacity(hits.len());
        for (position, _distance) in hits {
            match self.index.metadata().get(position) {
                Ok(record) => candidates.push(record.text.clone()),
                // A hit the metadata store cannot resolve means the pair has
                // drifted; surface it loudly but keep serving the rest.
                Err(_) => warn!(position, "search hit has no metadata record, dropping it"),
            }
        }

        let survivors = lexical_filter(question, candidates);
        if survivors.is_empty() {
            return Ok(QueryOutcome::NoRelevantFragments);
        }
        Ok(QueryOutcome::Context(survivors))
    }
}

/// Retains candidates containing at least one query token as a
/// case-insensitive substring. Tokens are lowercased whitespace splits with
/// surrounding punctuation trimmed, so "What fruit?" filters on "what" and
/// "fruit".
fn lexical_filter(question: &str, candidates: Vec<String>) -> Vec<String> {
    let lowered_question = question.to_lowercase();
    let tokens: Vec<&str> = lowered_question
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .collect();

    candidates
        .into_iter()
        .filter(|candidate| {
            let lowered = candidate.to_lowercase();
            tokens.iter().any(|token| lowered.contains(token))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Number, State};
    use crate::embeddings::MockEmbeddingProvider;
    use std::path::Path;
    use tempfile::tempdir;

    const DIM: usize = 16;

    fn test_state(dir: &Path) -> State {
        State {
            path: dir.join("index.rgdx").to_string_lossy().into_owned(),
            metadata_path: dir.join("index.meta.json").to_string_lossy().into_owned(),
            docs_dir: dir.join("docs").to_string_lossy().into_owned(),
            dimensions: DIM,
            chunk_size: 50,
            chunk_overlap: 0,
            top_k: 6,
            embed_endpoint: "http://unused.invalid/embed".to_string(),
            embed_model: "mock".to_string(),
            chat_endpoint: "http://unused.invalid/chat".to_string(),
            chat_model: "mock".to_string(),
            request_timeout_secs: 5,
            max_answer_tokens: 128,
        }
    }

    fn fruit_and_transit_index(state: &State, embedder: &MockEmbeddingProvider) -> Index {
        let mut index = Index::open(state).unwrap();
        index
            .index_document(embedder, "fruit", "apple orange banana")
            .unwrap();
        index
            .index_document(embedder, "transit", "car bus train")
            .unwrap();
        index
    }

    #[test]
    fn query_matching_a_token_returns_that_chunk() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let embedder = MockEmbeddingProvider::new(DIM);
        let index = fruit_and_transit_index(&state, &embedder);

        let retriever = Retriever::new(&index, &embedder);
        let outcome = retriever.query("banana smoothie", 2).unwrap();
        assert_eq!(
            outcome.context().unwrap(),
            &["apple orange banana".to_string()]
        );
    }

    #[test]
    fn matching_is_case_insensitive_and_ignores_punctuation() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let embedder = MockEmbeddingProvider::new(DIM);
        let index = fruit_and_transit_index(&state, &embedder);

        let retriever = Retriever::new(&index, &embedder);
        let outcome = retriever.query("BANANA?", 2).unwrap();
        assert_eq!(
            outcome.context().unwrap(),
            &["apple orange banana".to_string()]
        );
    }

    #[test]
    fn exact_chunk_text_comes_back_first() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let embedder = MockEmbeddingProvider::new(DIM);
        let index = fruit_and_transit_index(&state, &embedder);

        let retriever = Retriever::new(&index, &embedder);
        let outcome = retriever.query("apple orange banana", 2).unwrap();
        let context = outcome.context().unwrap();
        assert_eq!(context[0], "apple orange banana");
    }

    #[test]
    fn disjoint_vocabulary_yields_no_relevant_fragments() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let embedder = MockEmbeddingProvider::new(DIM);
        let index = fruit_and_transit_index(&state, &embedder);

        let retriever = Retriever::new(&index, &embedder);
        let outcome = retriever.query("zeppelin", 2).unwrap();
        assert_eq!(outcome, QueryOutcome::NoRelevantFragments);
        assert!(outcome.context().is_none());
    }

    #[test]
    fn embedding_failure_surfaces_as_retrieval_error() {
        struct AlwaysFails;
        impl EmbeddingProvider for AlwaysFails {
            fn embed(&self, _text: &str) -> Result<Vec<Number>> {
                Err(Error::Gateway("embedding backend unreachable".to_string()))
            }
        }

        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let embedder = MockEmbeddingProvider::new(DIM);
        let index = fruit_and_transit_index(&state, &embedder);

        let retriever = Retriever::new(&index, &AlwaysFails);
        assert!(matches!(
            retriever.query("anything", 2),
            Err(Error::Retrieval(_))
        ));
    }
}
