use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Second-stage scorer: reorders retrieval candidates by pairwise
/// query-document relevance instead of vector similarity. Implementations
/// must return a permutation of the input, best first, with ties keeping the
/// input order.
#[async_trait]
pub trait Reranker {
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<String>, SearchError>;
}

/// Sorts `candidates` by descending score. The sort is stable, so candidates
/// with equal scores keep their retrieval order.
fn order_by_scores(candidates: &[String], scores: &[f32]) -> Vec<String> {
    let mut ranked: Vec<(&String, f32)> = candidates.iter().zip(scores.iter().copied()).collect();
    ranked.sort_by(|left, right| right.1.total_cmp(&left.1));
    ranked.into_iter().map(|(text, _)| text.clone()).collect()
}

#[derive(Debug, Clone, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct RerankHit {
    index: usize,
    score: f32,
}

/// Client for a cross-encoder scoring endpoint that takes `{query, texts}`
/// and answers one `{index, score}` pair per candidate.
pub struct HttpCrossEncoderReranker {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpCrossEncoderReranker {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, SearchError> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint)?;

        Ok(Self {
            endpoint,
            api_key,
            client: Client::new(),
        })
    }

    fn scores_from_hits(&self, hits: Vec<RerankHit>, expected: usize) -> Result<Vec<f32>, SearchError> {
        let mut scores = vec![None; expected];
        for hit in hits {
            if hit.index >= expected {
                return Err(SearchError::BackendResponse {
                    backend: "reranker".to_string(),
                    details: format!("candidate index {} out of range", hit.index),
                });
            }
            scores[hit.index] = Some(hit.score);
        }

        scores
            .into_iter()
            .enumerate()
            .map(|(index, score)| {
                score.ok_or_else(|| SearchError::BackendResponse {
                    backend: "reranker".to_string(),
                    details: format!("no score returned for candidate {index}"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Reranker for HttpCrossEncoderReranker {
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<String>, SearchError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&RerankRequest { query, texts: candidates });

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "reranker".to_string(),
                details: response.status().to_string(),
            });
        }

        let hits: Vec<RerankHit> = response.json().await?;
        let scores = self.scores_from_hits(hits, candidates.len())?;
        Ok(order_by_scores(candidates, &scores))
    }
}

/// Deterministic local pairwise scorer: counts query terms appearing in the
/// candidate. Offline stand-in for a trained cross-encoder, and the fixture
/// the pipeline tests run against.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermOverlapReranker;

impl TermOverlapReranker {
    fn score(query: &str, candidate: &str) -> f32 {
        let lowered = candidate.to_lowercase();
        query
            .split_whitespace()
            .map(|token| token.to_lowercase())
            .filter(|token| token.len() > 2)
            .filter(|token| lowered.contains(token.as_str()))
            .count() as f32
    }
}

#[async_trait]
impl Reranker for TermOverlapReranker {
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<String>, SearchError> {
        let scores: Vec<f32> = candidates
            .iter()
            .map(|candidate| Self::score(query, candidate))
            .collect();
        Ok(order_by_scores(candidates, &scores))
    }
}
