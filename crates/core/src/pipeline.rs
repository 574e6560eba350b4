use crate::classifier::ComplianceChecker;
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{ComplianceVerdict, RetrievalOptions};
use crate::rerank::Reranker;
use crate::retriever::RetrievalContext;

/// Result of one compliance check: the segments that were handed to the
/// classifier (in the order it saw them) and its verdict.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub segments: Vec<String>,
    pub verdict: ComplianceVerdict,
}

/// Query-time pipeline: retrieve top-K candidates, optionally rerank and
/// keep the top-N, then classify. Works identically with the reranker
/// disabled; the classifier then sees the raw retrieval order.
pub struct CertPipeline<E, C>
where
    E: Embedder,
    C: ComplianceChecker,
{
    context: RetrievalContext<E>,
    reranker: Option<Box<dyn Reranker + Send + Sync>>,
    checker: C,
    options: RetrievalOptions,
}

impl<E, C> CertPipeline<E, C>
where
    E: Embedder + Send + Sync,
    C: ComplianceChecker + Send + Sync,
{
    pub fn new(context: RetrievalContext<E>, checker: C) -> Self {
        Self {
            context,
            reranker: None,
            checker,
            options: RetrievalOptions::default(),
        }
    }

    pub fn with_reranker(mut self, reranker: Box<dyn Reranker + Send + Sync>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_options(mut self, options: RetrievalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn context(&self) -> &RetrievalContext<E> {
        &self.context
    }

    /// The segments the classifier would see for `use_case`: top-K by vector
    /// similarity, narrowed to the reranker's top-N when one is configured.
    /// Passing fewer, sharper segments beats passing more, looser ones.
    pub async fn retrieve_segments(&self, use_case: &str) -> Result<Vec<String>, SearchError> {
        let hits = self.context.search(use_case, self.options.top_k)?;
        let mut segments: Vec<String> = hits.into_iter().map(|hit| hit.text).collect();

        if let Some(reranker) = &self.reranker {
            segments = reranker.rerank(use_case, &segments).await?;
            segments.truncate(self.options.keep_top);
        }

        Ok(segments)
    }

    pub async fn check(&self, use_case: &str) -> Result<CheckOutcome, SearchError> {
        let segments = self.retrieve_segments(use_case).await?;
        let verdict = self.checker.check_use_case(use_case, &segments).await?;
        Ok(CheckOutcome { segments, verdict })
    }

    pub async fn check_batch(&self, use_cases: &[String]) -> Result<Vec<CheckOutcome>, SearchError> {
        let mut outcomes = Vec::with_capacity(use_cases.len());
        for use_case in use_cases {
            outcomes.push(self.check(use_case).await?);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::CertPipeline;
    use crate::chunking::TextChunk;
    use crate::classifier::ComplianceChecker;
    use crate::embeddings::HashedNgramEmbedder;
    use crate::error::SearchError;
    use crate::index::EmbeddingIndex;
    use crate::models::{
        CheckType, ComplianceVerdict, DistanceMetric, RegulationObject, RetrievalOptions,
    };
    use crate::rerank::TermOverlapReranker;
    use crate::retriever::RetrievalContext;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeChecker {
        seen_segments: Mutex<Vec<Vec<String>>>,
    }

    impl FakeChecker {
        fn new() -> Self {
            Self {
                seen_segments: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ComplianceChecker for FakeChecker {
        async fn check_use_case(
            &self,
            _use_case: &str,
            segments: &[String],
        ) -> Result<ComplianceVerdict, SearchError> {
            self.seen_segments
                .lock()
                .unwrap()
                .push(segments.to_vec());
            Ok(ComplianceVerdict::TypedCheck {
                object: Some(RegulationObject::Avas),
                check_type: CheckType::RegulationsMet,
                comment: None,
            })
        }
    }

    fn test_context() -> RetrievalContext<HashedNgramEmbedder> {
        let embedder = HashedNgramEmbedder { dimensions: 64 };
        let chunks: Vec<TextChunk> = [
            "AVAS reverse sound notification for pedestrians",
            "HVAC cabin airflow distribution requirements",
            "brake assist activation threshold",
            "windscreen wiper sweep frequency",
        ]
        .iter()
        .map(|text| TextChunk {
            source_id: "regs.txt".to_string(),
            text: (*text).to_string(),
        })
        .collect();

        let index = EmbeddingIndex::build(&chunks, &embedder, DistanceMetric::Cosine);
        RetrievalContext::new(embedder, index).unwrap()
    }

    #[tokio::test]
    async fn without_reranker_the_classifier_sees_raw_top_k() {
        let pipeline = CertPipeline::new(test_context(), FakeChecker::new()).with_options(
            RetrievalOptions {
                top_k: 3,
                keep_top: 2,
            },
        );

        let outcome = pipeline
            .check("AVAS reverse sound notification")
            .await
            .unwrap();

        assert_eq!(outcome.segments.len(), 3);
        assert!(outcome.segments[0].contains("AVAS"));
        assert!(matches!(
            outcome.verdict,
            ComplianceVerdict::TypedCheck { .. }
        ));
    }

    #[tokio::test]
    async fn reranker_narrows_to_keep_top() {
        let checker = FakeChecker::new();
        let pipeline = CertPipeline::new(test_context(), checker)
            .with_reranker(Box::new(TermOverlapReranker))
            .with_options(RetrievalOptions {
                top_k: 4,
                keep_top: 2,
            });

        let outcome = pipeline
            .check("reverse sound notification for pedestrians")
            .await
            .unwrap();

        assert_eq!(outcome.segments.len(), 2);
        assert!(outcome.segments[0].contains("AVAS"));
    }

    #[tokio::test]
    async fn batch_checks_each_use_case() {
        let pipeline = CertPipeline::new(test_context(), FakeChecker::new());

        let use_cases = vec![
            "AVAS reverse notification".to_string(),
            "cabin airflow".to_string(),
        ];
        let outcomes = pipeline.check_batch(&use_cases).await.unwrap();
        assert_eq!(outcomes.len(), 2);
    }
}
