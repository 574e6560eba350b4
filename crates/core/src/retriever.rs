use crate::chunking::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::index::{open_or_build, EmbeddingIndex, OpenReport};
use crate::models::{DistanceMetric, RetrievalResult};
use std::path::Path;

/// Explicitly constructed handle owning the embedding function and the
/// loaded index. Queries embed through the same model the index was built
/// with; there is no process-wide model or index state.
pub struct RetrievalContext<E: Embedder> {
    embedder: E,
    index: EmbeddingIndex,
}

impl<E: Embedder> RetrievalContext<E> {
    pub fn new(embedder: E, index: EmbeddingIndex) -> Result<Self, SearchError> {
        if embedder.dimensions() != index.dimensions() {
            return Err(SearchError::Request(format!(
                "embedder dimension {} does not match index dimension {}",
                embedder.dimensions(),
                index.dimensions()
            )));
        }

        Ok(Self { embedder, index })
    }

    /// Get-or-build entry point: wraps [`open_or_build`] and returns a ready
    /// query context plus the build report for the caller to log.
    pub fn open_or_build(
        index_dir: &Path,
        docs_dir: &Path,
        chunking: &ChunkingConfig,
        embedder: E,
        metric: DistanceMetric,
    ) -> Result<(Self, OpenReport), SearchError> {
        let (index, report) = open_or_build(index_dir, docs_dir, chunking, &embedder, metric)?;
        Ok((Self { embedder, index }, report))
    }

    /// Embeds `query` and returns up to `k` chunks, best first under the
    /// index metric, each with its raw score.
    pub fn search(&self, query: &str, k: usize) -> Result<RetrievalResult, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let query_vector = self.embedder.embed(query);
        self.index.search(&query_vector, k)
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }
}

#[cfg(test)]
mod tests {
    use super::RetrievalContext;
    use crate::chunking::{ChunkingConfig, TextChunk};
    use crate::embeddings::HashedNgramEmbedder;
    use crate::error::SearchError;
    use crate::index::EmbeddingIndex;
    use crate::models::DistanceMetric;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn avas_scenario_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let docs_dir = dir.path().join("docs");
        let index_dir = dir.path().join("index");
        fs::create_dir_all(&docs_dir)?;
        fs::write(
            docs_dir.join("avas.txt"),
            "AVAS sound starts when moving in R starts",
        )?;

        let chunking = ChunkingConfig::new(150, 70).unwrap();
        let (context, report) = RetrievalContext::open_or_build(
            &index_dir,
            &docs_dir,
            &chunking,
            HashedNgramEmbedder::default(),
            DistanceMetric::Cosine,
        )?;
        assert!(report.rebuilt);

        let hits = context.search("reverse movement notification", 6)?;
        assert!(hits.iter().any(|hit| hit.text.contains("AVAS")));
        assert!(hits.len() <= 6);
        if hits.len() < 6 {
            assert!(context.index().len() < 6);
        }
        Ok(())
    }

    #[test]
    fn results_are_sorted_best_first() {
        let embedder = HashedNgramEmbedder { dimensions: 64 };
        let chunks: Vec<TextChunk> = [
            "AVAS acoustic signal in reverse gear",
            "cabin HVAC airflow distribution",
            "reverse movement audible notification for pedestrians",
        ]
        .iter()
        .map(|text| TextChunk {
            source_id: "regs.txt".to_string(),
            text: (*text).to_string(),
        })
        .collect();

        let index = EmbeddingIndex::build(&chunks, &embedder, DistanceMetric::Cosine);
        let context = RetrievalContext::new(embedder, index).unwrap();

        let hits = context.search("reverse movement notification", 3).unwrap();
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(hits[0].text.contains("reverse movement"));
    }

    #[test]
    fn empty_query_is_rejected() {
        let embedder = HashedNgramEmbedder { dimensions: 64 };
        let chunks = vec![TextChunk {
            source_id: "regs.txt".to_string(),
            text: "braking".to_string(),
        }];
        let index = EmbeddingIndex::build(&chunks, &embedder, DistanceMetric::Cosine);
        let context = RetrievalContext::new(embedder, index).unwrap();

        assert!(matches!(
            context.search("   ", 3),
            Err(SearchError::Request(_))
        ));
    }

    #[test]
    fn mismatched_embedder_is_rejected_at_construction() {
        let build_embedder = HashedNgramEmbedder { dimensions: 64 };
        let chunks = vec![TextChunk {
            source_id: "regs.txt".to_string(),
            text: "braking".to_string(),
        }];
        let index = EmbeddingIndex::build(&chunks, &build_embedder, DistanceMetric::Cosine);

        let other = HashedNgramEmbedder { dimensions: 32 };
        assert!(RetrievalContext::new(other, index).is_err());
    }
}
