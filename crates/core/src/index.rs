use crate::chunking::{chunk_documents, ChunkingConfig, TextChunk};
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::loader::{load_documents_from_dir, SkippedFile};
use crate::models::{DistanceMetric, IndexedChunk, ScoredSegment};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use uuid::Uuid;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";
const VECTORS_FILE: &str = "vectors.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexManifest {
    format_version: u32,
    build_id: Uuid,
    built_at: DateTime<Utc>,
    dimensions: usize,
    metric: DistanceMetric,
    chunk_count: usize,
    integrity: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkFile {
    chunks: Vec<IndexedChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorFile {
    dimensions: usize,
    /// Base64 of the row-major little-endian f32 matrix.
    data: String,
}

/// What `open_or_build` did and what the ingestion scan surfaced, so the
/// caller can log skip-and-warn notices.
#[derive(Debug, Default)]
pub struct OpenReport {
    pub rebuilt: bool,
    pub document_count: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Similarity-searchable store of embedded chunks. Append-only during
/// `build`, immutable afterwards; safe to share across concurrent readers.
pub struct EmbeddingIndex {
    build_id: Uuid,
    built_at: DateTime<Utc>,
    dimensions: usize,
    metric: DistanceMetric,
    chunks: Vec<IndexedChunk>,
    vectors: Vec<f32>,
}

impl EmbeddingIndex {
    /// Embeds every chunk and assembles the in-memory index. Chunk ids are
    /// assigned sequentially starting at 1 and stay stable for the lifetime
    /// of this build.
    pub fn build(
        chunks: &[TextChunk],
        embedder: &dyn Embedder,
        metric: DistanceMetric,
    ) -> Self {
        let dimensions = embedder.dimensions();
        let mut indexed = Vec::with_capacity(chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len() * dimensions);

        for (position, chunk) in chunks.iter().enumerate() {
            indexed.push(IndexedChunk {
                chunk_id: position as u64 + 1,
                source_id: chunk.source_id.clone(),
                text: chunk.text.clone(),
            });
            vectors.extend(embedder.embed(&chunk.text));
        }

        Self {
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
            dimensions,
            metric,
            chunks: indexed,
            vectors,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Writes the index into `dir` as a manifest plus parallel chunk and
    /// vector stores. The files are staged in a temporary sibling directory
    /// and renamed into place, so a crash never leaves a partial index where
    /// a loadable one is expected.
    pub fn persist(&self, dir: &Path) -> Result<(), SearchError> {
        let chunk_payload = serde_json::to_vec_pretty(&ChunkFile {
            chunks: self.chunks.clone(),
        })?;
        let vector_payload = serde_json::to_vec_pretty(&VectorFile {
            dimensions: self.dimensions,
            data: STANDARD.encode(pack_f32(&self.vectors)),
        })?;

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            build_id: self.build_id,
            built_at: self.built_at,
            dimensions: self.dimensions,
            metric: self.metric,
            chunk_count: self.chunks.len(),
            integrity: integrity_digest(&chunk_payload, &vector_payload),
        };

        let staging = dir.with_extension(format!("tmp-{}", self.build_id));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        fs::write(staging.join(CHUNKS_FILE), &chunk_payload)?;
        fs::write(staging.join(VECTORS_FILE), &vector_payload)?;
        fs::write(
            staging.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )?;

        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::rename(&staging, dir)?;
        Ok(())
    }

    /// Loads a previously persisted index. A missing directory or manifest
    /// is `IndexNotFound`; anything unreadable, inconsistent, or failing the
    /// integrity digest is `IndexCorrupt`.
    pub fn load(dir: &Path) -> Result<Self, SearchError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(SearchError::IndexNotFound(dir.to_path_buf()));
        }

        let corrupt = |details: String| SearchError::IndexCorrupt {
            path: dir.to_path_buf(),
            details,
        };

        let manifest_bytes =
            fs::read(&manifest_path).map_err(|error| corrupt(format!("manifest: {error}")))?;
        let manifest: IndexManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|error| corrupt(format!("manifest: {error}")))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }

        let chunk_payload = fs::read(dir.join(CHUNKS_FILE))
            .map_err(|error| corrupt(format!("chunk store: {error}")))?;
        let vector_payload = fs::read(dir.join(VECTORS_FILE))
            .map_err(|error| corrupt(format!("vector store: {error}")))?;

        if integrity_digest(&chunk_payload, &vector_payload) != manifest.integrity {
            return Err(corrupt("integrity digest mismatch".to_string()));
        }

        let chunk_file: ChunkFile = serde_json::from_slice(&chunk_payload)
            .map_err(|error| corrupt(format!("chunk store: {error}")))?;
        let vector_file: VectorFile = serde_json::from_slice(&vector_payload)
            .map_err(|error| corrupt(format!("vector store: {error}")))?;

        if vector_file.dimensions != manifest.dimensions {
            return Err(corrupt(format!(
                "vector store dimension {} disagrees with manifest {}",
                vector_file.dimensions, manifest.dimensions
            )));
        }
        if chunk_file.chunks.len() != manifest.chunk_count {
            return Err(corrupt(format!(
                "chunk store holds {} chunks, manifest says {}",
                chunk_file.chunks.len(),
                manifest.chunk_count
            )));
        }

        let raw = STANDARD
            .decode(vector_file.data.as_bytes())
            .map_err(|error| corrupt(format!("vector blob: {error}")))?;
        let vectors =
            unpack_f32(&raw).ok_or_else(|| corrupt("vector blob length not a multiple of 4".to_string()))?;

        if vectors.len() != manifest.chunk_count * manifest.dimensions {
            return Err(corrupt(format!(
                "vector matrix holds {} values, expected {}",
                vectors.len(),
                manifest.chunk_count * manifest.dimensions
            )));
        }

        Ok(Self {
            build_id: manifest.build_id,
            built_at: manifest.built_at,
            dimensions: manifest.dimensions,
            metric: manifest.metric,
            chunks: chunk_file.chunks,
            vectors,
        })
    }

    /// Nearest-neighbor scan over all chunk vectors. Results come back best
    /// first under the index metric; fewer than `k` only when the index is
    /// smaller than `k`.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredSegment>, SearchError> {
        if self.chunks.is_empty() {
            return Err(SearchError::EmptyIndex);
        }
        if query_vector.len() != self.dimensions {
            return Err(SearchError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<ScoredSegment> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(row, chunk)| {
                let vector = &self.vectors[row * self.dimensions..(row + 1) * self.dimensions];
                let score = match self.metric {
                    DistanceMetric::Cosine => cosine_similarity(query_vector, vector),
                    DistanceMetric::Euclidean => euclidean_distance(query_vector, vector),
                };
                ScoredSegment {
                    chunk_id: chunk.chunk_id,
                    source_id: chunk.source_id.clone(),
                    text: chunk.text.clone(),
                    score,
                }
            })
            .collect();

        if self.metric.higher_is_better() {
            scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        } else {
            scored.sort_by(|left, right| left.score.total_cmp(&right.score));
        }

        scored.truncate(k);
        Ok(scored)
    }
}

/// Get-or-build: load the persisted index at `index_dir` if one is there,
/// otherwise scan `docs_dir`, build, persist, and load the result back so
/// both paths exercise the same deserialization code. A corrupt persisted
/// index (including one built with a different embedding dimension) falls
/// back to a fresh build.
pub fn open_or_build(
    index_dir: &Path,
    docs_dir: &Path,
    chunking: &ChunkingConfig,
    embedder: &dyn Embedder,
    metric: DistanceMetric,
) -> Result<(EmbeddingIndex, OpenReport), SearchError> {
    match EmbeddingIndex::load(index_dir) {
        Ok(index) if index.dimensions() == embedder.dimensions() => {
            return Ok((index, OpenReport::default()));
        }
        Ok(_) | Err(SearchError::IndexNotFound(_)) | Err(SearchError::IndexCorrupt { .. }) => {}
        Err(error) => return Err(error),
    }

    let report = load_documents_from_dir(docs_dir);
    if report.documents.is_empty() {
        return Err(SearchError::NoDocumentsAvailable(docs_dir.to_path_buf()));
    }

    let chunks = chunk_documents(&report.documents, chunking);
    EmbeddingIndex::build(&chunks, embedder, metric).persist(index_dir)?;
    let index = EmbeddingIndex::load(index_dir)?;

    Ok((
        index,
        OpenReport {
            rebuilt: true,
            document_count: report.documents.len(),
            skipped: report.skipped,
        },
    ))
}

fn pack_f32(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn unpack_f32(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|quad| f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
            .collect(),
    )
}

fn integrity_digest(chunk_payload: &[u8], vector_payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk_payload);
    hasher.update(vector_payload);
    format!("{:x}", hasher.finalize())
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_mag: f32 = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_mag: f32 = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_mag == 0.0 || right_mag == 0.0 {
        return 0.0;
    }
    dot / (left_mag * right_mag)
}

fn euclidean_distance(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        .sqrt()
}
