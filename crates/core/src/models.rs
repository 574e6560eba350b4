use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized source document, produced by the loader and consumed by the
/// chunker. Not persisted beyond the index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    pub source_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub source_id: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

/// The atomic unit stored in the embedding index. The embedding row itself
/// lives in the index's vector matrix, keyed by position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexedChunk {
    pub chunk_id: u64,
    pub source_id: String,
    pub text: String,
}

/// One retrieval hit: chunk text plus its raw similarity/distance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredSegment {
    pub chunk_id: u64,
    pub source_id: String,
    pub text: String,
    pub score: f32,
}

pub type RetrievalResult = Vec<ScoredSegment>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
}

impl DistanceMetric {
    /// Whether a larger score means a better hit under this metric.
    pub fn higher_is_better(self) -> bool {
        matches!(self, DistanceMetric::Cosine)
    }
}

/// Certified vehicle systems the regulation corpus covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RegulationObject {
    Braking,
    #[serde(rename = "AVAS")]
    Avas,
    #[serde(rename = "Wipe and wash")]
    WipeAndWash,
    #[serde(rename = "HVAC")]
    Hvac,
    #[serde(rename = "Brake assist")]
    BrakeAssist,
}

/// Outcome classes of the typed compliance check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckType {
    /// Type 0: system not among certified objects, no check needed.
    #[serde(rename = "0")]
    NotCertifiedObject,
    /// Type 1: certified objects mentioned, regulations met.
    #[serde(rename = "1")]
    RegulationsMet,
    /// Type 2: critical regulatory restrictions missing from the use case.
    #[serde(rename = "2")]
    SupplementNeeded,
    /// Type 3: requirements contradict the regulations.
    #[serde(rename = "3")]
    ContradictsRegulations,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStanding {
    Compliant,
    NonCompliant,
}

/// Which response schema the classifier is asked for and validated against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierScheme {
    TypedCheck,
    VerdictCheck,
}

/// Structured verdict returned by the compliance classifier. The variant is
/// fixed by the configured [`ClassifierScheme`]; each variant's field set is
/// validated when the model response is parsed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ComplianceVerdict {
    TypedCheck {
        object: Option<RegulationObject>,
        check_type: CheckType,
        comment: Option<String>,
    },
    VerdictCheck {
        object: Option<RegulationObject>,
        verdict: ComplianceStanding,
        comment: Option<String>,
    },
}

/// Knobs of the query-time pipeline: how many candidates to retrieve and,
/// when a reranker is enabled, how many survivors to pass to the classifier.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub keep_top: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 6,
            keep_top: 2,
        }
    }
}
