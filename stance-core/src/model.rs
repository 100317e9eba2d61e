//! Shared data models for the analysis pipeline.
//!
//! Chunk descriptors, per-chunk outcomes, the final result and the progress
//! callback that reports on them.

use serde::{Deserialize, Serialize};

/// A contiguous, inclusive range of pages analyzed as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// 1-based chunk number
    pub index: usize,
    pub start_page: u32,
    pub end_page: u32,
}

impl ChunkDescriptor {
    pub fn pages(&self) -> std::ops::RangeInclusive<u32> {
        self.start_page..=self.end_page
    }
}

impl std::fmt::Display for ChunkDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "chunk {} (pages {}-{})",
            self.index, self.start_page, self.end_page
        )
    }
}

/// What analyzing one chunk produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Success { chunk_index: usize, summary: String },
    Failure { chunk_index: usize, message: String },
}

impl ChunkOutcome {
    pub fn summary(&self) -> Option<&str> {
        match self {
            ChunkOutcome::Success { summary, .. } => Some(summary),
            ChunkOutcome::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChunkOutcome::Success { .. })
    }
}

/// Final outcome of analyzing a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisResult {
    Success { summary: String },
    Failure { message: String },
}

impl AnalysisResult {
    pub fn summary(&self) -> Option<&str> {
        match self {
            AnalysisResult::Success { summary } => Some(summary),
            AnalysisResult::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success { .. })
    }
}

/// Full record of one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub thread_id: u64,
    pub result: AnalysisResult,
    /// One entry per planned chunk, in chunk order
    pub outcomes: Vec<ChunkOutcome>,
}

impl AnalysisReport {
    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Reported before a chunk starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkProgress {
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_page: u32,
    pub end_page: u32,
}

impl ChunkProgress {
    /// Fraction of chunks started, in `0.0..=1.0`
    pub fn fraction(&self) -> f32 {
        if self.total_chunks == 0 {
            return 1.0;
        }
        self.chunk_index as f32 / self.total_chunks as f32
    }
}

/// Receives one call per chunk, in chunk order
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: ChunkProgress);
}

impl<F> ProgressReporter for F
where
    F: Fn(ChunkProgress) + Send + Sync,
{
    fn report(&self, progress: ChunkProgress) {
        self(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_descriptor_display() {
        let chunk = ChunkDescriptor {
            index: 3,
            start_page: 9,
            end_page: 10,
        };
        assert_eq!(chunk.to_string(), "chunk 3 (pages 9-10)");
        assert_eq!(chunk.pages().collect::<Vec<_>>(), vec![9, 10]);
    }

    #[test]
    fn test_analysis_result_serialization() {
        let ok = AnalysisResult::Success {
            summary: "Most agree".to_string(),
        };
        let json = serde_json::to_string(&ok).unwrap();
        assert_eq!(json, r#"{"status":"success","summary":"Most agree"}"#);

        let parsed: AnalysisResult =
            serde_json::from_str(r#"{"status":"failure","message":"boom"}"#).unwrap();
        assert_eq!(parsed.summary(), None);
        assert!(!parsed.is_success());
    }

    #[test]
    fn test_closure_is_a_reporter() {
        let seen = std::sync::Mutex::new(Vec::new());
        let reporter = |p: ChunkProgress| seen.lock().unwrap().push(p.chunk_index);
        reporter.report(ChunkProgress {
            chunk_index: 1,
            total_chunks: 2,
            start_page: 1,
            end_page: 4,
        });
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_progress_fraction() {
        let progress = ChunkProgress {
            chunk_index: 1,
            total_chunks: 4,
            start_page: 1,
            end_page: 4,
        };
        assert!((progress.fraction() - 0.25).abs() < f32::EPSILON);
    }
}
