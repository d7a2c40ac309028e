//! Terminal result records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::quality::Quality;

/// Per-quality compression outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityStat {
    pub quality: Quality,
    /// Encoded file size in bytes
    pub size: u64,
    /// Wall-clock transcode time in milliseconds
    pub elapsed_ms: u64,
}

/// Aggregate stats for a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStats {
    /// Source size in bytes
    pub original_size: u64,
    /// Primary-quality (highest produced) output size in bytes
    pub compressed_size: u64,
    /// original / compressed
    pub compression_ratio: f64,
    /// Source duration in seconds
    pub duration: f64,
    /// Total wall-clock processing time in milliseconds
    pub processing_time_ms: u64,
    /// Per-quality breakdown
    pub qualities: Vec<QualityStat>,
}

impl JobStats {
    pub fn compression_ratio(original: u64, compressed: u64) -> f64 {
        if compressed == 0 {
            0.0
        } else {
            original as f64 / compressed as f64
        }
    }
}

/// Terminal success record. Written once by `finalize`; immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Absolute URL per produced quality
    pub compressed: BTreeMap<Quality, String>,
    /// Absolute URL per segmented HLS variant
    pub hls_variants: BTreeMap<Quality, String>,
    /// Master playlist URL, present when at least one variant segmented
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_master: Option<String>,
    /// WebP thumbnail URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub stats: JobStats,
}

impl JobResult {
    /// The highest quality that was actually produced.
    pub fn primary_quality(&self) -> Option<Quality> {
        Quality::ALL.iter().copied().find(|q| self.compressed.contains_key(q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_handles_zero() {
        assert_eq!(JobStats::compression_ratio(100, 0), 0.0);
        assert!((JobStats::compression_ratio(100, 25) - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn primary_quality_is_highest_produced() {
        let mut compressed = BTreeMap::new();
        compressed.insert(Quality::Q360, "u1".to_string());
        compressed.insert(Quality::Q144, "u2".to_string());

        let result = JobResult {
            compressed,
            hls_variants: BTreeMap::new(),
            hls_master: None,
            thumbnail: None,
            stats: JobStats {
                original_size: 1,
                compressed_size: 1,
                compression_ratio: 1.0,
                duration: 1.0,
                processing_time_ms: 1,
                qualities: Vec::new(),
            },
        };
        assert_eq!(result.primary_quality(), Some(Quality::Q360));
    }
}
