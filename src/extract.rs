//! Per-read sequence extraction and its parallel driver
//!
//! Every read is an independent unit of work: it is matched against the region
//! index, projected through its CIGAR, and sliced. Anomalies never abort a
//! sample; they turn into not-available records and are tallied for the log.

use crate::cigar::{project, ProjectedOffsets, ProjectionError};
use crate::read::{AlignedRead, ReadTags};
use crate::region::{Region, RegionIndex};
use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::io;

/// One read (or reference pseudo-read) against one region
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRecord {
    pub region_id: String,
    pub read_name: String,
    pub tags: ReadTags,
    pub sequence: Option<String>,
    pub sequence_with_padding: Option<String>,
}

impl ExtractionRecord {
    pub fn len_sequence(&self) -> Option<usize> {
        self.sequence.as_ref().map(|s| s.len())
    }

    pub fn len_sequence_with_padding(&self) -> Option<usize> {
        self.sequence_with_padding.as_ref().map(|s| s.len())
    }

    /// Join key against repeat-detector matches
    pub fn composite_id(&self) -> String {
        composite_id(&self.read_name, &self.region_id)
    }
}

pub fn composite_id(read_name: &str, region_id: &str) -> String {
    format!("{read_name}_{region_id}")
}

/// Slices cut out of a read for one region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledSequence {
    pub sequence: String,
    pub sequence_with_padding: String,
}

/// Cut `[start, end)` and `[padded_start, padded_end)` out of `raw`.
///
/// Offsets past the end of the sequence are clamped to its length, and a start
/// beyond its end yields an empty slice. Returns `None` if any offset is missing.
pub fn assemble(offsets: &ProjectedOffsets, raw: &[u8]) -> Option<AssembledSequence> {
    let slice = |start: usize, end: usize| {
        let end = end.min(raw.len());
        let start = start.min(end);
        String::from_utf8_lossy(&raw[start..end]).into_owned()
    };

    Some(AssembledSequence {
        sequence: slice(offsets.start?, offsets.end?),
        sequence_with_padding: slice(offsets.padded_start?, offsets.padded_end?),
    })
}

/// Why a spanning read produced a not-available record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    Projection(ProjectionError),
    OffsetNotFound,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyCounts {
    pub hard_clipped: usize,
    pub unsupported_operation: usize,
    pub offset_not_found: usize,
}

impl AnomalyCounts {
    fn add(&mut self, anomaly: &Anomaly) {
        match anomaly {
            Anomaly::Projection(ProjectionError::HardClip) => self.hard_clipped += 1,
            Anomaly::Projection(ProjectionError::UnsupportedOperation(_)) => {
                self.unsupported_operation += 1
            }
            Anomaly::OffsetNotFound => self.offset_not_found += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.hard_clipped + self.unsupported_operation + self.offset_not_found
    }
}

/// Records produced by a single read
#[derive(Debug, Default)]
pub struct ReadExtraction {
    pub records: Vec<ExtractionRecord>,
    pub anomalies: Vec<(String, Anomaly)>,
}

fn extract_region(
    read: &AlignedRead,
    region: &Region,
    window: i64,
) -> Result<AssembledSequence, Anomaly> {
    let offsets = project(&read.cigar, region.start, region.end, read.ref_start, window)
        .map_err(Anomaly::Projection)?;
    assemble(&offsets, &read.query_sequence).ok_or(Anomaly::OffsetNotFound)
}

/// Extract every region `read` fully spans. Secondary and supplementary
/// alignments still produce a record per region, without sequence.
pub fn extract_read(read: &AlignedRead, index: &RegionIndex, window: i64) -> ReadExtraction {
    let mut extraction = ReadExtraction::default();

    for region in index.spanned_regions(&read.ref_chrom, read.ref_start, read.ref_end, window) {
        let assembled = if read.is_primary() {
            match extract_region(read, region, window) {
                Ok(assembled) => Some(assembled),
                Err(anomaly) => {
                    extraction.anomalies.push((region.id.clone(), anomaly));
                    None
                }
            }
        } else {
            None
        };

        let (sequence, sequence_with_padding) = match assembled {
            Some(a) => (Some(a.sequence), Some(a.sequence_with_padding)),
            None => (None, None),
        };
        extraction.records.push(ExtractionRecord {
            region_id: region.id.clone(),
            read_name: read.query_name.clone(),
            tags: read.tags.clone(),
            sequence,
            sequence_with_padding,
        });
    }

    extraction
}

/// Flattened extraction result for one sample
#[derive(Debug, Default)]
pub struct SampleExtraction {
    pub records: Vec<ExtractionRecord>,
    pub anomalies: AnomalyCounts,
}

/// Fans reads out over a dedicated worker pool
pub struct ExtractionCoordinator {
    pool: ThreadPool,
    window: i64,
}

impl ExtractionCoordinator {
    pub fn new(num_threads: usize, window: i64) -> io::Result<Self> {
        if window < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Window must be non-negative, got {window}"),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| io::Error::other(format!("Failed to build thread pool: {e}")))?;
        Ok(ExtractionCoordinator { pool, window })
    }

    /// Run `f` inside the coordinator's pool
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    /// Extract all reads of a sample. Output follows input read order.
    pub fn extract_sample(
        &self,
        sample: &str,
        reads: &[AlignedRead],
        index: &RegionIndex,
    ) -> SampleExtraction {
        let window = self.window;
        let per_read: Vec<ReadExtraction> = self.pool.install(|| {
            reads
                .par_iter()
                .map(|read| extract_read(read, index, window))
                .collect()
        });

        let mut result = SampleExtraction::default();
        for (read, extraction) in reads.iter().zip(per_read) {
            for (region_id, anomaly) in &extraction.anomalies {
                debug!(
                    "{sample}: read {} at {region_id}: {anomaly:?}",
                    read.query_name
                );
                result.anomalies.add(anomaly);
            }
            result.records.extend(extraction.records);
        }

        if result.anomalies.total() > 0 {
            warn!(
                "{sample}: {} spanning reads without sequence (hard clipped: {}, unknown cigar term: {}, offset not found: {})",
                result.anomalies.total(),
                result.anomalies.hard_clipped,
                result.anomalies.unsupported_operation,
                result.anomalies.offset_not_found
            );
        }
        info!(
            "{sample}: {} records extracted from {} reads",
            result.records.len(),
            reads.len()
        );
        result
    }
}
