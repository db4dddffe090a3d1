//! Reference baseline: the same extraction schema filled from the genome itself
//!
//! For each region the padded interval is requested from a [`SequenceSlicer`],
//! and the unpadded sequence is obtained by trimming the flanks back off.

use crate::extract::ExtractionRecord;
use crate::faidx::ReferenceFasta;
use crate::read::ReadTags;
use crate::region::Region;
use crate::tools::{Invocation, ToolError, ToolRunner};
use log::{info, warn};
use regex::Regex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Read name of the reference pseudo-sample
pub const REFERENCE_SAMPLE: &str = "reference";

/// A 0-based, end-exclusive interval to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRequest {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
}

impl SliceRequest {
    /// 1-based inclusive `chrom:start-end` form used in slicer headers
    pub fn to_region_string(&self) -> String {
        format!("{}:{}-{}", self.chrom, self.start + 1, self.end)
    }
}

/// One header plus its concatenated sequence lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicedBlock {
    pub header: String,
    pub sequence: String,
}

/// Fetches reference sequence for a batch of intervals, one block per request,
/// in request order.
pub trait SequenceSlicer {
    fn slice(&self, requests: &[SliceRequest]) -> io::Result<Vec<SlicedBlock>>;
}

impl SequenceSlicer for ReferenceFasta {
    fn slice(&self, requests: &[SliceRequest]) -> io::Result<Vec<SlicedBlock>> {
        requests
            .iter()
            .map(|request| {
                let end = match self.get_sequence_length(&request.chrom) {
                    Ok(len) => (request.end as usize).min(len),
                    Err(_) => request.end as usize,
                };
                let sequence = self.fetch_sequence(&request.chrom, request.start as usize, end)?;
                Ok(SlicedBlock {
                    header: request.to_region_string(),
                    sequence: String::from_utf8_lossy(&sequence).into_owned(),
                })
            })
            .collect()
    }
}

/// Slices through `samtools faidx -r`
pub struct SamtoolsSlicer<'a> {
    pub runner: &'a dyn ToolRunner,
    pub samtools: String,
    pub reference: PathBuf,
    pub work_dir: PathBuf,
}

impl SequenceSlicer for SamtoolsSlicer<'_> {
    fn slice(&self, requests: &[SliceRequest]) -> io::Result<Vec<SlicedBlock>> {
        let regions_file = self.work_dir.join("bed_file_reformatted.txt");
        let mut writer = BufWriter::new(File::create(&regions_file)?);
        for request in requests {
            writeln!(writer, "{}", request.to_region_string())?;
        }
        writer.flush()?;

        let invocation = Invocation::new(&self.samtools)
            .arg("faidx")
            .arg("-r")
            .arg(&regions_file)
            .arg(&self.reference);
        let output = self.runner.run(&invocation)?;
        if output.stdout.is_empty() && !requests.is_empty() {
            return Err(ToolError::EmptyOutput {
                command: invocation.to_string(),
            }
            .into());
        }
        Ok(parse_sliced_blocks(&output.stdout_text()))
    }
}

/// Split slicer output into header blocks, concatenating wrapped sequence lines
pub fn parse_sliced_blocks(text: &str) -> Vec<SlicedBlock> {
    let mut blocks: Vec<SlicedBlock> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if let Some(header) = line.strip_prefix('>') {
            blocks.push(SlicedBlock {
                header: header.to_string(),
                sequence: String::new(),
            });
        } else if let Some(block) = blocks.last_mut() {
            block.sequence.push_str(line);
        }
    }
    blocks
}

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"^(.+):(\d+)-(\d+)$").expect("valid header pattern"))
}

/// Parse a `chrom:start-end` header back into its parts
pub fn parse_region_header(header: &str) -> Option<(String, i64, i64)> {
    let caps = header_regex().captures(header)?;
    Some((
        caps[1].to_string(),
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// The padded interval to request for `region`; the left flank stops at 0.
pub fn padded_request(region: &Region, window: i64) -> SliceRequest {
    SliceRequest {
        chrom: region.chrom.clone(),
        start: (region.start - window).max(0),
        end: region.end + window,
    }
}

/// Build one reference record per region, in region order.
pub fn extract_reference(
    regions: &[Region],
    window: i64,
    slicer: &dyn SequenceSlicer,
) -> io::Result<Vec<ExtractionRecord>> {
    let requests: Vec<SliceRequest> = regions.iter().map(|r| padded_request(r, window)).collect();
    let blocks = slicer.slice(&requests)?;
    if blocks.len() != requests.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Reference slicer returned {} blocks for {} regions",
                blocks.len(),
                requests.len()
            ),
        ));
    }

    let records: Vec<ExtractionRecord> = regions
        .iter()
        .zip(requests.iter())
        .zip(blocks)
        .map(|((region, request), block)| {
            match parse_region_header(&block.header) {
                Some((chrom, start, end))
                    if chrom == request.chrom
                        && start == request.start + 1
                        && end == request.end => {}
                _ => warn!(
                    "Reference block '{}' does not match requested {}",
                    block.header,
                    request.to_region_string()
                ),
            }

            // Flanks can come back short at either chromosome end
            let padded = block.sequence;
            let expected_len = (request.end - request.start) as usize;
            let missing = expected_len.saturating_sub(padded.len());
            let right = (window as usize).saturating_sub(missing);
            let end = padded.len().saturating_sub(right);
            let start = ((region.start - request.start) as usize).min(end);
            let sequence = padded[start..end].to_string();

            ExtractionRecord {
                region_id: region.id.clone(),
                read_name: REFERENCE_SAMPLE.to_string(),
                tags: ReadTags::default(),
                sequence: Some(sequence),
                sequence_with_padding: Some(padded),
            }
        })
        .collect();

    info!("Reference sequences extracted for {} regions", records.len());
    Ok(records)
}
