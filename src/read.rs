use crate::cigar::{CigarKind, CigarOp};
use log::debug;
use rust_htslib::bam::ext::BamRecordExtensions;
use rust_htslib::bam::record::{Aux, Cigar};
use rust_htslib::bam::{self, Read as _};
use std::fmt;
use std::io;
use std::path::Path;

/// Per-read tags carried into the output table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadTags {
    pub num_passes: Option<i64>,
    pub read_quality: Option<f64>,
    pub mate_cigar: Option<String>,
}

/// Renders an optional tag as `KEY:value`, or the not-available marker.
pub struct TagField<'a, T: fmt::Display>(pub &'a str, pub Option<&'a T>);

impl<T: fmt::Display> fmt::Display for TagField<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.1 {
            Some(value) => write!(f, "{}:{}", self.0, value),
            None => f.write_str(crate::NA),
        }
    }
}

impl ReadTags {
    pub fn num_passes_field(&self) -> String {
        TagField("NP", self.num_passes.as_ref()).to_string()
    }

    pub fn read_quality_field(&self) -> String {
        TagField("RQ", self.read_quality.as_ref()).to_string()
    }

    pub fn mate_cigar_field(&self) -> String {
        TagField("MC", self.mate_cigar.as_ref()).to_string()
    }

    fn from_record(record: &bam::Record) -> Self {
        let num_passes = match record.aux(b"np") {
            Ok(Aux::U8(v)) => Some(v as i64),
            Ok(Aux::I8(v)) => Some(v as i64),
            Ok(Aux::U16(v)) => Some(v as i64),
            Ok(Aux::I16(v)) => Some(v as i64),
            Ok(Aux::U32(v)) => Some(v as i64),
            Ok(Aux::I32(v)) => Some(v as i64),
            _ => None,
        };
        let read_quality = match record.aux(b"rq") {
            Ok(Aux::Float(v)) => Some(v as f64),
            Ok(Aux::Double(v)) => Some(v),
            _ => None,
        };
        let mate_cigar = match record.aux(b"mc").or_else(|_| record.aux(b"MC")) {
            Ok(Aux::String(v)) => Some(v.to_string()),
            _ => None,
        };
        ReadTags {
            num_passes,
            read_quality,
            mate_cigar,
        }
    }
}

/// Owned snapshot of one alignment record, safe to hand to any worker.
/// Reference coordinates are 0-based, end-exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRead {
    pub ref_chrom: String,
    pub ref_start: i64,
    pub ref_end: i64,
    pub query_name: String,
    pub query_sequence: Vec<u8>,
    pub cigar: Vec<CigarOp>,
    pub tags: ReadTags,
    pub is_secondary: bool,
    pub is_supplementary: bool,
}

impl AlignedRead {
    /// Flatten a record; returns `None` for records without a reference.
    pub fn from_record(record: &bam::Record, tid_to_name: &[String]) -> Option<Self> {
        let tid = record.tid();
        if record.is_unmapped() || tid < 0 || tid as usize >= tid_to_name.len() {
            return None;
        }

        Some(AlignedRead {
            ref_chrom: tid_to_name[tid as usize].clone(),
            ref_start: record.pos(),
            ref_end: record.reference_end(),
            query_name: String::from_utf8_lossy(record.qname()).into_owned(),
            query_sequence: record.seq().as_bytes(),
            cigar: record.cigar().iter().map(cigar_op_from_htslib).collect(),
            tags: ReadTags::from_record(record),
            is_secondary: record.is_secondary(),
            is_supplementary: record.is_supplementary(),
        })
    }

    pub fn is_primary(&self) -> bool {
        !self.is_secondary && !self.is_supplementary
    }
}

pub(crate) fn cigar_op_from_htslib(op: &Cigar) -> CigarOp {
    let kind = match op {
        Cigar::Match(_) => CigarKind::Match,
        Cigar::Ins(_) => CigarKind::Insertion,
        Cigar::Del(_) => CigarKind::Deletion,
        Cigar::RefSkip(_) => CigarKind::Skip,
        Cigar::SoftClip(_) => CigarKind::SoftClip,
        Cigar::HardClip(_) => CigarKind::HardClip,
        Cigar::Pad(_) => CigarKind::Pad,
        Cigar::Equal(_) => CigarKind::SequenceMatch,
        Cigar::Diff(_) => CigarKind::SequenceMismatch,
    };
    CigarOp::new(kind, op.len())
}

/// Ops for a textual CIGAR such as `5S90M`, parsed by htslib
#[cfg(test)]
pub(crate) fn parse_cigar_ops(
    cigar: &str,
) -> Result<Vec<CigarOp>, rust_htslib::errors::Error> {
    let parsed = bam::record::CigarString::try_from(cigar)?;
    Ok(parsed.iter().map(cigar_op_from_htslib).collect())
}

fn build_tid_lookup(header: &bam::HeaderView) -> Vec<String> {
    (0..header.target_count())
        .map(|tid| String::from_utf8_lossy(header.tid2name(tid)).into_owned())
        .collect()
}

/// Drain an alignment file into owned reads, skipping unmapped records.
pub fn read_alignments(path: &Path) -> io::Result<Vec<AlignedRead>> {
    let mut reader = bam::Reader::from_path(path).map_err(|e| {
        io::Error::other(format!(
            "Failed to open alignment file '{}': {e}",
            path.display()
        ))
    })?;
    let tid_to_name = build_tid_lookup(reader.header());

    let mut reads = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to read record from '{}': {e}", path.display()),
            )
        })?;
        match AlignedRead::from_record(&record, &tid_to_name) {
            Some(read) => reads.push(read),
            None => skipped += 1,
        }
    }

    debug!(
        "Loaded {} reads from {} ({} unmapped skipped)",
        reads.len(),
        path.display(),
        skipped
    );
    Ok(reads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_fields() {
        let tags = ReadTags {
            num_passes: Some(12),
            read_quality: Some(0.99),
            mate_cigar: None,
        };
        assert_eq!(tags.num_passes_field(), "NP:12");
        assert_eq!(tags.read_quality_field(), "RQ:0.99");
        assert_eq!(tags.mate_cigar_field(), "NA");
    }

    #[test]
    fn test_htslib_cigar_conversion() {
        let op = cigar_op_from_htslib(&Cigar::SoftClip(7));
        assert_eq!(op, CigarOp::new(CigarKind::SoftClip, 7));
        let op = cigar_op_from_htslib(&Cigar::Diff(2));
        assert_eq!(op, CigarOp::new(CigarKind::SequenceMismatch, 2));
    }
}
