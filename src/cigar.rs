//! Projection of reference coordinates onto read-sequence offsets
//!
//! The walk runs over the run-length encoded operations directly, tracking how
//! many reference and read bases have been consumed so far.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarKind {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Pad,
    SequenceMatch,
    SequenceMismatch,
}

impl CigarKind {
    pub fn as_char(&self) -> char {
        match self {
            CigarKind::Match => 'M',
            CigarKind::Insertion => 'I',
            CigarKind::Deletion => 'D',
            CigarKind::Skip => 'N',
            CigarKind::SoftClip => 'S',
            CigarKind::HardClip => 'H',
            CigarKind::Pad => 'P',
            CigarKind::SequenceMatch => '=',
            CigarKind::SequenceMismatch => 'X',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len: u32,
}

impl CigarOp {
    pub fn new(kind: CigarKind, len: u32) -> Self {
        CigarOp { kind, len }
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.kind.as_char())
    }
}

/// Reasons a read cannot be projected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// Hard-clipped bases are absent from the stored sequence
    HardClip,
    /// Operation the walk does not know how to follow
    UnsupportedOperation(CigarKind),
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionError::HardClip => {
                write!(f, "alignment is hard clipped, actual sequence unavailable")
            }
            ProjectionError::UnsupportedOperation(kind) => {
                write!(f, "unknown term in cigar string: {}", kind.as_char())
            }
        }
    }
}

impl std::error::Error for ProjectionError {}

/// Read-sequence offsets for a region, with and without flanks.
/// `None` means the walk never reached that reference position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectedOffsets {
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub padded_start: Option<usize>,
    pub padded_end: Option<usize>,
}

impl ProjectedOffsets {
    pub fn is_complete(&self) -> bool {
        self.start.is_some()
            && self.end.is_some()
            && self.padded_start.is_some()
            && self.padded_end.is_some()
    }
}

#[derive(Clone, Copy)]
enum Boundary {
    // Offset of the read base aligned to the target reference base
    Leading,
    // Offset just past the read base aligned to the base before the target
    Trailing,
}

struct Target {
    ref_offset: i64,
    boundary: Boundary,
    found: Option<usize>,
}

impl Target {
    fn new(ref_offset: i64, boundary: Boundary) -> Self {
        // A trailing boundary at the very first base has no preceding base.
        let boundary = if ref_offset == 0 {
            Boundary::Leading
        } else {
            boundary
        };
        Target {
            ref_offset,
            boundary,
            found: None,
        }
    }

    fn visit(&mut self, ref_consumed: i64, raw_consumed: usize, run: i64, consumes_read: bool) {
        if self.found.is_some() || self.ref_offset < 0 {
            return;
        }
        let delta = self.ref_offset - ref_consumed;
        let inside = match self.boundary {
            Boundary::Leading => (0..run).contains(&delta),
            Boundary::Trailing => delta > 0 && delta <= run,
        };
        if inside {
            let step = if consumes_read { delta as usize } else { 0 };
            self.found = Some(raw_consumed + step);
        }
    }
}

/// Walk `ops` to find where `[start, end)` and `[start - window, end + window)`
/// land in the stored read sequence of an alignment starting at `ref_start`.
///
/// Insertions at either boundary are left outside the slice. Deletions covering
/// a boundary resolve to the next read base.
pub fn project(
    ops: &[CigarOp],
    start: i64,
    end: i64,
    ref_start: i64,
    window: i64,
) -> Result<ProjectedOffsets, ProjectionError> {
    let mut targets = [
        Target::new(start - ref_start, Boundary::Leading),
        Target::new(end - ref_start, Boundary::Trailing),
        Target::new(start - window - ref_start, Boundary::Leading),
        Target::new(end + window - ref_start, Boundary::Trailing),
    ];

    let mut ref_consumed: i64 = 0;
    let mut raw_consumed: usize = 0;

    for op in ops {
        if targets.iter().all(|t| t.found.is_some()) {
            break;
        }
        let run = op.len as usize;
        match op.kind {
            CigarKind::Match | CigarKind::SequenceMatch | CigarKind::SequenceMismatch => {
                for target in targets.iter_mut() {
                    target.visit(ref_consumed, raw_consumed, run as i64, true);
                }
                ref_consumed += run as i64;
                raw_consumed += run;
            }
            CigarKind::Deletion => {
                for target in targets.iter_mut() {
                    target.visit(ref_consumed, raw_consumed, run as i64, false);
                }
                ref_consumed += run as i64;
            }
            CigarKind::Insertion | CigarKind::SoftClip => raw_consumed += run,
            CigarKind::HardClip => return Err(ProjectionError::HardClip),
            kind => return Err(ProjectionError::UnsupportedOperation(kind)),
        }
    }

    Ok(ProjectedOffsets {
        start: targets[0].found,
        end: targets[1].found,
        padded_start: targets[2].found,
        padded_end: targets[3].found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(cigar: &str) -> Vec<CigarOp> {
        crate::read::parse_cigar_ops(cigar).unwrap()
    }

    #[test]
    fn test_all_match_offsets() {
        let offsets = project(&ops("300M"), 100, 200, 50, 10).unwrap();
        assert_eq!(offsets.start, Some(50));
        assert_eq!(offsets.end, Some(150));
        assert_eq!(offsets.padded_start, Some(40));
        assert_eq!(offsets.padded_end, Some(160));
    }

    #[test]
    fn test_sequence_match_and_mismatch_behave_like_match() {
        let offsets = project(&ops("100=1X199="), 100, 200, 50, 10).unwrap();
        assert_eq!(offsets, project(&ops("300M"), 100, 200, 50, 10).unwrap());
    }

    #[test]
    fn test_soft_clip_shifts_offsets() {
        let offsets = project(&ops("20S300M5S"), 100, 200, 50, 10).unwrap();
        assert_eq!(offsets.start, Some(70));
        assert_eq!(offsets.end, Some(170));
        assert_eq!(offsets.padded_start, Some(60));
        assert_eq!(offsets.padded_end, Some(180));
    }

    #[test]
    fn test_insertion_inside_region_lengthens_slice() {
        // 60M covers reference 50..110, the insertion sits inside the region
        let offsets = project(&ops("60M7I240M"), 100, 200, 50, 10).unwrap();
        assert_eq!(offsets.start, Some(50));
        assert_eq!(offsets.end, Some(157));
        assert_eq!(offsets.padded_start, Some(40));
        assert_eq!(offsets.padded_end, Some(167));
    }

    #[test]
    fn test_deletion_inside_region_shortens_slice() {
        let offsets = project(&ops("60M5D240M"), 100, 200, 50, 10).unwrap();
        assert_eq!(offsets.start, Some(50));
        assert_eq!(offsets.end, Some(145));
        assert_eq!(offsets.padded_end.unwrap() - offsets.padded_start.unwrap(), 115);
    }

    #[test]
    fn test_insertions_at_boundaries_are_excluded() {
        // Reference 0..50 then 4 inserted bases then the region starting at 50
        let offsets = project(&ops("50M4I50M4I50M"), 50, 100, 0, 0).unwrap();
        assert_eq!(offsets.start, Some(54));
        assert_eq!(offsets.end, Some(104));
    }

    #[test]
    fn test_deletion_over_boundary_resolves_to_next_base() {
        let offsets = project(&ops("45M10D100M"), 50, 100, 0, 0).unwrap();
        assert_eq!(offsets.start, Some(45));
        assert_eq!(offsets.end, Some(90));
    }

    #[test]
    fn test_region_at_alignment_start() {
        let offsets = project(&ops("3S100M"), 0, 10, 0, 0).unwrap();
        assert_eq!(offsets.start, Some(3));
        assert_eq!(offsets.end, Some(13));
        assert_eq!(offsets.padded_start, Some(3));
    }

    #[test]
    fn test_unreached_targets_are_not_found() {
        let offsets = project(&ops("100M"), 60, 120, 0, 10).unwrap();
        assert_eq!(offsets.start, Some(60));
        assert_eq!(offsets.end, None);
        assert_eq!(offsets.padded_end, None);
        assert!(!offsets.is_complete());

        let before = project(&ops("100M"), 5, 20, 0, 10).unwrap();
        assert_eq!(before.padded_start, None);
        assert_eq!(before.start, Some(5));
    }

    #[test]
    fn test_hard_clip_is_reported() {
        assert_eq!(
            project(&ops("5H300M"), 100, 200, 50, 10),
            Err(ProjectionError::HardClip)
        );
    }

    #[test]
    fn test_unsupported_operation_aborts_walk() {
        assert_eq!(
            project(&ops("10M100N200M"), 100, 200, 50, 10),
            Err(ProjectionError::UnsupportedOperation(CigarKind::Skip))
        );
    }

    #[test]
    fn test_walk_stops_once_all_targets_found() {
        // The trailing hard clip is never reached
        let offsets = project(&ops("300M5H"), 100, 200, 50, 10).unwrap();
        assert!(offsets.is_complete());
    }

    #[test]
    fn test_ops_from_text() {
        assert_eq!(
            ops("5S10M2D"),
            vec![
                CigarOp::new(CigarKind::SoftClip, 5),
                CigarOp::new(CigarKind::Match, 10),
                CigarOp::new(CigarKind::Deletion, 2),
            ]
        );
        let text: String = ops("5S10M2D").iter().map(|op| op.to_string()).collect();
        assert_eq!(text, "5S10M2D");
        assert!(crate::read::parse_cigar_ops("10Q").is_err());
    }
}
