//! Region list parsing and spanning-read lookup
//!
//! Regions are grouped per chromosome into an interval tree. Chromosome keys are
//! normalized with the `chr` prefix so that region files and alignments that
//! disagree on naming still meet, while region ids keep the name as written.

use coitrees::{BasicCOITree, Interval, IntervalTree};
use log::{debug, info};
use noodles::bgzf;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

const CHROM_PREFIX: &str = "chr";

/// A genomic interval of interest, identified as `chrom:start-end`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub id: String,
}

impl Region {
    pub fn new(chrom: &str, start: i64, end: i64) -> Self {
        Region {
            chrom: chrom.to_string(),
            start,
            end,
            id: format!("{chrom}:{start}-{end}"),
        }
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when `[read_start, read_end)` covers the region plus `window` on both sides.
    pub fn is_spanned_by(&self, read_start: i64, read_end: i64, window: i64) -> bool {
        self.start - window >= read_start && self.end + window <= read_end
    }
}

/// Prefix a chromosome name with `chr` unless it already carries it
pub fn normalize_chrom(chrom: &str) -> String {
    if chrom.contains(CHROM_PREFIX) {
        chrom.to_string()
    } else {
        format!("{CHROM_PREFIX}{chrom}")
    }
}

struct ChromRegions {
    // Region indices in file order
    members: Vec<usize>,
    tree: BasicCOITree<u32, u32>,
}

/// Lookup from normalized chromosome name to the regions on it
pub struct RegionIndex {
    regions: Vec<Region>,
    chroms: FxHashMap<String, ChromRegions>,
}

impl RegionIndex {
    /// Build the index from regions in the order they were read
    pub fn from_regions(regions: Vec<Region>) -> Self {
        let mut grouped: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (idx, region) in regions.iter().enumerate() {
            grouped
                .entry(normalize_chrom(&region.chrom))
                .or_default()
                .push(idx);
        }

        let chroms = grouped
            .into_iter()
            .map(|(chrom, members)| {
                // Metadata is the rank within the chromosome so hits can be put
                // back in file order after the tree query.
                let nodes: Vec<Interval<u32>> = members
                    .iter()
                    .enumerate()
                    .map(|(rank, &idx)| {
                        let region = &regions[idx];
                        Interval {
                            first: region.start as i32,
                            last: (region.end - 1).max(region.start) as i32,
                            metadata: rank as u32,
                        }
                    })
                    .collect();
                let tree = BasicCOITree::new(nodes.as_slice());
                (chrom, ChromRegions { members, tree })
            })
            .collect();

        RegionIndex { regions, chroms }
    }

    /// Parse a region list: `#` comments, whitespace separated `chrom start end [...]`.
    /// Lines with fewer than three fields are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut regions = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                if !line.trim().is_empty() {
                    debug!("Skipping region line {} with fewer than 3 fields", line_no + 1);
                }
                continue;
            }

            let start = parse_coordinate(fields[1], line_no)?;
            let end = parse_coordinate(fields[2], line_no)?;
            regions.push(Region::new(fields[0], start, end));
        }

        Ok(Self::from_regions(regions))
    }

    /// Open and parse a region file, transparently reading BGZF-compressed input.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let file = File::open(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to open region file '{}': {e}", path.display()),
            )
        })?;
        let name = path.to_string_lossy();
        let reader: Box<dyn Read> = if [".gz", ".bgz"].iter().any(|e| name.ends_with(e)) {
            Box::new(bgzf::io::Reader::new(file))
        } else {
            Box::new(file)
        };

        let index = Self::from_reader(BufReader::new(reader))?;
        info!(
            "Found {} regions in {} chromosomes",
            index.region_count(),
            index.chrom_count()
        );
        if log::log_enabled!(log::Level::Debug) {
            let mut names: Vec<&str> = index.chroms.keys().map(|s| s.as_str()).collect();
            names.sort_by(|a, b| natord::compare(a, b));
            debug!("Region chromosomes: {}", names.join(","));
        }
        Ok(index)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn chrom_count(&self) -> usize {
        self.chroms.len()
    }

    /// All regions in file order
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Regions on `chrom` fully spanned by `[read_start, read_end)` with `window`
    /// flanks, in file order. Chromosomes with no regions give an empty list.
    pub fn spanned_regions(
        &self,
        chrom: &str,
        read_start: i64,
        read_end: i64,
        window: i64,
    ) -> Vec<&Region> {
        let Some(chrom_regions) = self.chroms.get(&normalize_chrom(chrom)) else {
            return Vec::new();
        };
        if read_end <= read_start {
            return Vec::new();
        }

        let mut ranks: Vec<u32> = Vec::new();
        chrom_regions
            .tree
            .query(read_start as i32, read_end as i32, |node| {
                let rank: u32 = node.metadata.clone();
                ranks.push(rank);
            });
        ranks.sort_unstable();

        ranks
            .into_iter()
            .map(|rank| &self.regions[chrom_regions.members[rank as usize]])
            .filter(|region| region.is_spanned_by(read_start, read_end, window))
            .collect()
    }
}

/// Coordinates are stored in the interval trees as `i32`
fn parse_coordinate(field: &str, line_no: usize) -> io::Result<i64> {
    match field.parse::<i32>() {
        Ok(value) if value >= 0 => Ok(i64::from(value)),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid coordinate '{field}' on region line {}", line_no + 1),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn index_from(text: &str) -> RegionIndex {
        RegionIndex::from_reader(Cursor::new(text)).unwrap()
    }

    #[test]
    fn test_parse_skips_comments_and_short_lines() {
        let index = index_from("#chrom\tstart\tend\nchr1\t100\t200\tname\n2 50 80\nchr3\t10\n\n");
        assert_eq!(index.region_count(), 2);
        assert_eq!(index.chrom_count(), 2);
        assert_eq!(index.regions()[0].id, "chr1:100-200");
        // Ids keep the name as written, the lookup key does not
        assert_eq!(index.regions()[1].id, "2:50-80");
        assert_eq!(index.spanned_regions("chr2", 0, 1000, 0).len(), 1);
        assert_eq!(index.spanned_regions("2", 0, 1000, 0).len(), 1);
    }

    #[test]
    fn test_invalid_coordinate_is_an_error() {
        assert!(RegionIndex::from_reader(Cursor::new("chr1\tabc\t200\n")).is_err());
    }

    #[test]
    fn test_coordinates_must_fit_the_tree() {
        assert!(RegionIndex::from_reader(Cursor::new("chr1\t100\t3000000000\n")).is_err());
        assert!(RegionIndex::from_reader(Cursor::new("chr1\t-5\t20\n")).is_err());
    }

    #[test]
    fn test_empty_region_at_read_end_is_spanned() {
        let index = index_from("chr1\t100\t100\n");
        assert_eq!(index.spanned_regions("chr1", 0, 100, 0).len(), 1);
        assert!(index.spanned_regions("chr1", 0, 99, 0).is_empty());
    }

    #[test]
    fn test_normalize_chrom() {
        assert_eq!(normalize_chrom("1"), "chr1");
        assert_eq!(normalize_chrom("chrX"), "chrX");
    }

    #[test]
    fn test_spanning_is_boundary_inclusive() {
        let index = index_from("chr1\t100\t200\n");
        let ids = |s, e| {
            index
                .spanned_regions("chr1", s, e, 10)
                .iter()
                .map(|r| r.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(90, 210), vec!["chr1:100-200".to_string()]);
        assert!(ids(91, 210).is_empty());
        assert!(ids(90, 209).is_empty());
        assert!(ids(150, 400).is_empty());
        assert!(index.spanned_regions("chr2", 0, 1000, 10).is_empty());
    }

    #[test]
    fn test_spanned_regions_keep_file_order() {
        let index =
            index_from("chr1\t500\t600\nchr1\t100\t200\nchr1\t300\t400\nchr1\t5000\t5100\n");
        let hits: Vec<&str> = index
            .spanned_regions("chr1", 0, 1000, 5)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(hits, vec!["chr1:500-600", "chr1:100-200", "chr1:300-400"]);
    }

    #[test]
    fn test_duplicate_triples_give_duplicate_ids() {
        let index = index_from("chr1\t100\t200\nchr1\t100\t200\nchr1\t100\t201\n");
        let ids: Vec<&str> = index.regions().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["chr1:100-200", "chr1:100-200", "chr1:100-201"]);
        assert_eq!(index.spanned_regions("chr1", 0, 1000, 0).len(), 3);
    }
}
