//! Reference baseline through htslib's faidx on a FASTA written to disk.

use spanseq::faidx::ReferenceFasta;
use spanseq::reference::{extract_reference, REFERENCE_SAMPLE};
use spanseq::region::Region;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CHROM_LEN: usize = 200;

fn genome() -> Vec<u8> {
    (0..CHROM_LEN).map(|i| b"ACGT"[(i * 7 + i / 3) % 4]).collect()
}

fn write_fasta(path: &Path, sequence: &[u8]) -> std::io::Result<()> {
    let mut text = String::from(">chr1 test chromosome\n");
    for line in sequence.chunks(60) {
        text.push_str(&String::from_utf8_lossy(line).to_lowercase());
        text.push('\n');
    }
    fs::write(path, text)
}

#[test]
fn test_htslib_reference_interior_and_chromosome_end() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let fasta_path = temp_dir.path().join("ref.fa");
    let genome = genome();
    write_fasta(&fasta_path, &genome)?;

    let fasta = ReferenceFasta::open(&fasta_path)?;
    assert_eq!(fasta.get_sequence_length("chr1")?, CHROM_LEN);
    assert_eq!(fasta.fetch_sequence("chr1", 10, 14)?, genome[10..14].to_vec());

    let window = 20;
    let regions = vec![Region::new("chr1", 50, 80), Region::new("chr1", 170, 190)];
    let records = extract_reference(&regions, window, &fasta)?;
    assert_eq!(records.len(), 2);

    let text = |range: std::ops::Range<usize>| String::from_utf8_lossy(&genome[range]).into_owned();

    let interior = &records[0];
    assert_eq!(interior.read_name, REFERENCE_SAMPLE);
    assert_eq!(interior.region_id, "chr1:50-80");
    assert_eq!(interior.len_sequence_with_padding(), Some(30 + 2 * window as usize));
    assert_eq!(interior.sequence.as_deref(), Some(text(50..80).as_str()));
    assert_eq!(interior.sequence_with_padding.as_deref(), Some(text(30..100).as_str()));

    // end + window runs 10 bases past the chromosome
    let at_end = &records[1];
    assert_eq!(at_end.len_sequence_with_padding(), Some(CHROM_LEN - 150));
    assert_eq!(at_end.sequence.as_deref(), Some(text(170..190).as_str()));
    assert_eq!(at_end.len_sequence(), Some(20));
    Ok(())
}
