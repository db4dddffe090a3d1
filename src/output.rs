use crate::extract::ExtractionRecord;
use crate::merge::MergedRecord;
use crate::trf::HeaderLayout;
use crate::NA;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub const TABLE_COLUMNS: [&str; 30] = [
    "REGION",
    "READ_NAME",
    "PASSES",
    "READ_QUALITY",
    "MAPPING_CONSENSUS",
    "SEQUENCE_FOR_TRF",
    "SEQUENCE_WITH_PADDINGS",
    "LEN_SEQUENCE_FOR_TRF",
    "LEN_SEQUENCE_WITH_PADDINGS",
    "ID",
    "SAMPLE_NAME",
    "EXPECTED_MOTIF",
    "START_TRF",
    "END_TRF",
    "LENGTH_MOTIF_TRF",
    "COPIES_TRF",
    "TRF_CONSENSUS_SIZE",
    "TRF_PERC_MATCH",
    "TRF_PERC_INDEL",
    "TRF_SCORE",
    "TRF_A_PERC",
    "TRF_C_PERC",
    "TRF_G_PERC",
    "TRF_T_PERC",
    "TRF_ENTROPY",
    "TRF_MOTIF",
    "TRF_REPEAT_SEQUENCE",
    "TRF_PADDING_BEFORE",
    "TRF_PADDING_AFTER",
    "HAPLOTAG",
];

fn cell<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| NA.to_string(), |v| v.to_string())
}

/// Write the detector input for one sample. Records without sequence are
/// left out. Returns the number of sequences written.
pub fn write_detector_fasta<W: Write>(
    writer: &mut W,
    records: &[ExtractionRecord],
    layout: HeaderLayout,
) -> io::Result<usize> {
    let mut written = 0;
    for record in records {
        let (Some(sequence), Some(padded)) = (&record.sequence, &record.sequence_with_padding)
        else {
            continue;
        };
        match layout {
            HeaderLayout::Reads => writeln!(
                writer,
                ">{};{};{};{};{};{}",
                record.read_name,
                record.region_id,
                record.tags.num_passes_field(),
                record.tags.read_quality_field(),
                record.tags.mate_cigar_field(),
                sequence.len()
            )?,
            HeaderLayout::Otter => writeln!(
                writer,
                ">{};{};{};{}",
                record.read_name,
                record.region_id,
                padded.len(),
                sequence.len()
            )?,
        }
        writeln!(writer, "{sequence}")?;
        written += 1;
    }
    Ok(written)
}

pub fn write_detector_fasta_file(
    path: &Path,
    records: &[ExtractionRecord],
    layout: HeaderLayout,
) -> io::Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    let written = write_detector_fasta(&mut writer, records, layout)?;
    writer.flush()?;
    Ok(written)
}

fn row_cells(row: &MergedRecord) -> Vec<String> {
    let ext = row.extraction.as_ref();
    let rep = row.repeat.as_ref();
    vec![
        cell(ext.map(|e| &e.region_id)),
        cell(row.read_name.as_ref()),
        cell(ext.map(|e| e.tags.num_passes_field())),
        cell(ext.map(|e| e.tags.read_quality_field())),
        cell(ext.map(|e| e.tags.mate_cigar_field())),
        cell(ext.and_then(|e| e.sequence.as_ref())),
        cell(ext.and_then(|e| e.sequence_with_padding.as_ref())),
        cell(ext.and_then(|e| e.len_sequence())),
        cell(ext.and_then(|e| e.len_sequence_with_padding())),
        cell(row.composite_id.as_ref()),
        cell(row.sample_name.as_ref()),
        // The expected motif is never known at this stage
        NA.to_string(),
        cell(rep.map(|r| r.start)),
        cell(rep.map(|r| r.end)),
        cell(rep.map(|r| r.motif_length)),
        // Detector precision: one decimal for copies, two for entropy
        cell(rep.map(|r| format!("{:.1}", r.copies))),
        cell(rep.map(|r| r.consensus_size)),
        cell(rep.map(|r| r.percent_match)),
        cell(rep.map(|r| r.percent_indel)),
        cell(rep.map(|r| r.score)),
        cell(rep.map(|r| r.percent_a)),
        cell(rep.map(|r| r.percent_c)),
        cell(rep.map(|r| r.percent_g)),
        cell(rep.map(|r| r.percent_t)),
        cell(rep.map(|r| format!("{:.2}", r.entropy))),
        cell(rep.map(|r| &r.motif)),
        cell(rep.map(|r| &r.repeat_sequence)),
        cell(rep.map(|r| &r.padding_before)),
        cell(rep.map(|r| &r.padding_after)),
        cell(row.haplotag.as_ref()),
    ]
}

/// Write the merged table as tab separated text with a header line
pub fn write_merged_table<W: Write>(writer: &mut W, rows: &[MergedRecord]) -> io::Result<()> {
    writeln!(writer, "{}", TABLE_COLUMNS.join("\t"))?;
    for row in rows {
        writeln!(writer, "{}", row_cells(row).join("\t"))?;
    }
    Ok(())
}

pub fn write_merged_table_file(path: &Path, rows: &[MergedRecord]) -> io::Result<()> {
    let file = File::create(path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to create output table '{}': {e}", path.display()),
        )
    })?;
    let mut writer = BufWriter::new(file);
    write_merged_table(&mut writer, rows)?;
    writer.flush()
}
