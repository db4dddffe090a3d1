//! Parsing of the tandem-repeat detector's `-ngs` report
//!
//! The report alternates `@`-prefixed header lines, echoing the FASTA header we
//! wrote, with zero or more whitespace separated match lines.

use crate::extract::composite_id;
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};

/// Number of columns on a match line
pub const MATCH_COLUMNS: usize = 17;

/// Field layout of the headers echoed back by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HeaderLayout {
    /// `read;region;passes;quality;consensus;size`
    Reads,
    /// `read;region;padded_size;size`
    Otter,
}

impl HeaderLayout {
    pub fn field_count(&self) -> usize {
        match self {
            HeaderLayout::Reads => 6,
            HeaderLayout::Otter => 4,
        }
    }
}

#[derive(Debug)]
pub enum TrfParseError {
    MalformedHeader { line: usize, fields: usize, expected: usize },
    MatchBeforeHeader { line: usize },
    NotEnoughColumns { line: usize, columns: usize },
    InvalidInt { line: usize, source: ParseIntError },
    InvalidFloat { line: usize, source: ParseFloatError },
}

impl fmt::Display for TrfParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrfParseError::MalformedHeader {
                line,
                fields,
                expected,
            } => write!(
                f,
                "line {line}: header has {fields} fields, expected {expected}"
            ),
            TrfParseError::MatchBeforeHeader { line } => {
                write!(f, "line {line}: match line before any header")
            }
            TrfParseError::NotEnoughColumns { line, columns } => write!(
                f,
                "line {line}: match line has {columns} columns, expected {MATCH_COLUMNS}"
            ),
            TrfParseError::InvalidInt { line, source } => {
                write!(f, "line {line}: invalid integer: {source}")
            }
            TrfParseError::InvalidFloat { line, source } => {
                write!(f, "line {line}: invalid number: {source}")
            }
        }
    }
}

impl std::error::Error for TrfParseError {}

/// One repeat reported inside one read's sequence for one region
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatMatch {
    pub read_name: String,
    pub region_id: String,
    pub start: u64,
    pub end: u64,
    pub motif_length: u32,
    pub copies: f64,
    pub consensus_size: u32,
    pub percent_match: u32,
    pub percent_indel: u32,
    pub score: u32,
    pub percent_a: u32,
    pub percent_c: u32,
    pub percent_g: u32,
    pub percent_t: u32,
    pub entropy: f64,
    pub motif: String,
    pub repeat_sequence: String,
    pub padding_before: String,
    pub padding_after: String,
}

impl RepeatMatch {
    pub fn composite_id(&self) -> String {
        composite_id(&self.read_name, &self.region_id)
    }
}

struct Header {
    read_name: String,
    region_id: String,
}

fn parse_header(text: &str, layout: HeaderLayout, line: usize) -> Result<Header, TrfParseError> {
    let fields: Vec<&str> = text.split(';').collect();
    if fields.len() != layout.field_count() {
        return Err(TrfParseError::MalformedHeader {
            line,
            fields: fields.len(),
            expected: layout.field_count(),
        });
    }
    Ok(Header {
        read_name: fields[0].trim_start_matches('>').to_string(),
        region_id: fields[1].to_string(),
    })
}

fn parse_match(
    columns: &[&str],
    header: &Header,
    line: usize,
) -> Result<RepeatMatch, TrfParseError> {
    let int = |i: usize| -> Result<u32, TrfParseError> {
        columns[i]
            .parse()
            .map_err(|source| TrfParseError::InvalidInt { line, source })
    };
    let pos = |i: usize| -> Result<u64, TrfParseError> {
        columns[i]
            .parse()
            .map_err(|source| TrfParseError::InvalidInt { line, source })
    };
    let float = |i: usize| -> Result<f64, TrfParseError> {
        columns[i]
            .parse()
            .map_err(|source| TrfParseError::InvalidFloat { line, source })
    };

    Ok(RepeatMatch {
        read_name: header.read_name.clone(),
        region_id: header.region_id.clone(),
        start: pos(0)?,
        end: pos(1)?,
        motif_length: int(2)?,
        copies: float(3)?,
        consensus_size: int(4)?,
        percent_match: int(5)?,
        percent_indel: int(6)?,
        score: int(7)?,
        percent_a: int(8)?,
        percent_c: int(9)?,
        percent_g: int(10)?,
        percent_t: int(11)?,
        entropy: float(12)?,
        motif: columns[13].to_string(),
        repeat_sequence: columns[14].to_string(),
        padding_before: columns[15].to_string(),
        padding_after: columns[16].to_string(),
    })
}

/// Parse a full detector report. Blank lines are ignored.
pub fn parse_trf_output(
    text: &str,
    layout: HeaderLayout,
) -> Result<Vec<RepeatMatch>, TrfParseError> {
    let mut matches = Vec::new();
    let mut current: Option<Header> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('@') {
            current = Some(parse_header(header, layout, line_no)?);
            continue;
        }

        let header = current
            .as_ref()
            .ok_or(TrfParseError::MatchBeforeHeader { line: line_no })?;
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < MATCH_COLUMNS {
            return Err(TrfParseError::NotEnoughColumns {
                line: line_no,
                columns: columns.len(),
            });
        }
        matches.push(parse_match(&columns, header, line_no)?);
    }

    Ok(matches)
}
