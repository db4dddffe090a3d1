// lib.rs
pub mod cigar;
pub mod extract;
pub mod faidx;
pub mod haplotag;
pub mod input;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod read;
pub mod reference;
pub mod region;
pub mod tools;
pub mod trf;

/// Marker for a value that could not be determined
pub const NA: &str = "NA";
