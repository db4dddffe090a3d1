use rust_htslib::faidx;
use rustc_hash::FxHashMap;
use std::io;
use std::path::Path;

/// Indexed reference genome opened through htslib
pub struct ReferenceFasta {
    reader: faidx::Reader,
    sequence_lengths: FxHashMap<String, usize>,
}

impl ReferenceFasta {
    /// Open a FASTA file, building its `.fai` if it does not exist yet.
    pub fn open(fasta_path: &Path) -> io::Result<Self> {
        // Opening the reader creates the index when missing
        let reader = faidx::Reader::from_path(fasta_path).map_err(|e| {
            io::Error::other(format!(
                "Failed to open FASTA file '{}': {e}",
                fasta_path.display()
            ))
        })?;

        let fai_path = format!("{}.fai", fasta_path.display());
        let fai_content = std::fs::read_to_string(&fai_path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to read FASTA index '{fai_path}': {e}"),
            )
        })?;

        Ok(ReferenceFasta {
            reader,
            sequence_lengths: parse_fai_lengths(&fai_content),
        })
    }

    pub fn get_sequence_length(&self, seq_name: &str) -> io::Result<usize> {
        self.sequence_lengths.get(seq_name).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Sequence '{seq_name}' not found"),
            )
        })
    }

    /// Fetch `[start, end)` of `seq_name`, upper-cased
    pub fn fetch_sequence(&self, seq_name: &str, start: usize, end: usize) -> io::Result<Vec<u8>> {
        if end <= start {
            return Ok(Vec::new());
        }

        // fetch_seq expects a 0-based inclusive end coordinate
        let seq_vec = match self.reader.fetch_seq(seq_name, start, end - 1) {
            Ok(seq) => {
                let mut seq_vec = seq.to_vec();
                // Free up memory to avoid memory leak (bug https://github.com/rust-bio/rust-htslib/issues/401#issuecomment-1704290171)
                unsafe { libc::free(seq.as_ptr() as *mut std::ffi::c_void) };
                seq_vec.make_ascii_uppercase();
                seq_vec
            }
            Err(e) => {
                return Err(io::Error::other(format!(
                    "Failed to fetch sequence for {seq_name}:{start}-{end}: {e}"
                )))
            }
        };

        Ok(seq_vec)
    }
}

fn parse_fai_lengths(fai_content: &str) -> FxHashMap<String, usize> {
    let mut lengths = FxHashMap::default();
    for line in fai_content.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() >= 2 && !fields[0].is_empty() {
            if let Ok(length) = fields[1].parse::<usize>() {
                lengths.insert(fields[0].to_string(), length);
            }
        }
    }
    lengths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fai_lengths() {
        let lengths = parse_fai_lengths("chr1\t1000\t6\t60\t61\nchr2\tbad\t0\t60\t61\n\t5\n");
        assert_eq!(lengths.len(), 1);
        assert_eq!(lengths.get("chr1"), Some(&1000));
    }
}
