use log::{debug, info};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Haplotype-of-origin labels keyed by read name, in file order
#[derive(Debug, Default)]
pub struct Haplotags {
    entries: Vec<(String, String)>,
    by_read: FxHashMap<String, usize>,
}

impl Haplotags {
    /// Build from `(read_name, haplotag)` pairs; the first tag seen for a read wins.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut haplotags = Haplotags::default();
        for (read, tag) in pairs {
            if haplotags.by_read.contains_key(&read) {
                debug!("Ignoring repeated haplotag for read {read}");
                continue;
            }
            haplotags.by_read.insert(read.clone(), haplotags.entries.len());
            haplotags.entries.push((read, tag));
        }
        haplotags
    }

    /// Read a two-column tab separated table, with an optional
    /// `READ_NAME  HAPLOTAG` header line.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut pairs = Vec::new();
        let mut first_entry = true;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Haplotag line {} has fewer than 2 columns", line_no + 1),
                ));
            }
            let is_header = first_entry && fields[0] == "READ_NAME";
            first_entry = false;
            if is_header {
                continue;
            }
            pairs.push((fields[0].to_string(), fields[1].trim_end().to_string()));
        }
        Ok(Self::from_pairs(pairs))
    }

    pub fn from_path(path: &Path) -> io::Result<Self> {
        let file = File::open(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to open haplotag table '{}': {e}", path.display()),
            )
        })?;
        let haplotags = Self::from_reader(BufReader::new(file))?;
        info!("Loaded haplotags for {} reads", haplotags.len());
        Ok(haplotags)
    }

    pub fn get(&self, read_name: &str) -> Option<&str> {
        self.by_read
            .get(read_name)
            .map(|&idx| self.entries[idx].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(r, t)| (r.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_with_header_and_duplicates() {
        let text = "READ_NAME\tHAPLOTAG\nr1\t1\nr2\t2\nr1\t2\n";
        let haplotags = Haplotags::from_reader(Cursor::new(text)).unwrap();
        assert_eq!(haplotags.len(), 2);
        assert_eq!(haplotags.get("r1"), Some("1"));
        assert_eq!(haplotags.get("r3"), None);
    }

    #[test]
    fn test_header_after_comments() {
        let text = "# phased with v1\n\nREAD_NAME\tHAPLOTAG\nr1\t2\n";
        let haplotags = Haplotags::from_reader(Cursor::new(text)).unwrap();
        assert_eq!(haplotags.len(), 1);
        assert_eq!(haplotags.get("READ_NAME"), None);
        assert_eq!(haplotags.get("r1"), Some("2"));
    }

    #[test]
    fn test_short_line_is_an_error() {
        assert!(Haplotags::from_reader(Cursor::new("r1\n")).is_err());
    }
}
