use log::info;
use std::io;
use std::path::{Path, PathBuf};

const ALIGNMENT_EXTENSION: &str = "bam";

/// Resolve the alignment argument: a single file, a directory of `.bam`
/// files, or a comma separated list of files.
pub fn discover_alignments(input: &str) -> io::Result<Vec<PathBuf>> {
    let trimmed = input.trim_end_matches('/');
    let path = Path::new(trimmed);

    let alignments = if path.is_dir() {
        let mut found: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file() && p.extension().is_some_and(|ext| ext == ALIGNMENT_EXTENSION)
            })
            .collect();
        found.sort_by(|a, b| natord::compare(&a.to_string_lossy(), &b.to_string_lossy()));
        info!("Found directory with {} alignment files", found.len());
        found
    } else if path.is_file() {
        info!("Found single alignment file");
        vec![path.to_path_buf()]
    } else if trimmed.contains(',') {
        let listed: Vec<PathBuf> = trimmed
            .split(',')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        if let Some(missing) = listed.iter().find(|p| !p.is_file()) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Alignment file '{}' not found", missing.display()),
            ));
        }
        info!("Found {} alignment files", listed.len());
        listed
    } else {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Alignment input '{input}' is not a file, directory or comma separated list"),
        ));
    };

    if alignments.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("No alignment files found in '{input}'"),
        ));
    }
    Ok(alignments)
}

/// Sample name for an alignment file: its file name without `.bam` and
/// without the `tmp_` prefix given to subset files.
pub fn sample_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name
        .strip_suffix(&format!(".{ALIGNMENT_EXTENSION}"))
        .unwrap_or(&name);
    name.strip_prefix("tmp_").unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_sample_name() {
        assert_eq!(sample_name(Path::new("/data/HG002.bam")), "HG002");
        assert_eq!(sample_name(Path::new("out/tmp_HG002.bam")), "HG002");
        assert_eq!(sample_name(Path::new("reads.cram")), "reads.cram");
    }

    #[test]
    fn test_discover_directory_file_and_list() {
        let dir = TempDir::new().unwrap();
        for name in ["s10.bam", "s2.bam", "s1.bam.bai", "notes.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let found = discover_alignments(&format!("{}/", dir.path().display())).unwrap();
        let names: Vec<String> = found.iter().map(|p| sample_name(p)).collect();
        assert_eq!(names, vec!["s2", "s10"]);

        let single = dir.path().join("s2.bam");
        assert_eq!(
            discover_alignments(&single.to_string_lossy()).unwrap(),
            vec![single.clone()]
        );

        let list = format!("{},{}", single.display(), dir.path().join("s10.bam").display());
        assert_eq!(discover_alignments(&list).unwrap().len(), 2);

        let broken = format!("{},{}", single.display(), dir.path().join("nope.bam").display());
        assert!(discover_alignments(&broken).is_err());
        assert!(discover_alignments(&dir.path().join("missing.bam").to_string_lossy()).is_err());
    }
}
