//! Line-oriented file I/O with transparent gzip.
//!
//! Any path ending in `.gz` is gzip-decoded on read and gzip-encoded on
//! write; everything else passes through unchanged.

use std::io::{BufRead, Write};
use std::path::Path;

use fgoxide::io::Io;

use crate::errors::{MutScanError, Result};

/// Opens a buffered reader, gzip-decoding `.gz` paths.
pub fn reader(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    Io::default().new_reader(path).map_err(|e| MutScanError::InputFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Opens a buffered writer, gzip-encoding `.gz` paths.
pub fn writer(path: &Path) -> Result<Box<dyn Write + Send>> {
    Io::default()
        .new_writer(path)
        .map(|w| Box::new(w) as Box<dyn Write + Send>)
        .map_err(|e| MutScanError::InputFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Errors (or warns, under `warn_on_no_mapped`) when an input file is empty.
///
/// Returns `true` when the file has content worth reading.
pub fn check_not_empty(path: &Path, warn_on_no_mapped: bool) -> Result<bool> {
    let empty = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false);
    if !empty {
        return Ok(true);
    }
    if warn_on_no_mapped {
        log::warn!("Input file {} is empty.", path.display());
        Ok(false)
    } else {
        Err(MutScanError::InputFile {
            path: path.display().to_string(),
            reason: "is empty.".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn test_plain_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.txt");
        {
            let mut w = writer(&path).unwrap();
            writeln!(w, "first").unwrap();
            writeln!(w, "second").unwrap();
        }
        let lines: Vec<String> = reader(&path).unwrap().lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn test_gzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.txt.gz");
        {
            let mut w = writer(&path).unwrap();
            writeln!(w, "compressed line").unwrap();
        }
        // the file on disk really is gzip
        let mut magic = [0u8; 2];
        std::fs::File::open(&path).unwrap().read_exact(&mut magic).unwrap();
        assert_eq!(magic, [0x1f, 0x8b]);
        let lines: Vec<String> = reader(&path).unwrap().lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["compressed line"]);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(reader(Path::new("/nonexistent/input.sam")).is_err());
    }

    #[test]
    fn test_check_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();
        assert!(check_not_empty(&path, false).is_err());
        assert!(!check_not_empty(&path, true).unwrap());
        std::fs::write(&path, "x").unwrap();
        assert!(check_not_empty(&path, false).unwrap());
    }
}
