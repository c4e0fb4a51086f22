//! Amplicon primer pairs and read/primer matching.

use std::path::Path;

use crate::errors::{MutScanError, Result};
use crate::io;
use crate::mutation::NO_ASSOCIATED_PRIMER_PAIR;

/// One amplicon: forward and reverse primer target ranges, 0-based inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimerPair {
    pub fw_left: i32,
    pub fw_right: i32,
    pub rv_left: i32,
    pub rv_right: i32,
}

impl Default for PrimerPair {
    fn default() -> Self {
        PrimerPair { fw_left: -999, fw_right: -999, rv_left: -999, rv_right: -999 }
    }
}

impl PrimerPair {
    /// Parses four whitespace-separated coordinates.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(MutScanError::ParsePrimerTable {
                reason: "unable to parse incomplete line in primer file.".to_string(),
            });
        }
        let coord = |s: &str| {
            s.parse::<i32>().map_err(|_| MutScanError::ParsePrimerTable {
                reason: "line is incorrectly formatted (couldn't parse primer locations)."
                    .to_string(),
            })
        };
        Ok(PrimerPair {
            fw_left: coord(fields[0])?,
            fw_right: coord(fields[1])?,
            rv_left: coord(fields[2])?,
            rv_right: coord(fields[3])?,
        })
    }

    /// Whether this pair holds real coordinates (the default is a sentinel).
    pub fn is_set(&self) -> bool {
        self.fw_left > -1
    }
}

/// Loads a primer table: blank lines, `>` name lines, and lines starting with
/// a letter (primer sequences) are ignored; everything else must be a
/// four-coordinate line.
pub fn load_primer_pairs(path: &Path) -> Result<Vec<PrimerPair>> {
    let reader = io::reader(path)?;
    let mut pairs = Vec::new();
    for line in std::io::BufRead::lines(reader) {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('>')
            || trimmed.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        {
            continue;
        }
        pairs.push(PrimerPair::parse(trimmed)?);
    }
    Ok(pairs)
}

/// Finds the forward and reverse primers nearest the mapped read ends, each
/// within `max_primer_offset`. Returns pair indices, or the no-pair sentinel.
pub fn find_closest_primers(
    left: i32,
    right: i32,
    primer_pairs: &[PrimerPair],
    max_primer_offset: i32,
) -> (i32, i32) {
    let mut fw_index = NO_ASSOCIATED_PRIMER_PAIR;
    let mut rv_index = NO_ASSOCIATED_PRIMER_PAIR;
    let mut fw_best = i32::MAX;
    let mut rv_best = i32::MAX;
    for (i, pair) in primer_pairs.iter().enumerate() {
        let fw_dist = (left - pair.fw_left).abs();
        if fw_dist <= max_primer_offset && fw_dist < fw_best {
            fw_index = i as i32;
            fw_best = fw_dist;
        }
        let rv_dist = (right - pair.rv_right).abs();
        if rv_dist <= max_primer_offset && rv_dist < rv_best {
            rv_index = i as i32;
            rv_best = rv_dist;
        }
    }
    (fw_index, rv_index)
}

/// Relaxed search: any pair whose forward primer range contains the read's
/// left end or whose reverse primer range contains the right end. Used only
/// to supply a trim range when the strict search found nothing.
pub fn find_overlapping_primers(left: i32, right: i32, primer_pairs: &[PrimerPair]) -> i32 {
    let mut fw_index = NO_ASSOCIATED_PRIMER_PAIR;
    let mut rv_index = NO_ASSOCIATED_PRIMER_PAIR;
    for (i, pair) in primer_pairs.iter().enumerate() {
        if left >= pair.fw_left && left <= pair.fw_right {
            fw_index = i as i32;
        }
        if right >= pair.rv_left && right <= pair.rv_right {
            rv_index = i as i32;
        }
    }
    fw_index.max(rv_index)
}

/// Off-target test for a read carrying both fragment ends (unpaired or
/// pre-merged): each required primer must have matched, and when both are
/// required they must belong to the same pair.
pub fn is_off_target_unpaired_read(
    fw_primer_index: i32,
    rv_primer_index: i32,
    require_forward_primer_mapped: bool,
    require_reverse_primer_mapped: bool,
) -> bool {
    if require_forward_primer_mapped && fw_primer_index < 0 {
        return true;
    }
    if require_reverse_primer_mapped && rv_primer_index < 0 {
        return true;
    }
    if require_forward_primer_mapped
        && require_reverse_primer_mapped
        && fw_primer_index != rv_primer_index
    {
        return true;
    }
    false
}

/// Off-target test for one mate (or a concordant pair): mismatched pairs are
/// checked before individual requirements.
pub fn is_off_target_paired_read(
    fw_primer_index: i32,
    rv_primer_index: i32,
    require_forward_primer_mapped: bool,
    require_reverse_primer_mapped: bool,
) -> bool {
    if require_forward_primer_mapped && require_reverse_primer_mapped {
        fw_primer_index != rv_primer_index
    } else if require_forward_primer_mapped {
        fw_primer_index < 0
    } else if require_reverse_primer_mapped {
        rv_primer_index < 0
    } else {
        false
    }
}
