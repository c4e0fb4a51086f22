//! Alignment-operator (CIGAR) string parsing.

use crate::errors::{MutScanError, Result};

/// Kind of one alignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOpKind {
    /// `M`: alignment match (sequence match or mismatch)
    Match,
    /// `I`: insertion to the target
    Insertion,
    /// `D`: deletion from the target
    Deletion,
    /// `N`: skipped target region
    Skip,
    /// `S`: soft-clipped read bases
    SoftClip,
    /// `H`: hard-clipped bases, absent from the reported read
    HardClip,
    /// `P`: padding (silent deletion from a padded target)
    Pad,
    /// `=`: explicit sequence match
    SequenceMatch,
    /// `X`: explicit sequence mismatch
    SequenceMismatch,
}

impl CigarOpKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'M' => Some(CigarOpKind::Match),
            b'I' => Some(CigarOpKind::Insertion),
            b'D' => Some(CigarOpKind::Deletion),
            b'N' => Some(CigarOpKind::Skip),
            b'S' => Some(CigarOpKind::SoftClip),
            b'H' => Some(CigarOpKind::HardClip),
            b'P' => Some(CigarOpKind::Pad),
            b'=' => Some(CigarOpKind::SequenceMatch),
            b'X' => Some(CigarOpKind::SequenceMismatch),
            _ => None,
        }
    }

    /// Whether this operator consumes alignment target positions.
    pub fn consumes_target(self) -> bool {
        matches!(
            self,
            CigarOpKind::Match
                | CigarOpKind::Deletion
                | CigarOpKind::Skip
                | CigarOpKind::Pad
                | CigarOpKind::SequenceMatch
                | CigarOpKind::SequenceMismatch
        )
    }
}

/// One alignment operator with its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub kind: CigarOpKind,
    pub length: u32,
}

impl CigarOp {
    pub fn new(kind: CigarOpKind, length: u32) -> Self {
        CigarOp { kind, length }
    }
}

/// Parses an alignment-operator string into (operator, length) pairs.
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>> {
    let malformed = || MutScanError::alignment("CIGAR string incorrectly formatted");
    let trimmed = cigar.trim();
    if trimmed.is_empty() {
        return Err(malformed());
    }
    let mut ops = Vec::new();
    let mut digits_start = 0;
    let bytes = trimmed.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        if i == digits_start {
            // operator with no preceding length
            return Err(malformed());
        }
        let length: u32 = trimmed[digits_start..i].parse().map_err(|_| malformed())?;
        let kind = CigarOpKind::from_byte(bytes[i]).ok_or_else(|| malformed())?;
        ops.push(CigarOp::new(kind, length));
        i += 1;
        digits_start = i;
    }
    if digits_start != bytes.len() {
        // trailing length with no operator
        return Err(malformed());
    }
    Ok(ops)
}

/// Right-most alignment target position covered by an alignment (0-based).
///
/// The left-most position plus the summed lengths of target-consuming
/// operators, minus one.
pub fn right_target_pos(left_target_pos: i32, ops: &[CigarOp]) -> i32 {
    let consumed: i32 = ops
        .iter()
        .filter(|op| op.kind.consumes_target())
        .map(|op| op.length as i32)
        .sum();
    left_target_pos + consumed - 1
}
