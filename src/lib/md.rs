//! Reference-difference (`MD`) tag parsing.
//!
//! The `MD` annotation encodes every position where the read disagrees with
//! the alignment target: runs of matching bases as numbers, mismatched target
//! bases verbatim, and deleted target runs prefixed with `^`. Example:
//! `15A^GC10T30` is 15 matches, a mismatch against target `A`, a two-base
//! deletion of `GC`, 10 matches, a mismatch against `T`, and 30 matches.

use crate::errors::{MutScanError, Result};

/// Kind of one reference-difference operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdOpKind {
    /// Run of matching bases; no sequence recorded
    Match,
    /// Run of mismatched bases; `seq` is the target sequence
    Mismatch,
    /// Deletion from the target; `seq` is the deleted target sequence
    Deletion,
}

/// One reference-difference operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdOp {
    pub kind: MdOpKind,
    pub length: i32,
    pub seq: String,
}

impl MdOp {
    pub fn matching(length: i32) -> Self {
        MdOp { kind: MdOpKind::Match, length, seq: String::new() }
    }

    pub fn mismatch(seq: impl Into<String>) -> Self {
        let seq = seq.into();
        MdOp { kind: MdOpKind::Mismatch, length: seq.len() as i32, seq }
    }

    pub fn deletion(seq: impl Into<String>) -> Self {
        let seq = seq.into();
        MdOp { kind: MdOpKind::Deletion, length: seq.len() as i32, seq }
    }
}

/// Splits tag contents into maximal runs of digits / non-digits.
///
/// `"15A^GC10T30"` becomes `["15", "A", "^GC", "10", "T", "30"]`.
fn split_md_tag(contents: &str) -> Vec<&str> {
    let bytes = contents.as_bytes();
    let mut fields = Vec::new();
    let mut start = 0;
    for i in 1..bytes.len() {
        if bytes[i].is_ascii_digit() != bytes[start].is_ascii_digit() {
            fields.push(&contents[start..i]);
            start = i;
        }
    }
    if !contents.is_empty() {
        fields.push(&contents[start..]);
    }
    fields
}

/// Parses reference-difference tag contents into an ordered operation list.
///
/// Zero-length match runs (used in the encoding to separate adjacent
/// non-match tokens) are suppressed.
pub fn parse_md_tag(contents: &str) -> Result<Vec<MdOp>> {
    let mut ops = Vec::new();
    for field in split_md_tag(contents) {
        if field.as_bytes()[0].is_ascii_digit() {
            let len: i32 = field.parse().map_err(|_| {
                MutScanError::alignment(format!("MD tag match length \"{field}\" out of range"))
            })?;
            if len != 0 {
                ops.push(MdOp::matching(len));
            }
        } else if let Some(deleted) = field.strip_prefix('^') {
            ops.push(MdOp::deletion(deleted));
        } else {
            ops.push(MdOp::mismatch(field));
        }
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_match() {
        let ops = parse_md_tag("137").unwrap();
        assert_eq!(ops, vec![MdOp::matching(137)]);
    }

    #[test]
    fn test_deletion() {
        let ops = parse_md_tag("6^ATG80").unwrap();
        assert_eq!(ops, vec![MdOp::matching(6), MdOp::deletion("ATG"), MdOp::matching(80)]);
    }

    #[test]
    fn test_mismatch() {
        let ops = parse_md_tag("8A7").unwrap();
        assert_eq!(ops, vec![MdOp::matching(8), MdOp::mismatch("A"), MdOp::matching(7)]);
    }

    #[test]
    fn test_complex() {
        let ops = parse_md_tag("15A^GC10T30").unwrap();
        assert_eq!(
            ops,
            vec![
                MdOp::matching(15),
                MdOp::mismatch("A"),
                MdOp::deletion("GC"),
                MdOp::matching(10),
                MdOp::mismatch("T"),
                MdOp::matching(30),
            ]
        );
    }

    #[test]
    fn test_zero_length_matches_suppressed() {
        // adjacent mismatches are separated by zero-length match runs
        let ops = parse_md_tag("49C11G0A8T0C2T19").unwrap();
        let kinds: Vec<MdOpKind> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MdOpKind::Match,
                MdOpKind::Mismatch,
                MdOpKind::Match,
                MdOpKind::Mismatch,
                MdOpKind::Mismatch,
                MdOpKind::Match,
                MdOpKind::Mismatch,
                MdOpKind::Mismatch,
                MdOpKind::Match,
                MdOpKind::Mismatch,
                MdOpKind::Match,
            ]
        );
    }

    #[test]
    fn test_empty_tag() {
        assert!(parse_md_tag("").unwrap().is_empty());
    }
}
