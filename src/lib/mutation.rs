//! Mutation records and their classification.
//!
//! A [`Mutation`] stores one deviation of a read from the alignment target in
//! half-open target coordinates: `left` and `right` are the nearest unchanged
//! target positions bracketing the change, and `seq`/`qual` hold the read
//! bases (and Phred+33 quality characters) replacing the target span between
//! them. Classification assigns a [`MutationClass`] from the arithmetic
//! relationship between the replacement length and the span width.

use std::fmt;

use crate::errors::{MutScanError, Result};

/// Sentinel for "no associated amplicon primer pair".
pub const NO_ASSOCIATED_PRIMER_PAIR: i32 = -999;

/// Classification tag for a single mutation.
///
/// Single-nucleotide classes are parameterized by the bases involved
/// (`Gap(b'A')` renders as `A-`, `Insert(b'A')` as `-A`, and
/// `Mismatch(b'A', b'G')` as `AG` with the target base first). A
/// single-nucleotide mismatch whose read base is `N` is tagged [`NMatch`]
/// instead and is excluded from counting and from collapsing.
///
/// [`NMatch`]: MutationClass::NMatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MutationClass {
    /// Single-nucleotide deletion, e.g. `A-`
    Gap(u8),
    /// Single-nucleotide insertion, e.g. `-A`
    Insert(u8),
    /// Single-nucleotide mismatch, target base then read base, e.g. `AG`
    Mismatch(u8, u8),
    /// Read `N` aligned to a target base; not a real mutation
    NMatch,
    /// Deletion of more than one nucleotide
    MultinucDeletion,
    /// Insertion of more than one nucleotide
    MultinucInsertion,
    /// Multi-nucleotide substitution of equal length
    MultinucMismatch,
    /// Net-deleting mutation with both sides non-empty
    ComplexDeletion,
    /// Net-inserting mutation with both sides non-empty
    ComplexInsertion,
}

impl fmt::Display for MutationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MutationClass::Gap(b) => write!(f, "{}-", b as char),
            MutationClass::Insert(b) => write!(f, "-{}", b as char),
            MutationClass::Mismatch(t, r) => write!(f, "{}{}", t as char, r as char),
            MutationClass::NMatch => write!(f, "N_match"),
            MutationClass::MultinucDeletion => write!(f, "multinuc_deletion"),
            MutationClass::MultinucInsertion => write!(f, "multinuc_insertion"),
            MutationClass::MultinucMismatch => write!(f, "multinuc_mismatch"),
            MutationClass::ComplexDeletion => write!(f, "complex_deletion"),
            MutationClass::ComplexInsertion => write!(f, "complex_insertion"),
        }
    }
}

impl std::str::FromStr for MutationClass {
    type Err = MutScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "N_match" => return Ok(MutationClass::NMatch),
            "multinuc_deletion" => return Ok(MutationClass::MultinucDeletion),
            "multinuc_insertion" => return Ok(MutationClass::MultinucInsertion),
            "multinuc_mismatch" => return Ok(MutationClass::MultinucMismatch),
            "complex_deletion" => return Ok(MutationClass::ComplexDeletion),
            "complex_insertion" => return Ok(MutationClass::ComplexInsertion),
            _ => {}
        }
        let b = s.as_bytes();
        if b.len() == 2 {
            if b[1] == b'-' {
                return Ok(MutationClass::Gap(b[0]));
            }
            if b[0] == b'-' {
                return Ok(MutationClass::Insert(b[1]));
            }
            return Ok(MutationClass::Mismatch(b[0], b[1]));
        }
        Err(MutScanError::intermediate(format!("unrecognized mutation tag \"{s}\"")))
    }
}

/// The counted mutation classes in output column order.
///
/// `N_match` is deliberately absent: reads calling `N` at a position carry no
/// mutation information and are never tabulated.
pub fn mutation_classes() -> Vec<MutationClass> {
    use MutationClass::{
        ComplexDeletion, ComplexInsertion, Gap, Insert, Mismatch, MultinucDeletion,
        MultinucInsertion, MultinucMismatch,
    };
    vec![
        Gap(b'A'),
        Gap(b'T'),
        Gap(b'G'),
        Gap(b'C'),
        Insert(b'A'),
        Insert(b'T'),
        Insert(b'G'),
        Insert(b'C'),
        Insert(b'N'),
        Mismatch(b'A', b'T'),
        Mismatch(b'A', b'G'),
        Mismatch(b'A', b'C'),
        Mismatch(b'T', b'A'),
        Mismatch(b'T', b'G'),
        Mismatch(b'T', b'C'),
        Mismatch(b'G', b'A'),
        Mismatch(b'G', b'T'),
        Mismatch(b'G', b'C'),
        Mismatch(b'C', b'A'),
        Mismatch(b'C', b'T'),
        Mismatch(b'C', b'G'),
        MultinucDeletion,
        MultinucInsertion,
        MultinucMismatch,
        ComplexDeletion,
        ComplexInsertion,
    ]
}

/// One deviation from the alignment target between two unchanged positions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mutation {
    /// Leftmost unchanged alignment target position (0-based)
    pub left: i32,
    /// Rightmost unchanged alignment target position (0-based)
    pub right: i32,
    /// Read sequence replacing the target span between `left` and `right` (exclusive)
    pub seq: String,
    /// Phred+33 quality characters for the bases in `seq`
    pub qual: String,
    /// Classification, once assigned
    pub tag: Option<MutationClass>,
    /// Whether this mutation is or derives from an ambiguous alignment
    pub ambig: bool,
}

impl Mutation {
    /// Creates an unclassified, unambiguous mutation.
    pub fn new(left: i32, right: i32, seq: impl Into<String>, qual: impl Into<String>) -> Self {
        Mutation { left, right, seq: seq.into(), qual: qual.into(), tag: None, ambig: false }
    }

    /// Width of the replaced target span.
    fn span(&self) -> i32 {
        self.right - self.left - 1
    }

    /// Replacement length as a signed value, for comparisons against `span`.
    fn seq_len(&self) -> i32 {
        self.seq.len() as i32
    }

    /// True for an insertion between adjacent target positions.
    pub fn is_simple_insert(&self) -> bool {
        self.right - self.left == 1
    }

    /// True for a pure deletion (no replacement bases).
    pub fn is_simple_gap(&self) -> bool {
        self.seq.is_empty()
    }

    /// True when replacement length differs from the replaced span.
    pub fn is_gap_or_insert(&self) -> bool {
        self.seq_len() != self.span()
    }

    /// True for a net deletion.
    pub fn is_gap(&self) -> bool {
        self.seq_len() < self.span()
    }

    /// True for a net insertion.
    pub fn is_insert(&self) -> bool {
        self.seq_len() > self.span()
    }

    /// True for an `N` basecall aligned to a single target base. Holds by
    /// shape alone, before and after classification assigns the tag.
    pub fn is_n_match(&self) -> bool {
        self.span() == 1 && self.seq == "N"
    }

    /// Whether the mutation's placement is ambiguous.
    ///
    /// Assumes ambiguous-indel identification already widened the bounds to
    /// cover every valid placement, so an indel that still replaces some of
    /// its span has alternate alignments.
    pub fn is_ambiguous(&self) -> bool {
        let d = self.span();
        let n = self.seq_len();
        (d > n && n > 0) || (d < n && d > 0)
    }

    /// Classifies this mutation against the local target sequence.
    ///
    /// `local_target` covers the read's aligned span and `target_pos` is the
    /// target coordinate of its first character.
    pub fn classify(&self, local_target: &str, target_pos: i32) -> Result<MutationClass> {
        let d = self.span();
        let n = self.seq_len();
        let target_at = |pos: i32| -> Result<u8> {
            usize::try_from(pos - target_pos)
                .ok()
                .and_then(|i| local_target.as_bytes().get(i).copied())
                .ok_or_else(|| {
                    MutScanError::alignment(
                        "Unable to classify mutation. Mutation location falls outside local target sequence.",
                    )
                })
        };
        let class = if d == 1 && n == 0 {
            MutationClass::Gap(target_at(self.left + 1)?)
        } else if d == 0 && n == 1 {
            MutationClass::Insert(self.seq.as_bytes()[0])
        } else if d == 1 && n == 1 {
            if self.seq == "N" {
                MutationClass::NMatch
            } else {
                MutationClass::Mismatch(target_at(self.left + 1)?, self.seq.as_bytes()[0])
            }
        } else if d > 1 && n == 0 {
            MutationClass::MultinucDeletion
        } else if d == 0 && n > 1 {
            MutationClass::MultinucInsertion
        } else if d == n {
            MutationClass::MultinucMismatch
        } else if n < d {
            MutationClass::ComplexDeletion
        } else if n > d {
            MutationClass::ComplexInsertion
        } else {
            return Err(MutScanError::LogicInvariant {
                reason: "unable to classify mutation".to_string(),
            });
        };
        Ok(class)
    }

    /// Serialized tag including the `_ambig` suffix; empty when unclassified
    /// and unambiguous.
    pub fn tag_string(&self) -> String {
        let mut s = match self.tag {
            Some(tag) => tag.to_string(),
            None => String::new(),
        };
        if self.ambig {
            s.push_str("_ambig");
        }
        s
    }

    /// Serializes as the quintuple `left right "seq" "qual" "tag"`.
    pub fn to_field(&self) -> String {
        format!("{} {} \"{}\" \"{}\" \"{}\"", self.left, self.right, self.seq, self.qual, self.tag_string())
    }
}

/// Serializes a mutation list as space-separated quintuples.
pub fn mutations_to_string(mutations: &[Mutation]) -> String {
    mutations.iter().map(Mutation::to_field).collect::<Vec<_>>().join(" ")
}

fn unquote(field: &str) -> Result<&str> {
    field
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| MutScanError::intermediate(format!("expected quoted field, got \"{field}\"")))
}

fn parse_tag(field: &str) -> Result<(Option<MutationClass>, bool)> {
    let (bare, ambig) = match field.strip_suffix("_ambig") {
        Some(prefix) => (prefix, true),
        None => (field, false),
    };
    let tag = if bare.is_empty() { None } else { Some(bare.parse()?) };
    Ok((tag, ambig))
}

/// Parses the space-separated mutation quintuples of an intermediate record.
pub fn mutations_from_str(s: &str) -> Result<Vec<Mutation>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let fields: Vec<&str> = trimmed.split(' ').collect();
    if fields.len() % 5 != 0 {
        return Err(MutScanError::intermediate(format!(
            "unable to read mutations from incomplete line. {} field(s) in right-most column. Right-most column: \"{s}\"",
            fields.len()
        )));
    }
    let mut mutations = Vec::with_capacity(fields.len() / 5);
    for chunk in fields.chunks_exact(5) {
        let left = chunk[0].parse::<i32>().map_err(|_| {
            MutScanError::intermediate(
                "line is incorrectly formatted (couldn't read mutation left or right bounds).",
            )
        })?;
        let right = chunk[1].parse::<i32>().map_err(|_| {
            MutScanError::intermediate(
                "line is incorrectly formatted (couldn't read mutation left or right bounds).",
            )
        })?;
        let (tag, ambig) = parse_tag(unquote(chunk[4])?)?;
        mutations.push(Mutation {
            left,
            right,
            seq: unquote(chunk[2])?.to_string(),
            qual: unquote(chunk[3])?.to_string(),
            tag,
            ambig,
        });
    }
    Ok(mutations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(left: i32, right: i32, seq: &str, qual: &str) -> Mutation {
        Mutation::new(left, right, seq, qual)
    }

    #[test]
    fn test_classify_all_classes() {
        let seq = "ATGCATGC";
        let cases: Vec<(Mutation, &str)> = vec![
            (m(3, 5, "", ""), "A-"),
            (m(4, 6, "", ""), "T-"),
            (m(5, 7, "", ""), "G-"),
            (m(6, 8, "", ""), "C-"),
            (m(1, 2, "A", "1"), "-A"),
            (m(1, 2, "T", "1"), "-T"),
            (m(1, 2, "G", "1"), "-G"),
            (m(1, 2, "C", "1"), "-C"),
            (m(3, 5, "T", "1"), "AT"),
            (m(3, 5, "G", "1"), "AG"),
            (m(3, 5, "C", "1"), "AC"),
            (m(4, 6, "A", "1"), "TA"),
            (m(4, 6, "G", "1"), "TG"),
            (m(4, 6, "C", "1"), "TC"),
            (m(5, 7, "A", "1"), "GA"),
            (m(5, 7, "T", "1"), "GT"),
            (m(5, 7, "C", "1"), "GC"),
            (m(6, 8, "A", "1"), "CA"),
            (m(6, 8, "T", "1"), "CT"),
            (m(6, 8, "G", "1"), "CG"),
            (m(3, 6, "", ""), "multinuc_deletion"),
            (m(1, 2, "AA", "12"), "multinuc_insertion"),
            (m(1, 4, "TG", "12"), "multinuc_mismatch"),
        ];
        for (mutation, expected) in cases {
            assert_eq!(mutation.classify(seq, 0).unwrap().to_string(), expected);
        }
    }

    #[test]
    fn test_classify_nonzero_target_pos() {
        // same mutations against the target with its first base trimmed
        let seq = "TGCATGC";
        assert_eq!(m(3, 5, "", "").classify(seq, 1).unwrap().to_string(), "A-");
        assert_eq!(m(6, 8, "G", "1").classify(seq, 1).unwrap().to_string(), "CG");
    }

    #[test]
    fn test_classify_n_match() {
        assert_eq!(m(3, 5, "N", "H").classify("ATGCATGC", 0).unwrap(), MutationClass::NMatch);
    }

    #[test]
    fn test_classify_complex() {
        assert_eq!(
            m(0, 4, "TG", "12").classify("ATGCATGC", 0).unwrap(),
            MutationClass::ComplexDeletion
        );
        assert_eq!(
            m(0, 3, "TGCA", "1234").classify("ATGCATGC", 0).unwrap(),
            MutationClass::ComplexInsertion
        );
    }

    #[test]
    fn test_classify_outside_target_is_error() {
        assert!(m(20, 22, "", "").classify("ATGC", 0).is_err());
    }

    #[test]
    fn test_is_n_match_by_shape() {
        assert!(m(3, 5, "N", "H").is_n_match());
        let mut classified = m(3, 5, "N", "H");
        classified.tag = Some(MutationClass::NMatch);
        assert!(classified.is_n_match());
        assert!(!m(3, 5, "G", "H").is_n_match()); // ordinary mismatch
        assert!(!m(3, 4, "N", "H").is_n_match()); // inserted N, span 0
        assert!(!m(3, 6, "NN", "HH").is_n_match()); // multi-base span
    }

    #[test]
    fn test_ambiguity_flags() {
        assert!(m(2, 9, "CC", "12").is_ambiguous()); // span 6, replacement 2
        assert!(m(2, 5, "CGCGCG", "123456").is_ambiguous()); // span 2, replacement 6
        assert!(!m(2, 4, "G", "1").is_ambiguous()); // plain mismatch
        assert!(!m(2, 4, "", "").is_ambiguous()); // simple gap, unique placement
    }

    #[test]
    fn test_to_field_round_trip() {
        let mut mutation = m(5, 9, "CCT", "HHH");
        mutation.tag = Some(MutationClass::MultinucMismatch);
        mutation.ambig = true;
        let field = mutation.to_field();
        assert_eq!(field, "5 9 \"CCT\" \"HHH\" \"multinuc_mismatch_ambig\"");
        let parsed = mutations_from_str(&field).unwrap();
        assert_eq!(parsed, vec![mutation]);
    }

    #[test]
    fn test_unclassified_ambig_tag_round_trip() {
        let mut mutation = m(2, 7, "", "");
        mutation.ambig = true;
        assert_eq!(mutation.to_field(), "2 7 \"\" \"\" \"_ambig\"");
        let parsed = mutations_from_str(&mutation.to_field()).unwrap();
        assert!(parsed[0].ambig);
        assert!(parsed[0].tag.is_none());
    }

    #[test]
    fn test_mutations_from_str_incomplete() {
        assert!(mutations_from_str("1 3 \"\" \"\"").is_err());
    }

    #[test]
    fn test_mutations_from_str_empty() {
        assert!(mutations_from_str("").unwrap().is_empty());
        assert!(mutations_from_str("   ").unwrap().is_empty());
    }

    #[test]
    fn test_class_list_order() {
        let classes = mutation_classes();
        assert_eq!(classes.len(), 26);
        assert_eq!(classes[0].to_string(), "A-");
        assert_eq!(classes[8].to_string(), "-N");
        assert_eq!(classes[25].to_string(), "complex_insertion");
    }
}
