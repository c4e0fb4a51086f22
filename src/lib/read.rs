//! Per-read records flowing through the pipeline.
//!
//! A [`Read`] carries an aligned read (or merged mate pair) in alignment
//! target coordinates: the inclusive span `[left, right]`, the reconstructed
//! target sequence and quality over that span, three parallel depth bit
//! vectors, and the mutation list. Positions covered by neither mate of a
//! merged pair hold `_` in `seq` and `~` in `qual`; deleted positions hold
//! the target base with quality `!`.

use std::fmt;

use crate::errors::{MutScanError, Result};
use crate::mutation::{mutations_from_str, mutations_to_string, Mutation, NO_ASSOCIATED_PRIMER_PAIR};
use crate::util::{bools_to_string, string_to_bools};

/// Mapped strand of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strand {
    Forward,
    Reverse,
    #[default]
    Unspecified,
}

impl Strand {
    fn symbol(self) -> &'static str {
        match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
            Strand::Unspecified => "N/A",
        }
    }
}

/// Read type at the time of alignment.
///
/// `Merged` marks a read merged from its mates before alignment; `Paired`
/// marks a synthetic read built from two aligned mates after alignment.
/// `UnpairedR1`/`UnpairedR2` mark mates that were provided to the aligner as
/// a pair but ended up processed alone (discordant or filtered mate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadType {
    PairedR1,
    PairedR2,
    UnpairedR1,
    UnpairedR2,
    Unpaired,
    Merged,
    Paired,
    #[default]
    Unspecified,
}

impl ReadType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadType::PairedR1 => "PAIRED_R1",
            ReadType::PairedR2 => "PAIRED_R2",
            ReadType::UnpairedR1 => "UNPAIRED_R1",
            ReadType::UnpairedR2 => "UNPAIRED_R2",
            ReadType::Unpaired => "UNPAIRED",
            ReadType::Merged => "MERGED",
            ReadType::Paired => "PAIRED",
            ReadType::Unspecified => "UNSPECIFIED_READ_TYPE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PAIRED_R1" => Ok(ReadType::PairedR1),
            "PAIRED_R2" => Ok(ReadType::PairedR2),
            "UNPAIRED_R1" => Ok(ReadType::UnpairedR1),
            "UNPAIRED_R2" => Ok(ReadType::UnpairedR2),
            "UNPAIRED" => Ok(ReadType::Unpaired),
            "MERGED" => Ok(ReadType::Merged),
            "PAIRED" => Ok(ReadType::Paired),
            "UNSPECIFIED_READ_TYPE" => Ok(ReadType::Unspecified),
            _ => Err(MutScanError::intermediate(format!("unrecognized read type \"{s}\""))),
        }
    }
}

/// Why a read was or was not included in mutation counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingCategory {
    #[default]
    Included,
    LowMapq,
    OffTarget,
    Unmapped,
}

impl MappingCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MappingCategory::Included => "INCLUDED",
            MappingCategory::LowMapq => "LOW_MAPQ",
            MappingCategory::OffTarget => "OFF_TARGET",
            MappingCategory::Unmapped => "UNMAPPED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "INCLUDED" => Ok(MappingCategory::Included),
            "LOW_MAPQ" => Ok(MappingCategory::LowMapq),
            "OFF_TARGET" => Ok(MappingCategory::OffTarget),
            "UNMAPPED" => Ok(MappingCategory::Unmapped),
            _ => Err(MutScanError::intermediate(format!("unrecognized mapping category \"{s}\""))),
        }
    }
}

/// One aligned read (or merged pair) and everything derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Read {
    pub id: String,
    /// Leftmost aligned target position, 0-based inclusive
    pub left: i32,
    /// Rightmost aligned target position, 0-based inclusive
    pub right: i32,
    pub strand: Strand,
    pub read_type: ReadType,
    pub mapping_category: MappingCategory,
    /// Associated amplicon primer pair index; negative when none
    pub primer_pair: i32,
    /// Reconstructed target sequence over `[left, right]`
    pub seq: String,
    /// Read qualities over `[left, right]` (`!` in deletions, `~` between mates)
    pub qual: String,
    /// Raw end-to-end coverage, one bit per position in `[left, right]`
    pub mapped_depth: Vec<bool>,
    /// Quality-trusted coverage after trimming and filtering
    pub depth: Vec<bool>,
    /// Inferred adduct positions after filtering
    pub count: Vec<bool>,
    /// Mutations sorted by `(left, right, seq, qual)`
    pub mutations: Vec<Mutation>,
}

impl Read {
    /// Creates a read over `[left, right]` with the given target slice.
    pub fn new(left: i32, right: i32, seq: impl Into<String>) -> Self {
        Read {
            left,
            right,
            seq: seq.into(),
            primer_pair: NO_ASSOCIATED_PRIMER_PAIR,
            ..Read::default()
        }
    }

    /// Aligned span length; zero when the bounds are inverted.
    pub fn span_len(&self) -> usize {
        usize::try_from(self.right - self.left + 1).unwrap_or(0)
    }

    /// Serializes the ten-field per-read intermediate record.
    pub fn serialize(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.read_type.as_str(),
            self.id,
            self.left,
            self.right,
            self.mapping_category.as_str(),
            self.primer_pair,
            bools_to_string(&self.mapped_depth),
            bools_to_string(&self.depth),
            bools_to_string(&self.count),
            mutations_to_string(&self.mutations),
        )
    }

    /// Parses a ten-field per-read intermediate record.
    pub fn parse_processed(line: &str) -> Result<Read> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = trimmed.split('\t').collect();
        if fields.len() < 10 {
            return Err(MutScanError::intermediate(format!(
                "unable to parse incomplete line. Trimmed line: '{trimmed}'"
            )));
        }
        let position_err = || {
            MutScanError::intermediate(format!(
                "line is incorrectly formatted (couldn't parse left or right position). Trimmed line: '{trimmed}'"
            ))
        };
        let mut read = Read::new(
            fields[2].parse().map_err(|_| position_err())?,
            fields[3].parse().map_err(|_| position_err())?,
            "",
        );
        read.read_type = ReadType::parse(fields[0])?;
        read.id = fields[1].to_string();
        read.mapping_category = MappingCategory::parse(fields[4])?;
        read.primer_pair = fields[5].parse().map_err(|_| position_err())?;
        read.mapped_depth = string_to_bools(fields[6]);
        read.depth = string_to_bools(fields[7]);
        read.count = string_to_bools(fields[8]);
        read.mutations = mutations_from_str(fields[9])?;
        Ok(read)
    }
}

impl fmt::Display for Read {
    /// Debug rendering used by the per-stage dump.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[read]\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.read_type.as_str(),
            self.left,
            self.right,
            self.strand.symbol(),
            self.mapping_category.as_str(),
            self.primer_pair,
            self.seq,
            self.qual,
            bools_to_string(&self.mapped_depth),
            bools_to_string(&self.depth),
            bools_to_string(&self.count),
            mutations_to_string(&self.mutations),
        )
    }
}

/// Merges two mates into a coverage-only record spanning their union.
///
/// Used for pairs excluded from mutation counting (off-target or low mapping
/// quality) so their mapped depth is still tabulated. No sequence or
/// mutations are carried.
pub fn merge_mate_pairs_simple(reads: &[Read; 2]) -> Read {
    let (fw, rv) = if reads[0].strand == Strand::Reverse && reads[1].strand == Strand::Forward {
        (&reads[1], &reads[0])
    } else {
        (&reads[0], &reads[1])
    };
    let left = fw.left.min(rv.left);
    let right = fw.right.max(rv.right);
    let len = usize::try_from(right - left + 1).unwrap_or(0);
    let mut mapped_depth = vec![false; len];
    let fw_len = fw.span_len().min(len);
    let rv_len = rv.span_len().min(len);
    mapped_depth[..fw_len].fill(true);
    mapped_depth[len - rv_len..].fill(true);

    let mut merged = Read::new(left, right, "");
    merged.read_type = ReadType::Paired;
    merged.id = reads[0].id.clone();
    merged.mapped_depth = mapped_depth;
    merged
}
