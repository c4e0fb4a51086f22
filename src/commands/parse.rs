//! `parse` command implementation.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use log::info;

use mutscan_lib::filter::MutationTypeFilter;
use mutscan_lib::pipeline::{parse_sam_file, ParseConfig};
use mutscan_lib::process::ProcessOptions;

use super::command::Command;

/// Parses mapped alignments into processed per-read mutations
#[derive(Parser, Debug)]
#[command(
    name = "parse",
    about = "Parse aligned reads into processed per-read mutations",
    long_about = "\
Parses mapped alignment records (SAM text, optionally gzip-compressed) into
per-read mutation lists in alignment-target coordinates. Each record is run
through ambiguous-indel identification, mate-pair merging, end or amplicon
primer trimming, nearby-mutation collapsing, classification, and basecall
quality filtering, then written as one tab-separated line ready for
`mutscan count`.

Input records from a paired run must keep mates adjacent (the aligner's
default output order); records mapped to one reference are processed at a
time."
)]
pub struct ParseMutations {
    /// Alignment input file path (.sam or .sam.gz)
    #[arg(short = 'i', long = "in")]
    pub input: PathBuf,

    /// Parsed mutations output file path (.gz compresses)
    #[arg(short = 'o', long = "out")]
    pub output: PathBuf,

    /// Intermediate per-stage debug info file path
    #[arg(short = 'd', long = "debug-out")]
    pub debug_out: Option<PathBuf>,

    /// Amplicon primer location file path
    #[arg(long)]
    pub primers: Option<PathBuf>,

    /// Treat paired reads mapping to a fragment size above this threshold as
    /// separate reads
    #[arg(long, default_value_t = 800)]
    pub max_paired_fragment_length: i32,

    /// Minimum reported mapping quality to allow
    #[arg(short = 'm', long, default_value_t = 30)]
    pub min_mapq: i32,

    /// Exclude mutations within this many nucleotides of a read's 3-prime end
    #[arg(long = "exclude-3prime", default_value_t = 0)]
    pub exclude_3prime: i32,

    /// Input reads are unpaired (as opposed to merged and/or paired reads)
    #[arg(long)]
    pub input_is_unpaired: bool,

    /// Trim amplicon primer sites given in --primers
    #[arg(long)]
    pub trim_primers: bool,

    /// Exclude reads whose left end is not near an expected forward primer
    #[arg(long)]
    pub require_forward_primer_mapped: bool,

    /// Exclude reads whose right end is not near an expected reverse primer
    #[arg(long)]
    pub require_reverse_primer_mapped: bool,

    /// Maximum distance between a mapped read end and its primer location
    #[arg(long, default_value_t = 0)]
    pub max_primer_offset: i32,

    /// Realign ambiguously placed deletions to their rightmost position
    /// (not recommended), otherwise leftmost
    #[arg(long)]
    pub right_align_ambig_dels: bool,

    /// Realign ambiguously placed insertions to their rightmost position
    /// (not recommended), otherwise leftmost
    #[arg(long)]
    pub right_align_ambig_ins: bool,

    /// Merge mutations with up to this many unchanged reference nucleotides
    /// between them
    #[arg(long, default_value_t = 7)]
    pub max_internal_match: i32,

    /// Exclude mutations containing or adjacent to basecalls below this
    /// Phred score; also applied to effective read depths
    #[arg(long, default_value_t = 30)]
    pub min_qual: i32,

    /// Use only mutations of one class (not recommended). Possible values:
    /// mismatch, insert, gap, insert_multi, gap_multi, complex
    #[arg(long)]
    pub use_only_mutation_type: Option<String>,

    /// Skip nearby-mutation merging and ambiguous-mutation realignment,
    /// simplifying sequence variant detection
    #[arg(short = 'v', long)]
    pub variant_mode: bool,

    /// Print debugging information
    #[arg(long)]
    pub debug: bool,

    /// Exit with a warning instead of an error if no mapped reads are present
    #[arg(short = 'w', long)]
    pub warn_on_no_mapped: bool,
}

impl Command for ParseMutations {
    fn execute(&self) -> Result<()> {
        let lowered = self.input.to_string_lossy().to_lowercase();
        if !(lowered.ends_with(".sam") || lowered.ends_with(".sam.gz")) {
            bail!(
                "Unable to determine file type of {}. Recognized extensions are .sam and .sam.gz \
                 (capitalization not important).",
                self.input.display()
            );
        }
        if self.min_mapq < 0 {
            bail!("min_mapq must be non-negative.");
        }
        let mutation_type = match &self.use_only_mutation_type {
            Some(name) => Some(
                MutationTypeFilter::parse(name)
                    .ok_or_else(|| anyhow::anyhow!("unrecognized mutation type \"{name}\""))?,
            ),
            None => None,
        };

        info!("Parsing alignments from {} into {}", self.input.display(), self.output.display());
        if let Some(path) = &self.debug_out {
            info!("  writing intermediate debug info to {}", path.display());
        }
        info!("  min_mapq={}", self.min_mapq);
        if self.input_is_unpaired {
            info!("  treating input reads as unpaired");
        } else {
            info!(
                "  treating input reads as merged and/or paired, max fragment size {}",
                self.max_paired_fragment_length
            );
        }
        if self.require_forward_primer_mapped {
            info!(
                "  requiring mapping near an expected forward primer within {} nt",
                self.max_primer_offset
            );
        }
        if self.require_reverse_primer_mapped {
            info!(
                "  requiring mapping near an expected reverse primer within {} nt",
                self.max_primer_offset
            );
        }
        if self.trim_primers {
            if let Some(path) = &self.primers {
                info!("  trimming amplicon primers from {}", path.display());
            }
        } else {
            info!("  trimming {} nt from read 3-prime ends", self.exclude_3prime);
        }
        info!("  sequence variant mode {}", if self.variant_mode { "on" } else { "off" });
        info!(
            "  ambiguously aligned deletions {}-aligned",
            if self.right_align_ambig_dels { "right" } else { "left" }
        );
        info!(
            "  ambiguously aligned insertions {}-aligned",
            if self.right_align_ambig_ins { "right" } else { "left" }
        );
        info!("  merging adjacent mutations within {} nt", self.max_internal_match);
        info!("  excluding mutations with basecall q-scores below {}", self.min_qual);
        if let Some(name) = &self.use_only_mutation_type {
            info!("  using only mutations of type {name}");
        }

        let config = ParseConfig {
            input: self.input.clone(),
            output: self.output.clone(),
            debug_out: self.debug_out.clone(),
            primers: self.primers.clone(),
            max_paired_fragment_length: self.max_paired_fragment_length,
            min_mapq: self.min_mapq,
            input_is_unpaired: self.input_is_unpaired,
            require_forward_primer_mapped: self.require_forward_primer_mapped,
            require_reverse_primer_mapped: self.require_reverse_primer_mapped,
            max_primer_offset: self.max_primer_offset,
            warn_on_no_mapped: self.warn_on_no_mapped,
            options: ProcessOptions {
                right_align_ambig_dels: self.right_align_ambig_dels,
                right_align_ambig_ins: self.right_align_ambig_ins,
                max_internal_match: self.max_internal_match,
                min_qual: self.min_qual,
                exclude_3prime: self.exclude_3prime,
                mutation_type,
                variant_mode: self.variant_mode,
                trim_primers: self.trim_primers,
            },
        };

        let processed = parse_sam_file(&config)?;
        info!("Successfully parsed mutations from {processed} records.");
        Ok(())
    }
}
