//! `count` command implementation.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use log::info;

use mutscan_lib::pipeline::{count_mutations, CountConfig};

use super::command::Command;

/// Counts sequencing depth, sequence variants, and mutations per position
#[derive(Parser, Debug)]
#[command(
    name = "count",
    about = "Count mutations, depths, and sequence variants per position",
    long_about = "\
Accumulates parsed-mutation records (from `mutscan parse`) into per-position
tables: mutation counts by class alongside read depths, and/or sequence
variant tallies. With a reference length, output tables are guaranteed one
row per reference position even across uncovered regions."
)]
pub struct CountMutations {
    /// Parsed mutations input file path(s)
    #[arg(short = 'i', long = "in", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Reference sequence length; if provided, output files have this many
    /// rows even across regions with no coverage
    #[arg(short = 'n', long = "length", default_value_t = 0)]
    pub length: i32,

    /// Number of amplicon primer pairs used for mapping filters; splits the
    /// mapped-depth column per amplicon
    #[arg(short = 'p', long = "n-primer-pairs", default_value_t = 0)]
    pub n_primer_pairs: i32,

    /// Sequence variant counts output file path
    #[arg(short = 'v', long = "variant-out")]
    pub variant_out: Option<PathBuf>,

    /// Mutation counts output file path
    #[arg(short = 'c', long = "count-out")]
    pub count_out: Option<PathBuf>,

    /// Print read-length and mutations-per-read histogram tables
    #[arg(long)]
    pub hist: bool,

    /// Inputs are sorted by leftmost alignment position; stream rows out and
    /// keep memory bounded to the open window
    #[arg(short = 's', long)]
    pub input_is_sorted: bool,

    /// Count ambiguously-aligned-derived mutations in separate columns
    #[arg(long)]
    pub separate_ambig_counts: bool,

    /// Print debugging information
    #[arg(long)]
    pub debug: bool,

    /// Exit with a warning instead of an error if no reads are present
    #[arg(short = 'w', long)]
    pub warn_on_no_mapped: bool,
}

impl Command for CountMutations {
    fn execute(&self) -> Result<()> {
        if self.variant_out.is_none() && self.count_out.is_none() {
            bail!("must include at least one output file.");
        }

        info!("Counting from parsed mutations file(s):");
        for path in &self.inputs {
            info!("  {}", path.display());
        }
        info!("  ({})", if self.input_is_sorted { "sorted" } else { "unsorted" });
        if self.length > 0 {
            info!("  reference sequence length {}", self.length);
        }
        if self.n_primer_pairs > 0 {
            info!("  {} amplicon primer pairs", self.n_primer_pairs);
        }
        if let Some(path) = &self.variant_out {
            info!("  writing sequence variants and counts to {}", path.display());
        }
        if let Some(path) = &self.count_out {
            info!("  writing mutation counts to {}", path.display());
        }
        if self.separate_ambig_counts {
            info!("  counting ambiguous mutations in separate columns");
        }

        let config = CountConfig {
            inputs: self.inputs.clone(),
            seq_len: self.length,
            primer_pairs: self.n_primer_pairs,
            variant_out: self.variant_out.clone(),
            count_out: self.count_out.clone(),
            hist: self.hist,
            input_is_sorted: self.input_is_sorted,
            separate_ambig_counts: self.separate_ambig_counts,
            warn_on_no_mapped: self.warn_on_no_mapped,
        };

        let counted = count_mutations(&config)?;
        info!("Successfully counted mutations from {counted} records.");
        Ok(())
    }
}
