//! File-level drivers behind the two subcommands.
//!
//! [`parse_sam_file`] streams alignment records, pairs up concordant mates,
//! applies mapping filters and primer matching, runs each record through
//! mutation processing, and writes one intermediate line per surviving
//! record. [`count_mutations`] streams intermediate lines into the scanning
//! accumulators and writes the tabular outputs.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use log::debug;

use crate::counter::{ColumnLayout, MutationCounter, VariantCounter};
use crate::errors::{MutScanError, Result};
use crate::io;
use crate::mutation::NO_ASSOCIATED_PRIMER_PAIR;
use crate::primer::{
    find_closest_primers, find_overlapping_primers, is_off_target_paired_read,
    is_off_target_unpaired_read, load_primer_pairs, PrimerPair,
};
use crate::process::{process_mutations, ProcessOptions};
use crate::read::{merge_mate_pairs_simple, MappingCategory, Read, ReadType, Strand};
use crate::sam::{is_concordant, parse_flags, parse_sam_line};

/// Configuration for the alignment-parsing driver.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub debug_out: Option<PathBuf>,
    pub primers: Option<PathBuf>,
    pub max_paired_fragment_length: i32,
    pub min_mapq: i32,
    pub input_is_unpaired: bool,
    pub require_forward_primer_mapped: bool,
    pub require_reverse_primer_mapped: bool,
    pub max_primer_offset: i32,
    pub warn_on_no_mapped: bool,
    pub options: ProcessOptions,
}

struct ParseDriver {
    config: ParseConfig,
    primer_pairs: Vec<PrimerPair>,
    debug_out: Option<Box<dyn Write + Send>>,
}

impl ParseDriver {
    fn dump(&mut self, stage: &str, read: &Read) {
        if let Some(out) = &mut self.debug_out {
            let _ = writeln!(out, "{stage}\n{read}");
        }
    }

    /// Processes a single read: merged, truly unpaired, or one mate whose
    /// partner is discordant or missing.
    fn parse_unpaired_read(&mut self, line: &str) -> Result<String> {
        let mut read = parse_sam_line(
            line,
            self.config.min_mapq,
            self.config.input_is_unpaired,
            self.config.options.variant_mode,
        )?;
        self.dump("parsed alignment", &read);

        match read.mapping_category {
            MappingCategory::Unmapped => return Ok(String::new()),
            MappingCategory::LowMapq => return Ok(read.serialize() + "\n"),
            _ => {}
        }

        let (fw_index, rv_index) = find_closest_primers(
            read.left,
            read.right,
            &self.primer_pairs,
            self.config.max_primer_offset,
        );

        let off_target = match read.read_type {
            ReadType::Unpaired | ReadType::Merged => is_off_target_unpaired_read(
                fw_index,
                rv_index,
                self.config.require_forward_primer_mapped,
                self.config.require_reverse_primer_mapped,
            ),
            _ => {
                // one mate of a pair: only the primer on its own fragment end
                // can be required (a good R1 may simply have lost its mate)
                let (require_fw, require_rv) = match read.strand {
                    Strand::Reverse => (false, self.config.require_reverse_primer_mapped),
                    _ => (self.config.require_forward_primer_mapped, false),
                };
                is_off_target_paired_read(fw_index, rv_index, require_fw, require_rv)
            }
        };
        if off_target {
            read.mapping_category = MappingCategory::OffTarget;
            return Ok(read.serialize() + "\n");
        }

        read.primer_pair = fw_index.max(rv_index);
        // when no pair matched within the offset, relax to any overlapping
        // primer so the trim step still has a range to work with
        let mut trim_index = read.primer_pair;
        if trim_index == NO_ASSOCIATED_PRIMER_PAIR {
            trim_index = find_overlapping_primers(read.left, read.right, &self.primer_pairs);
        }
        let primer_pair = usize::try_from(trim_index)
            .ok()
            .and_then(|i| self.primer_pairs.get(i).copied())
            .unwrap_or_default();

        let read_type = read.read_type;
        let mapping_category = read.mapping_category;
        let mapped_depth = read.mapped_depth.clone();
        let matched_pair = read.primer_pair;

        let mut processed = process_mutations(vec![read], &self.config.options, &primer_pair)?;
        processed.read_type = read_type;
        processed.mapping_category = mapping_category;
        processed.mapped_depth = mapped_depth;
        processed.primer_pair = matched_pair;
        self.dump("processed mutations", &processed);
        Ok(processed.serialize() + "\n")
    }

    /// Processes a buffered R1/R2 pair.
    fn parse_paired_reads(&mut self, lines: &[String; 2]) -> Result<String> {
        let mut reads = Vec::with_capacity(2);
        for line in lines {
            reads.push(parse_sam_line(
                line,
                self.config.min_mapq,
                false,
                self.config.options.variant_mode,
            )?);
        }
        for read in &reads {
            self.dump("parsed alignment", read);
        }

        if reads[0].mapping_category == MappingCategory::Unmapped
            && reads[1].mapping_category == MappingCategory::Unmapped
        {
            return Ok(String::new());
        }

        let pair: [Read; 2] = reads.try_into().expect("two lines buffered");
        if pair[0].mapping_category == MappingCategory::LowMapq
            && pair[1].mapping_category == MappingCategory::LowMapq
        {
            let mut simple = merge_mate_pairs_simple(&pair);
            simple.mapping_category = MappingCategory::LowMapq;
            return Ok(simple.serialize() + "\n");
        }

        let both_included = pair
            .iter()
            .all(|r| r.mapping_category == MappingCategory::Included);
        let concordant =
            both_included && is_concordant(&pair, self.config.max_paired_fragment_length);

        if concordant {
            let (fw_read, rv_read) = if pair[0].strand == Strand::Reverse {
                (&pair[1], &pair[0])
            } else {
                (&pair[0], &pair[1])
            };
            let (fw_index, rv_index) = find_closest_primers(
                fw_read.left,
                rv_read.right,
                &self.primer_pairs,
                self.config.max_primer_offset,
            );
            if is_off_target_paired_read(
                fw_index,
                rv_index,
                self.config.require_forward_primer_mapped,
                self.config.require_reverse_primer_mapped,
            ) {
                let mut simple = merge_mate_pairs_simple(&pair);
                simple.mapping_category = MappingCategory::OffTarget;
                return Ok(simple.serialize() + "\n");
            }

            let matched_pair = fw_index.max(rv_index);
            let mut trim_index = matched_pair;
            if trim_index == NO_ASSOCIATED_PRIMER_PAIR {
                trim_index =
                    find_overlapping_primers(fw_read.left, rv_read.right, &self.primer_pairs);
            }
            let primer_pair = usize::try_from(trim_index)
                .ok()
                .and_then(|i| self.primer_pairs.get(i).copied())
                .unwrap_or_default();

            let mut pair = pair;
            for read in &mut pair {
                read.primer_pair = matched_pair;
            }
            let mut processed =
                process_mutations(pair.into(), &self.config.options, &primer_pair)?;
            processed.read_type = ReadType::Paired;
            self.dump("processed mutations", &processed);
            Ok(processed.serialize() + "\n")
        } else {
            // discordant or half-filtered pair: each mate stands alone
            let mut out = String::new();
            for mut read in pair {
                read.read_type = match read.read_type {
                    ReadType::PairedR1 => ReadType::UnpairedR1,
                    ReadType::PairedR2 => ReadType::UnpairedR2,
                    other => other,
                };
                if read.mapping_category == MappingCategory::Unmapped {
                    continue;
                }
                if read.mapping_category == MappingCategory::LowMapq {
                    out.push_str(&read.serialize());
                    out.push('\n');
                    continue;
                }

                let (fw_index, rv_index) = find_closest_primers(
                    read.left,
                    read.right,
                    &self.primer_pairs,
                    self.config.max_primer_offset,
                );
                let (require_fw, require_rv) = match read.strand {
                    Strand::Reverse => (false, self.config.require_reverse_primer_mapped),
                    _ => (self.config.require_forward_primer_mapped, false),
                };
                if is_off_target_paired_read(fw_index, rv_index, require_fw, require_rv) {
                    read.mapping_category = MappingCategory::OffTarget;
                    out.push_str(&read.serialize());
                    out.push('\n');
                    continue;
                }

                read.primer_pair = fw_index.max(rv_index);
                let mut trim_index = read.primer_pair;
                if trim_index == NO_ASSOCIATED_PRIMER_PAIR {
                    trim_index =
                        find_overlapping_primers(read.left, read.right, &self.primer_pairs);
                }
                let primer_pair = usize::try_from(trim_index)
                    .ok()
                    .and_then(|i| self.primer_pairs.get(i).copied())
                    .unwrap_or_default();

                let read_type = read.read_type;
                let mapped_depth = read.mapped_depth.clone();
                let matched_pair = read.primer_pair;
                let mut processed =
                    process_mutations(vec![read], &self.config.options, &primer_pair)?;
                processed.read_type = read_type;
                processed.mapped_depth = mapped_depth;
                processed.primer_pair = matched_pair;
                self.dump("processed mutations", &processed);
                out.push_str(&processed.serialize());
                out.push('\n');
            }
            Ok(out)
        }
    }
}

/// Streams one alignment file through mutation parsing and processing.
///
/// Returns the number of records (reads or pairs) processed.
pub fn parse_sam_file(config: &ParseConfig) -> Result<u64> {
    let primer_pairs = match &config.primers {
        Some(path) => load_primer_pairs(path)?,
        None => Vec::new(),
    };

    let mut writer = io::writer(&config.output)?;
    if !io::check_not_empty(&config.input, config.warn_on_no_mapped)? {
        writer.flush()?;
        return Ok(0);
    }
    let reader = io::reader(&config.input)?;
    let debug_out = match &config.debug_out {
        Some(path) => Some(io::writer(path)?),
        None => None,
    };

    let mut driver = ParseDriver { config: config.clone(), primer_pairs, debug_out };

    let mut processed: u64 = 0;
    let mut pending: Vec<String> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() || line.starts_with('@') {
            continue;
        }
        let flag_field = line
            .split('\t')
            .nth(1)
            .ok_or_else(|| MutScanError::alignment("unable to parse incomplete line."))?;
        let flags = parse_flags(flag_field)?;

        let expects_mate = !driver.config.input_is_unpaired
            && flags.proper_pair
            && !flags.mate_unmapped;
        pending.push(line);

        if expects_mate && pending.len() < 2 {
            continue;
        }
        if expects_mate && pending.len() == 2 {
            let pair: [String; 2] = pending.drain(..).collect::<Vec<_>>().try_into().expect("two");
            let out = driver.parse_paired_reads(&pair)?;
            writer.write_all(out.as_bytes())?;
            processed += 1;
        } else {
            for buffered in pending.drain(..) {
                let out = driver.parse_unpaired_read(&buffered)?;
                writer.write_all(out.as_bytes())?;
                processed += 1;
            }
        }
    }
    // a final mate whose partner never arrived
    for buffered in pending.drain(..) {
        let out = driver.parse_unpaired_read(&buffered)?;
        writer.write_all(out.as_bytes())?;
        processed += 1;
    }
    writer.flush()?;

    if processed < 1 {
        if config.warn_on_no_mapped {
            log::warn!("Input file {} contains no mapped reads.", config.input.display());
        } else {
            return Err(MutScanError::InputFile {
                path: config.input.display().to_string(),
                reason: "contains no mapped reads.".to_string(),
            });
        }
    }
    Ok(processed)
}

/// Configuration for the counting driver.
#[derive(Debug, Clone)]
pub struct CountConfig {
    pub inputs: Vec<PathBuf>,
    /// Reference length; 0 means unknown (no row-count guarantee)
    pub seq_len: i32,
    /// Number of amplicon primer pairs used upstream, if any
    pub primer_pairs: i32,
    pub variant_out: Option<PathBuf>,
    pub count_out: Option<PathBuf>,
    pub hist: bool,
    pub input_is_sorted: bool,
    pub separate_ambig_counts: bool,
    pub warn_on_no_mapped: bool,
}

/// Streams parsed-mutation files into the accumulators and writes the
/// variant and/or count tables. Returns the number of records counted.
///
/// Multiple inputs are interleaved line-by-line so position-sorted shards
/// remain approximately sorted. In sorted mode rows are flushed as the left
/// boundary advances; otherwise everything renders at end-of-input.
pub fn count_mutations(config: &CountConfig) -> Result<u64> {
    let mut readers = Vec::new();
    for path in &config.inputs {
        io::check_not_empty(path, config.warn_on_no_mapped)?;
        readers.push(io::reader(path)?);
    }

    let mut variant_out = match &config.variant_out {
        Some(path) => Some(io::writer(path)?),
        None => None,
    };
    let mut count_out = match &config.count_out {
        Some(path) => Some(io::writer(path)?),
        None => None,
    };

    let mut vc = VariantCounter::new();
    let mut mc = MutationCounter::new(ColumnLayout::new(
        config.separate_ambig_counts,
        config.primer_pairs,
    ));
    if let Some(out) = &mut count_out {
        out.write_all(mc.print_header().as_bytes())?;
    }

    let mut count: u64 = 0;
    let mut done = vec![false; readers.len()];
    while !done.iter().all(|&d| d) {
        let mut round = Vec::new();
        for (i, reader) in readers.iter_mut().enumerate() {
            if done[i] {
                continue;
            }
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                done[i] = true;
            } else {
                round.push(line);
            }
        }
        for line in round {
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            count += 1;
            debug!("record {count}: {trimmed}");
            let read = Read::parse_processed(trimmed)?;

            if variant_out.is_some() {
                vc.update_right_bound(read.right);
            }
            if count_out.is_some() {
                mc.update_right_bound(read.right);
            }
            if config.input_is_sorted {
                if let Some(out) = &mut variant_out {
                    out.write_all(vc.update_left_bound(read.left).as_bytes())?;
                }
                if let Some(out) = &mut count_out {
                    out.write_all(mc.update_left_bound(read.left).as_bytes())?;
                }
            }
            if variant_out.is_some() {
                vc.update_counts(&read);
            }
            if count_out.is_some() {
                mc.update_counts(&read);
            }
        }
    }

    if count < 1 {
        if config.warn_on_no_mapped {
            log::warn!("No reads were found in the input files.");
        } else {
            return Err(MutScanError::intermediate("Input files contained no reads."));
        }
    }

    // pad the windows to the full reference so both tables reach the
    // expected number of rows even with uncovered 3' ends
    if config.seq_len > 0 {
        vc.update_right_bound(config.seq_len - 1);
        mc.update_right_bound(config.seq_len - 1);
    }
    if let Some(out) = &mut variant_out {
        out.write_all(vc.print_all_values().as_bytes())?;
        out.flush()?;
    }
    if let Some(out) = &mut count_out {
        out.write_all(mc.print_all_values().as_bytes())?;
        out.flush()?;
    }

    if config.hist {
        print!("{}", mc.print_histograms());
    }
    Ok(count)
}
