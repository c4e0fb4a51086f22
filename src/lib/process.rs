//! Per-record processing: merge, trim, realign, collapse, classify, filter.

use crate::ambig::shift_ambig_indels;
use crate::errors::Result;
use crate::filter::MutationTypeFilter;
use crate::merge::merge_mate_pairs;
use crate::primer::PrimerPair;
use crate::read::Read;

/// Knobs controlling per-read mutation processing.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Realign ambiguous deletions to their right-most placement
    pub right_align_ambig_dels: bool,
    /// Realign ambiguous insertions to their right-most placement
    pub right_align_ambig_ins: bool,
    /// Merge mutations separated by up to this many unchanged bases
    pub max_internal_match: i32,
    /// Minimum Phred score for basecalls in and around mutations
    pub min_qual: i32,
    /// Exclude this many bases at a read's 3′ end
    pub exclude_3prime: i32,
    /// Count only mutations of one category
    pub mutation_type: Option<MutationTypeFilter>,
    /// Sequence-variant mode: skip realignment and collapsing
    pub variant_mode: bool,
    /// Trim matched amplicon primer sites instead of a fixed 3′ length
    pub trim_primers: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        ProcessOptions {
            right_align_ambig_dels: false,
            right_align_ambig_ins: false,
            max_internal_match: 7,
            min_qual: 30,
            exclude_3prime: 0,
            mutation_type: None,
            variant_mode: false,
            trim_primers: false,
        }
    }
}

impl Read {
    /// Realigns this read's ambiguous indels to one edge.
    pub fn shift_ambig_indels(
        &mut self,
        right_align_ambig_dels: bool,
        right_align_ambig_ins: bool,
    ) -> &mut Self {
        self.mutations = shift_ambig_indels(
            &self.mutations,
            &self.seq,
            self.left,
            right_align_ambig_dels,
            right_align_ambig_ins,
        );
        self
    }

    /// Classifies every unclassified mutation against this read's slice.
    pub fn classify_mutations(&mut self) -> Result<&mut Self> {
        for m in &mut self.mutations {
            if m.tag.is_none() {
                m.tag = Some(m.classify(&self.seq, self.left)?);
            }
        }
        Ok(self)
    }
}

/// Runs one read (or a concordant mate pair) through the processing stages.
///
/// Pairs are merged first, before any trimming, so that conflict resolution
/// sees both mates' original calls. Variant mode skips ambiguous-indel
/// realignment and collapsing; both obscure variant frequencies.
pub fn process_mutations(
    reads: Vec<Read>,
    options: &ProcessOptions,
    primer_pair: &PrimerPair,
) -> Result<Read> {
    let mut read = if reads.len() == 2 {
        let pair: [Read; 2] = reads.try_into().expect("length checked");
        merge_mate_pairs(&pair)
    } else {
        let mut read = reads.into_iter().next().ok_or_else(|| {
            crate::errors::MutScanError::LogicInvariant {
                reason: "process_mutations called with no reads".to_string(),
            }
        })?;
        read.depth = read.mapped_depth.clone();
        read
    };

    if options.trim_primers {
        read.strip_primers(primer_pair);
    } else {
        read.trim_right_end(options.exclude_3prime);
    }

    if !options.variant_mode {
        read.shift_ambig_indels(options.right_align_ambig_dels, options.right_align_ambig_ins);
        read.collapse_mutations(options.max_internal_match);
    }

    read.classify_mutations()?;
    read.filter_qscores_count_depths(options.min_qual, options.mutation_type, options.variant_mode);

    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{mutations_to_string, Mutation};
    use crate::read::{ReadType, Strand};
    use crate::util::bools_to_string;

    fn test_read(left: i32, right: i32, seq: &str, qual: &str, mutations: Vec<Mutation>) -> Read {
        let mut read = Read::new(left, right, seq);
        read.id = "test".to_string();
        read.read_type = ReadType::Unpaired;
        read.strand = Strand::Forward;
        read.qual = qual.to_string();
        read.mutations = mutations;
        read.mapped_depth = vec![true; seq.len()];
        read
    }

    fn options(min_qual: i32) -> ProcessOptions {
        ProcessOptions {
            max_internal_match: 0,
            min_qual,
            exclude_3prime: 1,
            ..ProcessOptions::default()
        }
    }

    #[test]
    fn test_quality_filtering_thresholds() {
        // aligned read A-TTGGCCTTGCCGTA with an insert CA after position 3
        let mutations = vec![
            Mutation::new(0, 2, "", ""),
            Mutation::new(3, 4, "CA", "H!"),
            Mutation::new(7, 9, "T", "#"),
        ];
        let seq = "AATTGGCCATGCCGTA";
        let qual = "H!HHHHHH#HHHHHHH";

        let read = process_mutations(
            vec![test_read(0, 15, seq, qual, mutations.clone())],
            &options(0),
            &PrimerPair::default(),
        )
        .unwrap();
        assert_eq!(
            mutations_to_string(&read.mutations),
            r##"0 2 "" "" "A-" 3 4 "CA" "H!" "multinuc_insertion" 7 9 "T" "#" "AT""##
        );
        assert_eq!(bools_to_string(&read.depth), "1111111111111111");
        assert_eq!(bools_to_string(&read.count), "0101000010000000");

        let read = process_mutations(
            vec![test_read(0, 15, seq, qual, mutations.clone())],
            &options(2),
            &PrimerPair::default(),
        )
        .unwrap();
        assert_eq!(
            mutations_to_string(&read.mutations),
            r##"0 2 "" "" "A-" 7 9 "T" "#" "AT""##
        );
        assert_eq!(bools_to_string(&read.depth), "1111011111111111");
        assert_eq!(bools_to_string(&read.count), "0100000010000000");

        let read = process_mutations(
            vec![test_read(0, 15, seq, qual, mutations)],
            &options(40),
            &PrimerPair::default(),
        )
        .unwrap();
        assert!(read.mutations.is_empty());
        assert_eq!(bools_to_string(&read.depth), "0000000000000000");
        assert_eq!(bools_to_string(&read.count), "0000000000000000");
    }

    #[test]
    fn test_quality_filtering_neighbors() {
        let mutations = vec![
            Mutation::new(0, 2, "", ""),
            Mutation::new(3, 4, "CA", "HH"),
            Mutation::new(7, 9, "T", "H"),
        ];
        let seq = "AATTGGCCATGCCGTA";
        let qual = "!!!!!HH#H#HHHHHH";

        let read = process_mutations(
            vec![test_read(0, 15, seq, qual, mutations.clone())],
            &options(2),
            &PrimerPair::default(),
        )
        .unwrap();
        assert_eq!(mutations_to_string(&read.mutations), r#"7 9 "T" "H" "AT""#);
        assert_eq!(bools_to_string(&read.depth), "0000001111111111");
        assert_eq!(bools_to_string(&read.count), "0000000010000000");
    }

    #[test]
    fn test_n_basecall_near_mutation_stays_standalone() {
        // an N call within merging distance of a real mismatch must not be
        // absorbed into a multi-base mutation; it is classified N_match and
        // stays out of counting
        let mutations = vec![Mutation::new(1, 3, "C", "H"), Mutation::new(3, 5, "N", "H")];
        let mut opts = options(0);
        opts.max_internal_match = 6;
        let read = process_mutations(
            vec![test_read(0, 9, "ATGCATGCAT", "HHHHHHHHHH", mutations)],
            &opts,
            &PrimerPair::default(),
        )
        .unwrap();
        assert_eq!(
            mutations_to_string(&read.mutations),
            r#"1 3 "C" "H" "GC" 3 5 "N" "H" "N_match""#
        );
    }

    #[test]
    fn test_variant_mode_skips_realignment_and_collapse() {
        // two nearby mismatches that normal mode would merge
        let mutations = vec![Mutation::new(1, 3, "C", "H"), Mutation::new(4, 6, "G", "H")];
        let seq = "ATGCATGCAT";
        let qual = "HHHHHHHHHH";
        let mut opts = options(0);
        opts.max_internal_match = 6;
        opts.variant_mode = true;
        let read = process_mutations(
            vec![test_read(0, 9, seq, qual, mutations.clone())],
            &opts,
            &PrimerPair::default(),
        )
        .unwrap();
        assert_eq!(read.mutations.len(), 2);

        opts.variant_mode = false;
        let read = process_mutations(
            vec![test_read(0, 9, seq, qual, mutations)],
            &opts,
            &PrimerPair::default(),
        )
        .unwrap();
        assert_eq!(read.mutations.len(), 1);
    }

    #[test]
    fn test_primer_trim_path() {
        let mutations = vec![Mutation::new(1, 3, "C", "H"), Mutation::new(7, 9, "T", "H")];
        let mut opts = options(0);
        opts.trim_primers = true;
        let pair = PrimerPair { fw_left: 0, fw_right: 3, rv_left: 13, rv_right: 15 };
        let read = process_mutations(
            vec![test_read(0, 15, "AATTGGCCATGCCGTA", "HHHHHHHHHHHHHHHH", mutations)],
            &opts,
            &pair,
        )
        .unwrap();
        // the mutation inside the forward primer is gone, depth masked at ends
        assert_eq!(read.mutations.len(), 1);
        assert_eq!(read.mutations[0].left, 7);
        assert_eq!(bools_to_string(&read.depth), "0000111111111000");
    }
}
