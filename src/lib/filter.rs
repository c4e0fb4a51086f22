//! Basecall-quality filtering and effective depth/count marking.
//!
//! Works position-by-position over a read's aligned span. Positions whose own
//! basecall or either neighboring basecall is untrusted drop out of the
//! effective depth; mutations containing or bracketed by untrusted basecalls
//! are excluded and their span removed from the depth. A surviving mutation
//! collapses to its inferred adduct position (the rightmost changed base) in
//! normal mode, or keeps its whole span in variant mode.

use crate::mutation::{Mutation, MutationClass};
use crate::read::Read;
use crate::util::byte_at;

/// Restriction of counting to one mutation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationTypeFilter {
    Mismatch,
    Insert,
    Gap,
    InsertMulti,
    GapMulti,
    Complex,
}

impl MutationTypeFilter {
    /// Parses the command-line spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mismatch" => Some(MutationTypeFilter::Mismatch),
            "insert" => Some(MutationTypeFilter::Insert),
            "gap" => Some(MutationTypeFilter::Gap),
            "insert_multi" => Some(MutationTypeFilter::InsertMulti),
            "gap_multi" => Some(MutationTypeFilter::GapMulti),
            "complex" => Some(MutationTypeFilter::Complex),
            _ => None,
        }
    }

    /// Whether a classified mutation belongs to this category.
    fn admits(self, tag: Option<MutationClass>) -> bool {
        match self {
            MutationTypeFilter::Mismatch => matches!(
                tag,
                Some(MutationClass::Mismatch(_, _)) | Some(MutationClass::MultinucMismatch)
            ),
            MutationTypeFilter::Insert => matches!(tag, Some(MutationClass::Insert(_))),
            MutationTypeFilter::Gap => matches!(tag, Some(MutationClass::Gap(_))),
            MutationTypeFilter::InsertMulti => tag == Some(MutationClass::MultinucInsertion),
            MutationTypeFilter::GapMulti => tag == Some(MutationClass::MultinucDeletion),
            MutationTypeFilter::Complex => matches!(
                tag,
                Some(MutationClass::ComplexDeletion) | Some(MutationClass::ComplexInsertion)
            ),
        }
    }
}

/// Outputs of the quality filter.
pub struct FilterResult {
    pub effective_depth: Vec<bool>,
    pub effective_count: Vec<bool>,
    pub included_mutations: Vec<Mutation>,
    pub excluded_mutations: Vec<Mutation>,
}

/// Applies quality filtering over one read.
///
/// `qual` holds the read's qualities over its target slice, `effective_depth`
/// the depth after trimming, and `left` the target coordinate of index 0. The
/// quality sentinel `~` marks unobserved positions between mates and always
/// fails.
pub fn filter_qscores_count_depths(
    mutations: &[Mutation],
    qual: &str,
    effective_depth: &[bool],
    left: i32,
    min_qual: i32,
    mutation_type: Option<MutationTypeFilter>,
    variant_mode: bool,
) -> FilterResult {
    let len = qual.len();
    let mut depth = effective_depth.to_vec();

    let bad = |q: u8| (q as i32) - 33 < min_qual || q == b'~';
    // absent neighbors (off either end of the read) never fail
    let bad_at = |pos: i32| byte_at(qual, pos).is_some_and(bad);

    // index mutations by their bracketing unchanged positions so neighbor
    // lookups stay constant-time
    let mut left_mut_indices: Vec<i32> = vec![-1; len];
    let mut right_mut_indices: Vec<i32> = vec![-1; len];
    let mut in_mutation = vec![false; len];
    for (i, m) in mutations.iter().enumerate() {
        if let Some(slot) =
            usize::try_from(m.left - left).ok().and_then(|k| left_mut_indices.get_mut(k))
        {
            *slot = i as i32;
        }
        if let Some(slot) =
            usize::try_from(m.right - left).ok().and_then(|k| right_mut_indices.get_mut(k))
        {
            *slot = i as i32;
        }
        for n in (m.left + 1 - left)..(m.right - left) {
            if let Some(slot) = usize::try_from(n).ok().and_then(|k| in_mutation.get_mut(k)) {
                *slot = true;
            }
        }
    }

    // quality of the basecall a bracketing mutation presents toward a
    // position: its nearest replacement base, or the basecall across a gap
    let facing_qual = |m: &Mutation, from_right: bool| -> Option<u8> {
        if !m.qual.is_empty() {
            if from_right {
                m.qual.as_bytes().last().copied()
            } else {
                m.qual.as_bytes().first().copied()
            }
        } else if from_right {
            byte_at(qual, m.left - left)
        } else {
            byte_at(qual, m.right - left)
        }
    };

    // pass A: positions outside any mutation
    for i in 0..len {
        if in_mutation[i] {
            continue;
        }
        let mut is_bad = bad(qual.as_bytes()[i]);
        if !is_bad {
            is_bad = match right_mut_indices[i] {
                -1 => bad_at(i as i32 - 1),
                k => facing_qual(&mutations[k as usize], true).is_some_and(bad),
            };
        }
        if !is_bad {
            is_bad = match left_mut_indices[i] {
                -1 => bad_at(i as i32 + 1),
                k => facing_qual(&mutations[k as usize], false).is_some_and(bad),
            };
        }
        if is_bad && depth[i] {
            depth[i] = false;
        }
    }

    // pass B: the mutations themselves
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for (i, m) in mutations.iter().enumerate() {
        let mut is_bad = match mutation_type {
            Some(filter) => !filter.admits(m.tag),
            None => false,
        };

        if !is_bad {
            is_bad = m.qual.bytes().any(bad);
        }
        if !is_bad {
            // neighbor on the left: an adjacent mutation if one ends at the
            // base just inside this one, otherwise the bracketing basecall
            if let Some(k) = usize::try_from(m.left + 1 - left)
                .ok()
                .and_then(|k| right_mut_indices.get(k).copied())
            {
                if k != -1 && k != i as i32 {
                    is_bad = facing_qual(&mutations[k as usize], true).is_some_and(bad);
                } else {
                    is_bad = bad_at(m.left - left);
                }
            }
        }
        if !is_bad {
            // neighbor on the right
            if let Some(k) = usize::try_from(m.right - 1 - left)
                .ok()
                .and_then(|k| left_mut_indices.get(k).copied())
            {
                if k != -1 && k != i as i32 {
                    is_bad = facing_qual(&mutations[k as usize], false).is_some_and(bad);
                } else {
                    is_bad = bad_at(m.right - left);
                }
            }
        }

        if is_bad {
            for n in (m.left + 1 - left)..(m.right - left) {
                if let Some(slot) = usize::try_from(n).ok().and_then(|k| depth.get_mut(k)) {
                    *slot = false;
                }
            }
            excluded.push(m.clone());
        } else {
            if variant_mode {
                // the whole covered span counts toward depth, gaps included
                for n in (m.left + 1 - left)..=(m.right - 1 - left) {
                    if let Some(slot) = usize::try_from(n).ok().and_then(|k| depth.get_mut(k)) {
                        *slot = true;
                    }
                }
            } else {
                // collapse to the inferred adduct site
                for n in (m.left + 1 - left)..(m.right - 1 - left) {
                    if let Some(slot) = usize::try_from(n).ok().and_then(|k| depth.get_mut(k)) {
                        *slot = false;
                    }
                }
                if let Some(slot) =
                    usize::try_from(m.right - 1 - left).ok().and_then(|k| depth.get_mut(k))
                {
                    *slot = true;
                }
            }
            included.push(m.clone());
        }
    }

    let mut count = vec![false; len];
    for m in &included {
        if let Some(slot) = usize::try_from(m.right - 1 - left).ok().and_then(|k| count.get_mut(k))
        {
            *slot = true;
        }
    }

    FilterResult {
        effective_depth: depth,
        effective_count: count,
        included_mutations: included,
        excluded_mutations: excluded,
    }
}

impl Read {
    /// Filters this read's mutations by basecall quality, replacing its
    /// mutation list with the survivors and updating `depth` and `count`.
    pub fn filter_qscores_count_depths(
        &mut self,
        min_qual: i32,
        mutation_type: Option<MutationTypeFilter>,
        variant_mode: bool,
    ) -> &mut Self {
        let result = filter_qscores_count_depths(
            &self.mutations,
            &self.qual,
            &self.depth,
            self.left,
            min_qual,
            mutation_type,
            variant_mode,
        );
        self.mutations = result.included_mutations;
        self.depth = result.effective_depth;
        self.count = result.effective_count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{bools_to_string, string_to_bools};

    fn run(
        mutations: Vec<Mutation>,
        qual: &str,
        min_qual: i32,
        variant_mode: bool,
    ) -> FilterResult {
        let depth = vec![true; qual.len()];
        filter_qscores_count_depths(&mutations, qual, &depth, 0, min_qual, None, variant_mode)
    }

    #[test]
    fn test_clean_read_keeps_full_depth() {
        let result = run(vec![], "HHHHHHHHHHHHHHHH", 30, false);
        assert_eq!(bools_to_string(&result.effective_depth), "1111111111111111");
        assert_eq!(bools_to_string(&result.effective_count), "0000000000000000");
    }

    #[test]
    fn test_gap_with_deleted_span_variant_mode() {
        // aligned read AATTGGCC--GCCGTA against AATTGGCCATGCCGTA; in variant
        // mode the passing gap keeps its span in depth
        let result = run(vec![Mutation::new(7, 10, "", "")], "HHHHHHHH!!HHHHHH", 30, true);
        assert_eq!(bools_to_string(&result.effective_depth), "1111111111111111");
        assert_eq!(bools_to_string(&result.effective_count), "0000000001000000");
    }

    #[test]
    fn test_gap_collapses_to_adduct_site_normal_mode() {
        let result = run(vec![Mutation::new(7, 10, "", "")], "HHHHHHHH!!HHHHHH", 30, false);
        assert_eq!(bools_to_string(&result.effective_depth), "1111111101111111");
        assert_eq!(bools_to_string(&result.effective_count), "0000000001000000");
    }

    #[test]
    fn test_mismatch_and_gap_variant_mode() {
        // aligned read AATTGGCG-TGCCGTA
        let result = run(
            vec![Mutation::new(6, 8, "G", "H"), Mutation::new(7, 9, "", "")],
            "HHHHHHHH!HHHHHHH",
            30,
            true,
        );
        assert_eq!(bools_to_string(&result.effective_depth), "1111111111111111");
        assert_eq!(bools_to_string(&result.effective_count), "0000000110000000");
    }

    #[test]
    fn test_neighboring_low_quality_excludes_mutations() {
        // q-scores: !!!!!HH#H#HHHHHH  (phred 0 / 39 / 2)
        // mutations: gap (0,2), insert (3,4), mismatch (7,9)
        let mutations = vec![
            Mutation::new(0, 2, "", ""),
            Mutation::new(3, 4, "CA", "HH"),
            Mutation::new(7, 9, "T", "H"),
        ];
        let qual = "!!!!!HH#H#HHHHHH";

        // min_qual 0: everything passes, counts at each adduct site
        let result = filter_qscores_count_depths(
            &mutations,
            qual,
            &string_to_bools("1111111111111111"),
            0,
            0,
            None,
            false,
        );
        assert_eq!(result.included_mutations.len(), 3);
        assert_eq!(bools_to_string(&result.effective_depth), "1111111111111111");
        assert_eq!(bools_to_string(&result.effective_count), "0101000010000000");

        // min_qual 2: the gap's flanking basecalls and the insert's neighbors
        // are below threshold; only the mismatch survives
        let result = filter_qscores_count_depths(
            &mutations,
            qual,
            &string_to_bools("1111111111111111"),
            0,
            2,
            None,
            false,
        );
        assert_eq!(result.included_mutations, vec![Mutation::new(7, 9, "T", "H")]);
        assert_eq!(result.excluded_mutations.len(), 2);
        assert_eq!(bools_to_string(&result.effective_depth), "0000001111111111");
        assert_eq!(bools_to_string(&result.effective_count), "0000000010000000");

        // min_qual 40: nothing survives
        let result = filter_qscores_count_depths(
            &mutations,
            qual,
            &string_to_bools("1111111111111111"),
            0,
            40,
            None,
            false,
        );
        assert!(result.included_mutations.is_empty());
        assert_eq!(bools_to_string(&result.effective_depth), "0000000000000000");
        assert_eq!(bools_to_string(&result.effective_count), "0000000000000000");
    }

    #[test]
    fn test_mate_gap_sentinel_fails_depth() {
        let result = run(vec![], "HHH~HHH", 30, false);
        // the sentinel position and both its neighbors lose depth
        assert_eq!(bools_to_string(&result.effective_depth), "1101011");
    }

    #[test]
    fn test_mutation_type_restriction() {
        let mut mismatch = Mutation::new(6, 8, "G", "H");
        mismatch.tag = Some(MutationClass::Mismatch(b'C', b'G'));
        let mut gap = Mutation::new(9, 11, "", "");
        gap.tag = Some(MutationClass::Gap(b'T'));
        let mutations = vec![mismatch.clone(), gap.clone()];
        let result = filter_qscores_count_depths(
            &mutations,
            "HHHHHHHHHHHHHHHH",
            &vec![true; 16],
            0,
            0,
            Some(MutationTypeFilter::Gap),
            false,
        );
        assert_eq!(result.included_mutations, vec![gap]);
        assert_eq!(result.excluded_mutations, vec![mismatch]);
    }

    #[test]
    fn test_mutation_at_read_edge_has_no_outside_neighbor() {
        // mutation touching position 0 carries left = -1; the missing left
        // neighbor cannot fail it
        let result = run(vec![Mutation::new(-1, 1, "G", "H")], "HHHH", 30, false);
        assert_eq!(result.included_mutations.len(), 1);
        assert_eq!(bools_to_string(&result.effective_count), "1000");
    }
}
