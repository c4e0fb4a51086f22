//! Ambiguous-indel identification and realignment.
//!
//! A gap or insertion whose content matches the neighboring target sequence
//! has more than one valid placement. [`identify_ambiguous_mutations`] slides
//! each simple indel in both directions along the reconstructed alignment and
//! widens its bounds to cover every placement, merging away mismatches and
//! seam duplicates created by the expansion. [`shift_ambig_indels`] later
//! re-expresses each widened indel at its left-most or right-most placement,
//! splitting out any internal mismatches as separate mutations.

use crate::errors::{MutScanError, Result};
use crate::mutation::Mutation;
use crate::util::byte_at;

#[derive(Clone, Copy, PartialEq, Eq)]
enum IndelKind {
    Deletion,
    Insertion,
}

struct Slide<'a> {
    target_seq: &'a str,
    target_qual: &'a str,
    aligned_seq: &'a str,
    aligned_qual: &'a str,
    has_insert_left_of: &'a [bool],
}

impl Slide<'_> {
    /// Slides one indel as far as it can travel in direction `dir` (+1 right,
    /// -1 left), widening `mutation` each time the dropped base equals the
    /// picked-up target base. Picked-up target indices are recorded so that
    /// adjacent indels claiming the same base can be joined afterwards.
    #[allow(clippy::too_many_arguments)]
    fn slide_indel(
        &self,
        local_left: i32,
        local_right: i32,
        mut mut_seq: String,
        mut mut_qual: String,
        kind: IndelKind,
        dir: i32,
        mutation: &mut Mutation,
        appended: &mut Vec<i32>,
    ) {
        let mut offset = 0;
        loop {
            offset += 1;
            let offset_left = local_left + offset * dir;
            let offset_right = local_right + offset * dir;

            if byte_at(self.target_seq, offset_left).is_none()
                || byte_at(self.target_seq, offset_right).is_none()
            {
                break;
            }

            // stop at a gap dash on the side being entered
            let entering = match (kind, dir) {
                (IndelKind::Deletion, 1) | (IndelKind::Insertion, -1) => offset_right,
                _ => offset_left,
            };
            if byte_at(self.aligned_seq, entering) == Some(b'-') {
                break;
            }

            // stop at a known insertion boundary
            let insert_blocked = match (kind, dir) {
                (IndelKind::Deletion, 1) | (IndelKind::Insertion, 1) => self
                    .has_insert_left_of
                    .get(offset_right as usize)
                    .copied()
                    .unwrap_or(false),
                (IndelKind::Deletion, -1) => {
                    offset_left - 1 > 0
                        && self
                            .has_insert_left_of
                            .get((offset_left - 1) as usize)
                            .copied()
                            .unwrap_or(false)
                }
                (IndelKind::Insertion, -1) => false,
                _ => unreachable!("dir must be 1 or -1"),
            };
            if insert_blocked {
                break;
            }

            // one step: drop a base from the trailing side, pick up the next
            // target base on the leading side
            let pickup = match (kind, dir) {
                (IndelKind::Deletion, 1) | (IndelKind::Insertion, -1) => offset_right,
                (IndelKind::Deletion, -1) | (IndelKind::Insertion, 1) => offset_left,
                _ => unreachable!("dir must be 1 or -1"),
            };
            let Some(from_target_seq) = byte_at(self.target_seq, pickup) else { break };
            let Some(from_target_qual) = byte_at(self.target_qual, pickup) else { break };
            let Some(from_aligned_seq) = byte_at(self.aligned_seq, pickup) else { break };
            let Some(from_aligned_qual) = byte_at(self.aligned_qual, pickup) else { break };

            let dropped = if dir == 1 {
                let dropped = mut_seq.as_bytes()[0];
                mut_seq.remove(0);
                mut_seq.push(from_target_seq as char);
                mut_qual.remove(0);
                mut_qual.push(from_target_qual as char);
                dropped
            } else {
                let dropped = mut_seq.pop().map_or(0, |c| c as u8);
                mut_seq.insert(0, from_target_seq as char);
                mut_qual.pop();
                mut_qual.insert(0, from_target_qual as char);
                dropped
            };

            if dropped != from_target_seq {
                break;
            }
            if dir == 1 {
                mutation.seq.push(from_aligned_seq as char);
                mutation.qual.push(from_aligned_qual as char);
                appended.push(pickup);
                mutation.right += 1;
            } else {
                mutation.seq.insert(0, from_aligned_seq as char);
                mutation.qual.insert(0, from_aligned_qual as char);
                appended.insert(0, pickup);
                mutation.left -= 1;
            }
        }
    }
}

/// Expands ambiguously placed indels to cover all valid placements.
///
/// Mutations must be the output of mutation location against the same
/// reconstructed `target_seq`/`aligned_seq` pair (equal lengths, positions in
/// local coordinates relative to `pos`). Mismatches wholly inside an expanded
/// indel are removed, and two expanded indels that claimed the same target
/// base are joined with the duplicate dropped.
pub fn identify_ambiguous_mutations(
    pos: i32,
    target_seq: &str,
    target_qual: &str,
    aligned_seq: &str,
    aligned_qual: &str,
    mutations: &[Mutation],
) -> Result<Vec<Mutation>> {
    if target_seq.len() != aligned_seq.len() {
        return Err(MutScanError::LogicInvariant {
            reason: "target sequence and aligned sequence lengths do not match".to_string(),
        });
    }

    let mut has_insert_left_of = vec![false; aligned_seq.len() + 1];
    for m in mutations {
        if !m.is_simple_insert() {
            continue;
        }
        if let Ok(i) = usize::try_from(m.right - pos) {
            if let Some(slot) = has_insert_left_of.get_mut(i) {
                *slot = true;
            }
        }
    }

    let slide = Slide {
        target_seq,
        target_qual,
        aligned_seq,
        aligned_qual,
        has_insert_left_of: &has_insert_left_of,
    };

    let mut adjusted: Vec<Mutation> = mutations.to_vec();
    let mut appended: Vec<Vec<i32>> = vec![Vec::new(); mutations.len()];

    for (k, m) in mutations.iter().enumerate() {
        if !(m.is_simple_insert() || m.is_simple_gap()) {
            // mismatches merged into expanded indels are removed below
            continue;
        }
        for dir in [1, -1] {
            let (kind, local_left, local_right, mut_seq, mut_qual);
            if m.is_simple_insert() {
                kind = IndelKind::Insertion;
                local_left = m.left - pos;
                local_right = m.right - pos;
                mut_seq = m.seq.clone();
                mut_qual = m.qual.clone();
            } else {
                kind = IndelKind::Deletion;
                // local coordinates of the deleted target run, inclusive
                local_left = m.left - pos + 1;
                local_right = m.right - pos - 1;
                let lo = local_left.max(0) as usize;
                let hi = ((local_right + 1).max(0) as usize).min(target_seq.len());
                mut_seq = target_seq[lo.min(hi)..hi].to_string();
                mut_qual = target_qual[lo.min(hi)..hi].to_string();
            }
            slide.slide_indel(
                local_left,
                local_right,
                mut_seq,
                mut_qual,
                kind,
                dir,
                &mut adjusted[k],
                &mut appended[k],
            );
        }
    }

    // local positions covered by any expanded indel
    let mut indel_covered = vec![false; aligned_seq.len()];
    for m in &adjusted {
        if !m.is_gap_or_insert() {
            continue;
        }
        for i in (m.left + 1 - pos)..(m.right - pos) {
            if let Ok(i) = usize::try_from(i) {
                if let Some(slot) = indel_covered.get_mut(i) {
                    *slot = true;
                }
            }
        }
    }

    // rebuild the list: drop mismatches subsumed by an expansion, and join
    // adjacent expanded indels that picked up the same target base
    let mut merged: Vec<Mutation> = Vec::with_capacity(adjusted.len());
    for (i, m) in adjusted.iter().enumerate() {
        if m.is_gap_or_insert() {
            if appended[i].is_empty() || merged.is_empty() || appended[i - 1].is_empty() {
                merged.push(m.clone());
                continue;
            }
            let mut tmp_seq = m.seq.clone();
            let mut tmp_qual = m.qual.clone();
            let mut do_merge = false;
            for shared in &appended[i] {
                if appended[i - 1].contains(shared) {
                    tmp_seq.remove(0);
                    tmp_qual.remove(0);
                    do_merge = true;
                } else {
                    break;
                }
            }
            if do_merge {
                let last = merged.last_mut().expect("nonempty checked above");
                last.seq.push_str(&tmp_seq);
                last.qual.push_str(&tmp_qual);
                last.right = m.right;
            } else {
                merged.push(m.clone());
            }
        } else {
            let subsumed = ((m.left + 1 - pos)..(m.right - pos)).any(|k| {
                usize::try_from(k)
                    .ok()
                    .and_then(|k| indel_covered.get(k).copied())
                    .unwrap_or(false)
            });
            if !subsumed {
                merged.push(m.clone());
            }
        }
    }

    Ok(merged)
}

/// Realigns each ambiguous indel to its left-most or right-most placement.
///
/// Expanded indels carry target bases copied into `seq` by the expansion;
/// after choosing an edge those bases collapse back out, and any that
/// disagree with the target (internal mismatches dragged along by the
/// expansion) become separate single-base mutations. Every output mutation
/// derived from an ambiguous input keeps `ambig` set.
pub fn shift_ambig_indels(
    mutations: &[Mutation],
    target_seq: &str,
    left_target_pos: i32,
    right_align_ambig_dels: bool,
    right_align_ambig_ins: bool,
) -> Vec<Mutation> {
    let mut adjusted: Vec<Mutation> = Vec::with_capacity(mutations.len());
    for m in mutations {
        if !m.is_ambiguous() {
            let mut plain = m.clone();
            plain.ambig = false;
            adjusted.push(plain);
            continue;
        }
        let seq_len = m.seq.len() as i32;
        let ambig_mismatch = |left: i32, c: u8, q: u8| {
            let mut mm = Mutation::new(left, left + 2, (c as char).to_string(), (q as char).to_string());
            mm.ambig = true;
            mm
        };
        if m.is_gap() {
            if right_align_ambig_dels {
                // mismatches first (they lie left of the re-placed gap)
                for i in 0..seq_len {
                    let c = m.seq.as_bytes()[i as usize];
                    let q = m.qual.as_bytes()[i as usize];
                    if byte_at(target_seq, m.left - left_target_pos + 1 + i) != Some(c) {
                        adjusted.push(ambig_mismatch(m.left + i, c, q));
                    }
                }
                let mut gap = Mutation::new(m.left + seq_len, m.right, "", "");
                gap.ambig = true;
                adjusted.push(gap);
            } else {
                let new_right = m.right - seq_len;
                let mut gap = Mutation::new(m.left, new_right, "", "");
                gap.ambig = true;
                adjusted.push(gap);
                for i in 0..seq_len {
                    let c = m.seq.as_bytes()[i as usize];
                    let q = m.qual.as_bytes()[i as usize];
                    if byte_at(target_seq, new_right - left_target_pos + i) != Some(c) {
                        adjusted.push(ambig_mismatch(new_right + i - 1, c, q));
                    }
                }
            }
        } else if m.is_insert() {
            let d = seq_len - (m.right - m.left - 1);
            if right_align_ambig_ins {
                for i in 0..(seq_len - d) {
                    let c = m.seq.as_bytes()[i as usize];
                    let q = m.qual.as_bytes()[i as usize];
                    if byte_at(target_seq, m.left - left_target_pos + 1 + i) != Some(c) {
                        adjusted.push(ambig_mismatch(m.left + i, c, q));
                    }
                }
                let mut ins = Mutation::new(
                    m.right - 1,
                    m.right,
                    m.seq[(seq_len - d) as usize..].to_string(),
                    m.qual[(seq_len - d) as usize..].to_string(),
                );
                ins.ambig = true;
                adjusted.push(ins);
            } else {
                let mut ins = Mutation::new(
                    m.left,
                    m.left + 1,
                    m.seq[..d as usize].to_string(),
                    m.qual[..d as usize].to_string(),
                );
                ins.ambig = true;
                adjusted.push(ins);
                for i in 0..(seq_len - d) {
                    let c = m.seq.as_bytes()[(d + i) as usize];
                    let q = m.qual.as_bytes()[(d + i) as usize];
                    if byte_at(target_seq, m.left - left_target_pos + 1 + i) != Some(c) {
                        adjusted.push(ambig_mismatch(m.left + i, c, q));
                    }
                }
            }
        }
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::mutations_to_string;

    fn identify(
        pos: i32,
        target_seq: &str,
        target_qual: &str,
        aligned_seq: &str,
        aligned_qual: &str,
        mutations: Vec<Mutation>,
    ) -> String {
        let adjusted = identify_ambiguous_mutations(
            pos,
            target_seq,
            target_qual,
            aligned_seq,
            aligned_qual,
            &mutations,
        )
        .unwrap();
        mutations_to_string(&adjusted)
    }

    #[test]
    fn test_ambig_gap_right_aligned() {
        let got = identify(0, "ATGGAT", "abc!de", "ATG-AT", "abc!de", vec![Mutation::new(2, 4, "", "")]);
        assert_eq!(got, r#"1 4 "G" "c" """#);
    }

    #[test]
    fn test_ambig_gap_left_aligned() {
        let got = identify(0, "ATGGAT", "ab!cde", "AT-GAT", "ab!cde", vec![Mutation::new(1, 3, "", "")]);
        assert_eq!(got, r#"1 4 "G" "c" """#);
    }

    #[test]
    fn test_large_ambig_gap_right_aligned() {
        let got = identify(0, "ATGGGGAT", "abcd!!ef", "ATGG--AT", "abcd!!ef", vec![Mutation::new(3, 6, "", "")]);
        assert_eq!(got, r#"1 6 "GG" "cd" """#);
    }

    #[test]
    fn test_large_ambig_gap_left_aligned() {
        let got = identify(0, "ATGGGGAT", "ab!!cdef", "AT--GGAT", "ab!!cdef", vec![Mutation::new(1, 4, "", "")]);
        assert_eq!(got, r#"1 6 "GG" "cd" """#);
    }

    #[test]
    fn test_ambig_gap_adjacent_mismatch_kept_separate() {
        let got = identify(
            0,
            "ATGGAT",
            "abc!de",
            "ATG-CT",
            "abc!de",
            vec![Mutation::new(2, 4, "", ""), Mutation::new(3, 5, "C", "d")],
        );
        assert_eq!(got, r#"1 4 "G" "c" "" 3 5 "C" "d" """#);
    }

    #[test]
    fn test_ambig_insert_right_aligned() {
        let got = identify(0, "ATGAT", "abcde", "ATGAT", "abcde", vec![Mutation::new(2, 3, "G", "1")]);
        assert_eq!(got, r#"1 3 "GG" "c1" """#);
    }

    #[test]
    fn test_ambig_insert_left_aligned() {
        let got = identify(0, "ATGAT", "abcde", "ATGAT", "abcde", vec![Mutation::new(1, 2, "G", "1")]);
        assert_eq!(got, r#"1 3 "GG" "1c" """#);
    }

    #[test]
    fn test_ambig_gap_with_unambig_gap_on_right() {
        let got = identify(
            0,
            "ATGGATC",
            "ab!c!de",
            "AT-G-TC",
            "ab!c!de",
            vec![Mutation::new(1, 3, "", ""), Mutation::new(3, 5, "", "")],
        );
        assert_eq!(got, r#"1 4 "G" "c" "" 3 5 "" "" """#);
    }

    #[test]
    fn test_ambig_gap_with_unambig_gap_on_left() {
        let got = identify(
            0,
            "ATAGGTC",
            "ab!c!de",
            "AT-G-TC",
            "ab!c!de",
            vec![Mutation::new(1, 3, "", ""), Mutation::new(3, 5, "", "")],
        );
        assert_eq!(got, r#"1 3 "" "" "" 2 5 "G" "c" """#);
    }

    #[test]
    fn test_ambig_gap_with_unambig_insert_on_right() {
        let got = identify(
            0,
            "ATGGATC",
            "ab!cdef",
            "AT-GATC",
            "ab!cdef",
            vec![Mutation::new(1, 3, "", ""), Mutation::new(3, 4, "C", "1")],
        );
        assert_eq!(got, r#"1 4 "G" "c" "" 3 4 "C" "1" """#);
    }

    #[test]
    fn test_ambig_gap_with_unambig_insert_on_left() {
        let got = identify(
            0,
            "ATAGGTC",
            "abcd!ef",
            "ATAG-TC",
            "abcd!ef",
            vec![Mutation::new(1, 3, "C", "1"), Mutation::new(3, 5, "", "")],
        );
        assert_eq!(got, r#"1 3 "C" "1" "" 2 5 "G" "d" """#);
    }

    #[test]
    fn test_chained_ambig_gaps_joined() {
        let got = identify(
            0,
            "ATGGGTC",
            "ab!c!de",
            "AT-G-TC",
            "ab!c!de",
            vec![Mutation::new(1, 3, "", ""), Mutation::new(3, 5, "", "")],
        );
        assert_eq!(got, r#"1 5 "G" "c" """#);
    }

    #[test]
    fn test_ambig_gap_near_right_end() {
        let got = identify(0, "ATGAA", "abc!d", "ATG-A", "abc!d", vec![Mutation::new(2, 4, "", "")]);
        assert_eq!(got, r#"2 5 "A" "d" """#);
    }

    #[test]
    fn test_ambig_gap_near_left_end() {
        let got = identify(0, "TTGCA", "a!bcd", "T-GCA", "a!bcd", vec![Mutation::new(0, 2, "", "")]);
        assert_eq!(got, r#"-1 2 "T" "a" """#);
    }

    #[test]
    fn test_large_ambig_gap_nonzero_start() {
        let got = identify(1, "ATGGGGAT", "ab!!cdef", "AT--GGAT", "ab!!cdef", vec![Mutation::new(2, 5, "", "")]);
        assert_eq!(got, r#"2 7 "GG" "cd" """#);
        let got = identify(2, "ATGGGGAT", "ab!!cdef", "AT--GGAT", "ab!!cdef", vec![Mutation::new(3, 6, "", "")]);
        assert_eq!(got, r#"3 8 "GG" "cd" """#);
    }

    #[test]
    fn test_idempotent_on_own_output() {
        // re-running identification on an already-expanded mutation must not
        // change its bounds: the expanded form is no longer a simple indel
        let target = "ATGGAT";
        let first = identify_ambiguous_mutations(
            0,
            target,
            "abc!de",
            "ATG-AT",
            "abc!de",
            &[Mutation::new(2, 4, "", "")],
        )
        .unwrap();
        let second = identify_ambiguous_mutations(0, target, "abc!de", "ATG-AT", "abc!de", &first).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mismatched_slice_lengths_rejected() {
        assert!(identify_ambiguous_mutations(0, "ATGC", "abcd", "ATGCA", "abcde", &[]).is_err());
    }

    #[test]
    fn test_shift_gap_with_internal_mismatch_left() {
        let muts = vec![Mutation::new(2, 9, "CC", "#!")];
        let shifted = shift_ambig_indels(&muts, "TGCCGCGCGTGTA", 0, false, false);
        assert_eq!(
            mutations_to_string(&shifted),
            r#"2 7 "" "" "_ambig" 7 9 "C" "!" "_ambig""#
        );
    }

    #[test]
    fn test_shift_gap_with_internal_mismatch_right() {
        let muts = vec![Mutation::new(2, 9, "CC", "#!")];
        let shifted = shift_ambig_indels(&muts, "TGCCGCGCGTGTA", 0, true, true);
        assert_eq!(
            mutations_to_string(&shifted),
            r#"3 5 "C" "!" "_ambig" 4 9 "" "" "_ambig""#
        );
    }

    #[test]
    fn test_shift_insert_with_internal_mismatch_left() {
        let muts = vec![Mutation::new(2, 5, "CGCGCG", "123456")];
        let shifted = shift_ambig_indels(&muts, "TGCCCTGTA", 0, false, false);
        assert_eq!(
            mutations_to_string(&shifted),
            r#"2 3 "CGCG" "1234" "_ambig" 3 5 "G" "6" "_ambig""#
        );
    }

    #[test]
    fn test_shift_insert_with_internal_mismatch_right() {
        let muts = vec![Mutation::new(2, 5, "CGCGCG", "123456")];
        let shifted = shift_ambig_indels(&muts, "TGCCCTGTA", 0, true, true);
        assert_eq!(
            mutations_to_string(&shifted),
            r#"3 5 "G" "2" "_ambig" 4 5 "CGCG" "3456" "_ambig""#
        );
    }

    #[test]
    fn test_shift_leaves_unambiguous_untouched() {
        let muts = vec![Mutation::new(3, 5, "G", "H")];
        let shifted = shift_ambig_indels(&muts, "ATGCATGC", 0, true, true);
        assert_eq!(mutations_to_string(&shifted), r#"3 5 "G" "H" """#);
    }
}
