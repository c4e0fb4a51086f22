//! Collapsing of nearby mutations.
//!
//! Adjacent mutations separated by no more than a configured number of
//! unchanged target bases are merged into one spanning mutation, picking up
//! the intervening target bases. Afterwards any target-matching bases at a
//! merged mutation's ends (left there by ambiguous-indel expansion) are
//! stripped back off.

use crate::mutation::Mutation;
use crate::read::Read;
use crate::util::byte_at;

/// Merges mutations separated by at most `max_internal_match` unchanged
/// target bases. Input must be sorted by `left`.
///
/// Mutations are never merged across the unobserved region between mates
/// (`_` in the target slice). An `N` basecall aligned to a single target
/// base carries no mutation information and never merges (collapsing runs
/// before classification, so the shape is tested rather than the tag);
/// such calls are carried through and re-sorted into place. A merge result
/// is ambiguous if any of its parts were.
pub fn collapse_mutations(
    mutations: &[Mutation],
    max_internal_match: i32,
    target_seq: &str,
    target_qual: &str,
    left_target_pos: i32,
) -> Vec<Mutation> {
    if mutations.is_empty() {
        return Vec::new();
    }

    let mut collapsed: Vec<Mutation> = Vec::new();
    let mut unmerged: Vec<Mutation> = Vec::new(); // N basecalls carried separately

    for m in mutations {
        if m.is_n_match() {
            unmerged.push(m.clone());
            continue;
        }
        let prev_right = collapsed.last().map(|p| p.right);
        match prev_right {
            Some(prev_right) if m.left - (prev_right - 1) <= max_internal_match => {
                let gap_start = (prev_right - left_target_pos).max(0) as usize;
                let gap_len = (m.left - prev_right + 1).max(0) as usize;
                let gap_end = (gap_start + gap_len).min(target_seq.len());
                let gap_seq = &target_seq[gap_start.min(gap_end)..gap_end];
                if gap_seq.contains('_') {
                    // unobserved region between mates; keep separate
                    collapsed.push(m.clone());
                } else {
                    let gap_qual = &target_qual[gap_start.min(gap_end)..gap_end];
                    let prev = collapsed.last_mut().expect("nonempty checked above");
                    prev.seq.push_str(gap_seq);
                    prev.qual.push_str(gap_qual);
                    prev.right = m.right;
                    prev.seq.push_str(&m.seq);
                    prev.qual.push_str(&m.qual);
                    prev.tag = None;
                    if m.ambig {
                        prev.ambig = true;
                    }
                }
            }
            _ => collapsed.push(m.clone()),
        }
    }

    for m in &mut collapsed {
        strip_matching_ends(m, target_seq, left_target_pos);
    }

    collapsed.extend(unmerged);
    collapsed.sort();
    collapsed
}

/// Strips target-matching bases from a mutation's ends, narrowing its bounds,
/// without crossing the opposite endpoint.
fn strip_matching_ends(m: &mut Mutation, target_seq: &str, left_target_pos: i32) {
    // from the left
    let mut trimmed = 0usize;
    for i in 0..m.seq.len() {
        if m.left + 1 + i as i32 >= m.right {
            break;
        }
        let p = m.left + 1 + i as i32 - left_target_pos;
        if p < 0 {
            break;
        }
        let Some(target) = byte_at(target_seq, p) else { break };
        if m.seq.as_bytes()[i] == target {
            trimmed += 1;
        } else {
            break;
        }
    }
    m.left += trimmed as i32;
    m.seq.drain(..trimmed);
    m.qual.drain(..trimmed);

    // from the right
    let mut trimmed = 0usize;
    for i in (0..m.seq.len()).rev() {
        let d = (m.seq.len() - i) as i32;
        if m.right - d <= m.left {
            break;
        }
        let p = m.right - d - left_target_pos;
        if p < 0 {
            break;
        }
        let Some(target) = byte_at(target_seq, p) else { break };
        if m.seq.as_bytes()[i] == target {
            trimmed += 1;
        } else {
            break;
        }
    }
    m.right -= trimmed as i32;
    m.seq.truncate(m.seq.len() - trimmed);
    m.qual.truncate(m.qual.len() - trimmed);
}

impl Read {
    /// Collapses nearby mutations against this read's target slice.
    pub fn collapse_mutations(&mut self, max_internal_match: i32) -> &mut Self {
        self.mutations =
            collapse_mutations(&self.mutations, max_internal_match, &self.seq, &self.qual, self.left);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::mutations_to_string;

    #[test]
    fn test_collapse_within_distance() {
        //        0123456789
        // target ATGCATGCAT
        let mutations = vec![Mutation::new(1, 3, "C", "1"), Mutation::new(4, 6, "G", "2")];
        let collapsed = collapse_mutations(&mutations, 6, "ATGCATGCAT", "abcdefghij", 0);
        // the merged span picks up the intervening target bases CA
        assert_eq!(mutations_to_string(&collapsed), r#"1 6 "CCAG" "1de2" """#);
    }

    #[test]
    fn test_no_collapse_beyond_distance() {
        let mutations = vec![Mutation::new(1, 3, "C", "1"), Mutation::new(8, 10, "C", "2")];
        let collapsed = collapse_mutations(&mutations, 2, "ATGCATGCATGC", "abcdefghijkl", 0);
        assert_eq!(collapsed.len(), 2);
    }

    #[test]
    fn test_no_collapse_across_mate_gap() {
        let mutations = vec![Mutation::new(1, 3, "C", "1"), Mutation::new(5, 7, "A", "2")];
        let collapsed = collapse_mutations(&mutations, 6, "ATG__TGCAT", "ab~~~fghij", 0);
        assert_eq!(collapsed.len(), 2);
    }

    #[test]
    fn test_ambig_is_sticky() {
        let mut first = Mutation::new(1, 3, "C", "1");
        first.ambig = true;
        let mutations = vec![first, Mutation::new(4, 6, "G", "2")];
        let collapsed = collapse_mutations(&mutations, 6, "ATGCATGCAT", "abcdefghij", 0);
        assert_eq!(collapsed.len(), 1);
        assert!(collapsed[0].ambig);
    }

    #[test]
    fn test_n_basecall_not_merged() {
        // collapsing runs before classification, so none of these carry tags
        let mutations = vec![
            Mutation::new(1, 3, "C", "1"),
            Mutation::new(3, 5, "N", "H"),
            Mutation::new(5, 7, "A", "2"),
        ];
        let collapsed = collapse_mutations(&mutations, 6, "ATGCATGCAT", "abcdefghij", 0);
        // the outer pair merges across the N position; the N call itself is
        // set aside and re-sorted into place untouched
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].left, 1);
        assert_eq!(collapsed[0].right, 7);
        assert_eq!(collapsed[1], Mutation::new(3, 5, "N", "H"));
    }

    #[test]
    fn test_end_match_stripping() {
        // an expanded ambiguous deletion: replacement "GC" over span (1, 5)
        // equals the target bases at positions 2 and 3, so the real change
        // narrows to a one-base gap at position 4
        let mutations = vec![Mutation::new(1, 5, "GC", "12")];
        let collapsed = collapse_mutations(&mutations, 0, "ATGCATGCAT", "abcdefghij", 0);
        assert_eq!(mutations_to_string(&collapsed), r#"3 5 "" "" """#);
    }

    #[test]
    fn test_idempotent_after_fixpoint() {
        let mutations = vec![Mutation::new(1, 3, "C", "1"), Mutation::new(4, 6, "G", "2")];
        let target = "ATGCATGCAT";
        let qual = "abcdefghij";
        let once = collapse_mutations(&mutations, 6, target, qual, 0);
        let twice = collapse_mutations(&once, 6, target, qual, 0);
        assert_eq!(once, twice);
    }
}
