//! Post-alignment merging of mate pairs.
//!
//! Two concordantly mapped mates become one synthetic read over their union
//! span. Sequence conflicts cannot arise (both mates carry reconstructed
//! target slices); qualities take the per-position maximum. Conflicting
//! mutations are resolved group-wise: overlapping mutations from either mate
//! form a group, each side's supporting basecalls are averaged, and the
//! stronger side's mutations win while the loser's span drops out of the
//! effective depth.

use crate::mutation::Mutation;
use crate::read::{merge_mate_pairs_simple, Read, ReadType, Strand};
use crate::util::byte_at;

/// A maximal run of span-overlapping mutations from both mates.
#[derive(Debug, Default, Clone)]
struct MutationGroup {
    left: i32,
    right: i32,
    r1_mutations: Vec<Mutation>,
    r2_mutations: Vec<Mutation>,
}

impl MutationGroup {
    fn is_empty(&self) -> bool {
        self.r1_mutations.is_empty() && self.r2_mutations.is_empty()
    }
}

/// Groups both mates' mutations into maximal overlapping runs, scanning the
/// union span left to right.
fn group_mutations(r1: &Read, r2: &Read, left: i32, length: usize) -> Vec<MutationGroup> {
    if length == 0 {
        return Vec::new();
    }
    // index by leftmost position; a mutation reaching one position left of
    // the span lands in the first bucket
    let mut indexed: Vec<(Vec<&Mutation>, Vec<&Mutation>)> = vec![(Vec::new(), Vec::new()); length];
    for m in &r1.mutations {
        let i = usize::try_from(m.left - left).unwrap_or(0).min(length.saturating_sub(1));
        indexed[i].0.push(m);
    }
    for m in &r2.mutations {
        let i = usize::try_from(m.left - left).unwrap_or(0).min(length.saturating_sub(1));
        indexed[i].1.push(m);
    }

    let mut groups = Vec::new();
    let mut group = MutationGroup::default();
    for (r1_here, r2_here) in &indexed {
        for &m in r1_here {
            if group.is_empty() {
                group.left = m.left;
                group.right = m.right;
                group.r1_mutations.push(m.clone());
            } else if m.left < group.right {
                group.right = group.right.max(m.right);
                group.r1_mutations.push(m.clone());
            } else {
                groups.push(std::mem::take(&mut group));
                group.left = m.left;
                group.right = m.right;
                group.r1_mutations.push(m.clone());
            }
        }
        for &m in r2_here {
            if group.is_empty() {
                group.left = m.left;
                group.right = m.right;
                group.r2_mutations.push(m.clone());
            } else if m.left < group.right {
                group.right = group.right.max(m.right);
                group.r2_mutations.push(m.clone());
            } else {
                groups.push(std::mem::take(&mut group));
                group.left = m.left;
                group.right = m.right;
                group.r2_mutations.push(m.clone());
            }
        }
    }
    if !group.is_empty() {
        groups.push(group);
    }
    groups
}

/// Mean quality supporting one side of a group.
///
/// A side with mutations averages their basecall qualities plus the
/// bracketing basecalls of each mutation. A side without mutations averages
/// its basecalls across the group span, provided it covers both ends;
/// otherwise it scores zero.
fn side_mean_qual(side_mutations: &[Mutation], read: &Read, group: &MutationGroup) -> f32 {
    let mut num: i64 = 0;
    let mut denom: i64 = 0;
    if side_mutations.is_empty() {
        let lindex = group.left - read.left;
        let rindex = group.right - read.left;
        let qlen = read.qual.len() as i32;
        if lindex >= 0 && lindex < qlen && rindex >= 0 && rindex < qlen {
            for p in group.left..=group.right {
                if let Some(q) = byte_at(&read.qual, p - read.left) {
                    num += q as i64;
                    denom += 1;
                }
            }
        }
    } else {
        for m in side_mutations {
            for q in m.qual.bytes() {
                num += q as i64;
                denom += 1;
            }
            if let Some(q) = byte_at(&read.qual, m.left - read.left) {
                num += q as i64;
                denom += 1;
            }
            if let Some(q) = byte_at(&read.qual, m.right - read.left) {
                num += q as i64;
                denom += 1;
            }
        }
    }
    if denom > 0 {
        num as f32 / denom as f32
    } else {
        0.0
    }
}

fn min_left(mutations: &[Mutation]) -> i32 {
    mutations.iter().map(|m| m.left).min().unwrap_or(-9999)
}

fn max_right(mutations: &[Mutation]) -> i32 {
    mutations.iter().map(|m| m.right).max().unwrap_or(-9999)
}

/// Merges two concordant mates into one synthetic read.
pub fn merge_mate_pairs(reads: &[Read; 2]) -> Read {
    let mut r1 = reads[0].clone();
    let mut r2 = reads[1].clone();

    let left = r1.left.min(r2.left);
    let right = (r1.left + r1.seq.len() as i32 - 1).max(r2.left + r2.seq.len() as i32 - 1);
    let length = usize::try_from(right - left + 1).unwrap_or(0);

    let simple_merged = merge_mate_pairs_simple(reads);
    let mapped_depth = simple_merged.mapped_depth;

    // union sequence and per-position max quality; positions covered by
    // neither mate keep the sentinels
    let mut seq = vec![b'_'; length];
    let mut qual = vec![b'~'; length];
    for (i, slot) in seq.iter_mut().enumerate() {
        let pos = left + i as i32;
        if let Some(b) = byte_at(&r1.seq, pos - r1.left) {
            *slot = b;
        }
        if let Some(b) = byte_at(&r2.seq, pos - r2.left) {
            *slot = b;
        }
        let one = byte_at(&r1.qual, pos - r1.left).unwrap_or(b'~');
        let two = byte_at(&r2.qual, pos - r2.left).unwrap_or(b'~');
        qual[i] = match (one, two) {
            (b'~', b'~') => b'~',
            (q, b'~') => q,
            (b'~', q) => q,
            (q1, q2) => q1.max(q2),
        };
    }

    // both mates start fully trusted; losing group spans knock holes below
    r1.depth = vec![true; r1.seq.len()];
    r2.depth = vec![true; r2.seq.len()];

    let mut mutations: Vec<Mutation> = Vec::new();
    for group in group_mutations(&r1, &r2, left, length) {
        let mean_r1 = side_mean_qual(&group.r1_mutations, &r1, &group);
        let mean_r2 = side_mean_qual(&group.r2_mutations, &r2, &group);
        if mean_r2 > mean_r1 {
            mutations.extend(group.r2_mutations.iter().cloned());
            if !group.r1_mutations.is_empty() {
                for n in (min_left(&group.r1_mutations) + 1)..max_right(&group.r1_mutations) {
                    if let Some(slot) =
                        usize::try_from(n - r1.left).ok().and_then(|k| r1.depth.get_mut(k))
                    {
                        *slot = false;
                    }
                }
            }
        } else {
            // ties go to read 1
            mutations.extend(group.r1_mutations.iter().cloned());
            if !group.r2_mutations.is_empty() {
                for n in (min_left(&group.r2_mutations) + 1)..max_right(&group.r2_mutations) {
                    if let Some(slot) =
                        usize::try_from(n - r2.left).ok().and_then(|k| r2.depth.get_mut(k))
                    {
                        *slot = false;
                    }
                }
            }
        }
    }

    // merged effective depth is the union of the mates' surviving depths
    let mut depth = vec![false; length];
    for (i, slot) in depth.iter_mut().enumerate() {
        let pos = left + i as i32;
        let d1 = usize::try_from(pos - r1.left)
            .ok()
            .and_then(|k| r1.depth.get(k).copied())
            .unwrap_or(false);
        let d2 = usize::try_from(pos - r2.left)
            .ok()
            .and_then(|k| r2.depth.get(k).copied())
            .unwrap_or(false);
        *slot = d1 || d2;
    }

    let mut merged = Read::new(left, right, String::from_utf8(seq).expect("ascii sequence"));
    merged.read_type = ReadType::Paired;
    merged.strand = Strand::Forward;
    merged.id = r1.id.clone();
    merged.mapping_category = r1.mapping_category;
    merged.primer_pair = r1.primer_pair;
    merged.mapped_depth = mapped_depth;
    merged.qual = String::from_utf8(qual).expect("ascii qualities");
    merged.mutations = mutations;
    merged.depth = depth;
    merged
}
