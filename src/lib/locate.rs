//! Mutation location from a single alignment.
//!
//! Walks the alignment-operator stream and the reference-difference stream in
//! lockstep, emitting a canonical mutation list plus four reconstructed
//! strings over the aligned region: the target sequence, a target "quality"
//! string (read qualities at matching positions, `!` inside deletions), the
//! aligned read sequence (gaps as `-`, insertions excluded), and its quality
//! string. The two sequence strings line up position-for-position, which is
//! what the ambiguous-indel identification slides against.

use crate::cigar::{CigarOp, CigarOpKind};
use crate::errors::{MutScanError, Result};
use crate::md::{MdOp, MdOpKind};
use crate::mutation::Mutation;
use crate::util::substr;

/// Mutations plus reconstructed sequences for one aligned read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocatedAlignment {
    /// Mutations in target coordinates, ordered left to right
    pub mutations: Vec<Mutation>,
    /// Reconstructed target sequence over the aligned region
    pub target_seq: String,
    /// Read qualities projected onto the target (`!` where the read has none)
    pub target_qual: String,
    /// Read sequence over the aligned region, `-` at deletions
    pub aligned_seq: String,
    /// Read qualities over the aligned region, `!` at deletions
    pub aligned_qual: String,
}

/// State for consuming reference-diff ops across one or more `M` operators.
///
/// A single diff op can span several `M` operators when insertions intervene,
/// and several diff ops can complete inside one `M` operator, so both sides
/// track how much of the current op remains.
#[derive(Default)]
struct MatchState {
    in_match: bool,
    remaining_op_length: i32,
    kind: Option<MdOpKind>,
    length: i32,
    target_seq: String,
    target_qual: String,
    query_seq: String,
    query_qual: String,
    loaded_index: Option<usize>,
}

impl MatchState {
    fn load(&mut self, index: usize, op: &MdOp, query_bases: &str, query_qual: &str, qs: usize) -> Result<()> {
        let len = op.length as usize;
        let short_read =
            || MutScanError::alignment("read sequence shorter than alignment operators imply");
        self.kind = Some(op.kind);
        self.length = op.length;
        self.target_seq = op.seq.clone();
        self.target_qual = substr(query_qual, qs, len).ok_or_else(short_read)?.to_string();
        self.query_seq = substr(query_bases, qs, len).ok_or_else(short_read)?.to_string();
        self.query_qual = substr(query_qual, qs, len).ok_or_else(short_read)?.to_string();
        self.loaded_index = Some(index);
        Ok(())
    }
}

fn push_n(s: &mut String, c: char, n: usize) {
    s.extend(std::iter::repeat(c).take(n));
}

/// Locates mutations for one alignment.
///
/// # Arguments
///
/// * `pos` - left-most aligned target position (0-based)
/// * `query_bases` / `query_qual` - read sequence and Phred+33 qualities
/// * `cigar` - parsed alignment operators
/// * `md` - parsed reference-difference operations
///
/// # Errors
///
/// Any disagreement between the two operator streams (wrong op kind, length
/// mismatch, or one stream ending early) is a hard error, as is a read
/// sequence shorter than the operators imply.
pub fn locate_mutations(
    pos: i32,
    query_bases: &str,
    query_qual: &str,
    cigar: &[CigarOp],
    md: &[MdOp],
) -> Result<LocatedAlignment> {
    let mut out = LocatedAlignment::default();
    let mut ts = pos; // target coordinate
    let mut qs: usize = 0; // read index
    let mut mo: usize = 0; // reference-diff op index
    let mut state = MatchState::default();

    let short_read =
        || MutScanError::alignment("read sequence shorter than alignment operators imply");
    let desync = |op: char| {
        MutScanError::alignment(format!(
            "MD tag does not match CIGAR string at alignment operator ('{op}')."
        ))
    };

    for op in cigar {
        let c_length = op.length as usize;
        match op.kind {
            CigarOpKind::Match => {
                let first = md.get(mo).ok_or_else(|| desync('M'))?;
                if first.kind == MdOpKind::Deletion {
                    return Err(desync('M'));
                }
                if !state.in_match {
                    state.in_match = true;
                    state.remaining_op_length = 0;
                    state.load(mo, first, query_bases, query_qual, qs)?;
                }
                state.remaining_op_length += op.length as i32;
                while state.remaining_op_length > 0 {
                    let Some(md_op) = md.get(mo) else { break };
                    if md_op.kind == MdOpKind::Deletion {
                        break;
                    }
                    if state.loaded_index != Some(mo) {
                        state.load(mo, md_op, query_bases, query_qual, qs)?;
                    }
                    let overlap = if state.length > state.remaining_op_length {
                        state.remaining_op_length
                    } else {
                        mo += 1;
                        state.length
                    };
                    let overlap_len = overlap as usize;
                    match state.kind {
                        Some(MdOpKind::Match) => {
                            state.length -= overlap;
                            let s = substr(query_bases, qs, overlap_len).ok_or_else(short_read)?;
                            let q = substr(query_qual, qs, overlap_len).ok_or_else(short_read)?;
                            out.target_seq.push_str(s);
                            out.target_qual.push_str(q);
                            out.aligned_seq.push_str(s);
                            out.aligned_qual.push_str(q);
                        }
                        _ => {
                            // mismatch run, possibly split across M operators
                            let target_overlap = state.target_seq[..overlap_len].to_string();
                            let target_qual_overlap = state.target_qual[..overlap_len].to_string();
                            let query_overlap = state.query_seq[..overlap_len].to_string();
                            let query_qual_overlap = state.query_qual[..overlap_len].to_string();
                            state.target_seq.drain(..overlap_len);
                            state.target_qual.drain(..overlap_len);
                            state.query_seq.drain(..overlap_len);
                            state.query_qual.drain(..overlap_len);
                            state.length = state.target_seq.len() as i32;
                            out.target_seq.push_str(&target_overlap);
                            out.target_qual.push_str(&target_qual_overlap);
                            out.aligned_seq.push_str(&query_overlap);
                            out.aligned_qual.push_str(&query_qual_overlap);
                            out.mutations.push(Mutation::new(
                                ts - 1,
                                ts + overlap,
                                query_overlap,
                                query_qual_overlap,
                            ));
                        }
                    }
                    ts += overlap;
                    qs += overlap_len;
                    state.remaining_op_length -= overlap;
                }
                if state.remaining_op_length == 0 && state.length == 0 {
                    state.in_match = false;
                }
            }
            CigarOpKind::Insertion => {
                out.mutations.push(Mutation::new(
                    ts - 1,
                    ts,
                    substr(query_bases, qs, c_length).ok_or_else(short_read)?,
                    substr(query_qual, qs, c_length).ok_or_else(short_read)?,
                ));
                qs += c_length;
            }
            CigarOpKind::Deletion => {
                let md_op = md.get(mo).ok_or_else(|| desync('D'))?;
                if md_op.kind != MdOpKind::Deletion || md_op.length != op.length as i32 {
                    return Err(desync('D'));
                }
                out.mutations.push(Mutation::new(ts - 1, ts + op.length as i32, "", ""));
                out.target_seq.push_str(&md_op.seq);
                push_n(&mut out.target_qual, '!', c_length);
                push_n(&mut out.aligned_seq, '-', c_length);
                push_n(&mut out.aligned_qual, '!', c_length);
                ts += op.length as i32;
                mo += 1;
            }
            CigarOpKind::Skip => {
                push_n(&mut out.target_seq, '~', c_length);
                push_n(&mut out.target_qual, '!', c_length);
                push_n(&mut out.aligned_seq, '~', c_length);
                push_n(&mut out.aligned_qual, '!', c_length);
                // A skip consumes a single target position here. Spliced
                // alignments with long skips are unsupported.
                ts += 1;
            }
            CigarOpKind::SoftClip => {
                qs += c_length;
            }
            CigarOpKind::HardClip => {}
            CigarOpKind::Pad => {
                push_n(&mut out.target_seq, '-', c_length);
                push_n(&mut out.target_qual, '!', c_length);
                push_n(&mut out.aligned_seq, '-', c_length);
                push_n(&mut out.aligned_qual, '!', c_length);
                ts += op.length as i32;
            }
            CigarOpKind::SequenceMatch => {
                let md_op = md.get(mo).ok_or_else(|| desync('='))?;
                if md_op.kind != MdOpKind::Match || md_op.length != op.length as i32 {
                    return Err(desync('='));
                }
                let s = substr(query_bases, qs, c_length).ok_or_else(short_read)?;
                let q = substr(query_qual, qs, c_length).ok_or_else(short_read)?;
                out.target_seq.push_str(s);
                out.target_qual.push_str(q);
                out.aligned_seq.push_str(s);
                out.aligned_qual.push_str(q);
                qs += c_length;
                ts += op.length as i32;
                mo += 1;
            }
            CigarOpKind::SequenceMismatch => {
                let md_op = md.get(mo).ok_or_else(|| desync('X'))?;
                if md_op.kind != MdOpKind::Mismatch || md_op.length != op.length as i32 {
                    return Err(desync('X'));
                }
                let s = substr(query_bases, qs, c_length).ok_or_else(short_read)?.to_string();
                let q = substr(query_qual, qs, c_length).ok_or_else(short_read)?.to_string();
                out.mutations.push(Mutation::new(ts - 1, ts + op.length as i32, s.clone(), q.clone()));
                out.target_seq.push_str(&md_op.seq);
                out.target_qual.push_str(&q);
                out.aligned_seq.push_str(&s);
                out.aligned_qual.push_str(&q);
                qs += c_length;
                ts += op.length as i32;
                mo += 1;
            }
        }
    }

    Ok(out)
}
