//! Alignment-record (SAM line) parsing.

use crate::ambig::identify_ambiguous_mutations;
use crate::cigar::{parse_cigar, right_target_pos};
use crate::errors::{MutScanError, Result};
use crate::locate::locate_mutations;
use crate::md::parse_md_tag;
use crate::read::{MappingCategory, Read, ReadType, Strand};

/// Flag bits consumed from an alignment record's FLAG field.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingFlags {
    pub paired: bool,
    pub proper_pair: bool,
    pub unmapped: bool,
    pub mate_unmapped: bool,
    pub reverse_strand: bool,
    pub mate_reverse_strand: bool,
    pub first_in_pair: bool,
    pub second_in_pair: bool,
}

/// Parses the FLAG field of an alignment record.
pub fn parse_flags(field: &str) -> Result<MappingFlags> {
    let bits: u16 = field
        .parse()
        .map_err(|_| MutScanError::alignment("unable to parse alignment flags."))?;
    Ok(MappingFlags {
        paired: bits & 0x1 != 0,
        proper_pair: bits & 0x2 != 0,
        unmapped: bits & 0x4 != 0,
        mate_unmapped: bits & 0x8 != 0,
        reverse_strand: bits & 0x10 != 0,
        mate_reverse_strand: bits & 0x20 != 0,
        first_in_pair: bits & 0x40 != 0,
        second_in_pair: bits & 0x80 != 0,
    })
}

/// Finds an optional `TAG:TYPE:VALUE` field and returns its value.
fn get_sam_tag<'a>(fields: &[&'a str], tag: &str) -> Option<&'a str> {
    fields.iter().skip(11).find_map(|f| {
        if f.starts_with(tag) && f.len() >= 5 {
            Some(&f[5..])
        } else {
            None
        }
    })
}

/// Parses one mapped alignment into a [`Read`].
///
/// Included reads get located mutations and reconstructed slices, plus
/// ambiguous-indel identification unless `variant_mode` is set. Unmapped and
/// low-mapping-quality reads come back with only their span and category so
/// coverage can still be tabulated.
pub fn parse_sam_line(
    line: &str,
    min_mapq: i32,
    input_is_unpaired: bool,
    variant_mode: bool,
) -> Result<Read> {
    let trimmed = line.trim();
    let fields: Vec<&str> = trimmed.split('\t').collect();
    parse_sam_fields(&fields, min_mapq, input_is_unpaired, variant_mode)
}

fn parse_sam_fields(
    fields: &[&str],
    min_mapq: i32,
    input_is_unpaired: bool,
    variant_mode: bool,
) -> Result<Read> {
    if fields.len() < 11 {
        return Err(MutScanError::alignment("unable to parse incomplete line."));
    }

    let flags = parse_flags(fields[1])?;
    let strand = if flags.reverse_strand { Strand::Reverse } else { Strand::Forward };

    let read_type = if input_is_unpaired {
        ReadType::Unpaired
    } else if flags.first_in_pair {
        ReadType::PairedR1
    } else if flags.second_in_pair {
        ReadType::PairedR2
    } else {
        ReadType::Merged
    };

    if fields[2] == "*" || flags.unmapped {
        let mut read = Read::new(0, 0, "");
        read.id = fields[0].to_string();
        read.strand = strand;
        read.read_type = read_type;
        read.mapping_category = MappingCategory::Unmapped;
        return Ok(read);
    }

    let left_target_pos: i32 = fields[3]
        .parse::<i32>()
        .map(|p| p - 1)
        .map_err(|_| {
            MutScanError::alignment("line is incorrectly formatted (couldn't parse mapped location).")
        })?;
    let mapq: i32 = fields[4]
        .parse()
        .map_err(|_| MutScanError::alignment("unable to parse mapping quality."))?;

    let cigar = parse_cigar(fields[5])?;
    let right = right_target_pos(left_target_pos, &cigar);

    let mut read;
    if mapq < min_mapq {
        read = Read::new(left_target_pos, right, "");
        read.mapping_category = MappingCategory::LowMapq;
    } else {
        let md_contents = get_sam_tag(fields, "MD")
            .ok_or_else(|| MutScanError::alignment("no MD tag in alignment."))?;
        let md = parse_md_tag(md_contents)?;
        let located = locate_mutations(left_target_pos, fields[9], fields[10], &cigar, &md)?;

        let mutations = if variant_mode {
            located.mutations
        } else {
            identify_ambiguous_mutations(
                left_target_pos,
                &located.target_seq,
                &located.target_qual,
                &located.aligned_seq,
                &located.aligned_qual,
                &located.mutations,
            )?
        };

        read = Read::new(left_target_pos, right, located.target_seq);
        read.qual = located.target_qual;
        read.mutations = mutations;
    }

    read.id = fields[0].to_string();
    read.strand = strand;
    read.read_type = read_type;
    read.mapped_depth = vec![true; read.span_len()];
    Ok(read)
}

/// Whether two mates form a concordant pair: both included, opposite strands,
/// fragment within bound, and no dovetail (one mate extending past both ends
/// of the other on the wrong side).
pub fn is_concordant(reads: &[Read; 2], max_paired_fragment_length: i32) -> bool {
    let (r1, r2) = (&reads[0], &reads[1]);
    if r1.mapping_category == MappingCategory::Unmapped
        || r2.mapping_category == MappingCategory::Unmapped
    {
        return false;
    }
    if r1.strand == r2.strand {
        return false;
    }
    let fragment_length = r1.right.max(r2.right) - r1.left.min(r2.left);
    if fragment_length > max_paired_fragment_length {
        return false;
    }
    if r1.strand == Strand::Forward {
        if r2.left < r1.left && r1.right > r2.right {
            return false;
        }
    } else if r1.left < r2.left && r2.right > r1.right {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::mutations_to_string;

    const SIMPLE_LINE: &str = "read1\t0\tTPP\t1\t42\t16M\t*\t0\t0\tATGCATGCGTGCATGC\tABCDEFGHIJKLMNOP\tAS:i:100\tMD:Z:8A7";

    #[test]
    fn test_parse_flags() {
        let flags = parse_flags("16").unwrap();
        assert!(flags.reverse_strand);
        assert!(!flags.paired);
        let flags = parse_flags("99").unwrap();
        assert!(flags.paired && flags.proper_pair && flags.mate_reverse_strand && flags.first_in_pair);
        let flags = parse_flags("147").unwrap();
        assert!(flags.second_in_pair && flags.reverse_strand);
        assert!(parse_flags("x").is_err());
    }

    #[test]
    fn test_parse_simple_alignment() {
        let read = parse_sam_line(SIMPLE_LINE, 30, true, false).unwrap();
        assert_eq!(read.id, "read1");
        assert_eq!((read.left, read.right), (0, 15));
        assert_eq!(read.read_type, ReadType::Unpaired);
        assert_eq!(read.mapping_category, MappingCategory::Included);
        assert_eq!(read.seq, "ATGCATGCATGCATGC");
        assert_eq!(mutations_to_string(&read.mutations), r#"7 9 "G" "I" """#);
        assert_eq!(read.mapped_depth.len(), 16);
    }

    #[test]
    fn test_read_type_from_flags() {
        let line = SIMPLE_LINE.replace("read1\t0", "read1\t99");
        let read = parse_sam_line(&line, 30, false, false).unwrap();
        assert_eq!(read.read_type, ReadType::PairedR1);
        let line = SIMPLE_LINE.replace("read1\t0", "read1\t147");
        let read = parse_sam_line(&line, 30, false, false).unwrap();
        assert_eq!(read.read_type, ReadType::PairedR2);
        assert_eq!(read.strand, Strand::Reverse);
        let read = parse_sam_line(SIMPLE_LINE, 30, false, false).unwrap();
        assert_eq!(read.read_type, ReadType::Merged);
    }

    #[test]
    fn test_low_mapq_keeps_span_only() {
        let read = parse_sam_line(SIMPLE_LINE, 50, true, false).unwrap();
        assert_eq!(read.mapping_category, MappingCategory::LowMapq);
        assert_eq!((read.left, read.right), (0, 15));
        assert!(read.seq.is_empty());
        assert!(read.mutations.is_empty());
        assert_eq!(read.mapped_depth.len(), 16);
    }

    #[test]
    fn test_unmapped_read() {
        let line = "read1\t4\t*\t0\t0\t*\t*\t0\t0\tATGC\tHHHH";
        let read = parse_sam_line(line, 30, true, false).unwrap();
        assert_eq!(read.mapping_category, MappingCategory::Unmapped);
    }

    #[test]
    fn test_missing_md_tag_is_error() {
        let line = "read1\t0\tTPP\t1\t42\t16M\t*\t0\t0\tATGCATGCGTGCATGC\tABCDEFGHIJKLMNOP";
        assert!(parse_sam_line(line, 30, true, false).is_err());
    }

    #[test]
    fn test_incomplete_line_is_error() {
        assert!(parse_sam_line("read1\t0\tTPP\t1", 30, true, false).is_err());
    }

    #[test]
    fn test_ambiguous_indel_identified_unless_variant_mode() {
        // one-base deletion of a G inside a GG run: expansion widens it
        let line = "read1\t0\tTPP\t1\t42\t2M1D3M\t*\t0\t0\tATGAT\tabcde\tMD:Z:2^G3";
        let read = parse_sam_line(line, 30, true, false).unwrap();
        assert_eq!(mutations_to_string(&read.mutations), r#"1 4 "G" "c" """#);
        let read = parse_sam_line(line, 30, true, true).unwrap();
        assert_eq!(mutations_to_string(&read.mutations), r#"1 3 "" "" """#);
    }

    fn span_read(left: i32, right: i32, strand: Strand) -> Read {
        let mut read = Read::new(left, right, "");
        read.strand = strand;
        read
    }

    #[test]
    fn test_concordance() {
        let r1 = span_read(0, 99, Strand::Forward);
        let r2 = span_read(50, 149, Strand::Reverse);
        assert!(is_concordant(&[r1.clone(), r2.clone()], 800));
        // fragment too long
        assert!(!is_concordant(&[r1.clone(), span_read(700, 900, Strand::Reverse)], 800));
        // same strand
        assert!(!is_concordant(&[r1.clone(), span_read(50, 149, Strand::Forward)], 800));
        // dovetail: reverse mate entirely inside, extending past both ends
        assert!(!is_concordant(&[span_read(10, 99, Strand::Forward), span_read(5, 80, Strand::Reverse)], 800));
        // unmapped mate
        let mut unmapped = span_read(50, 149, Strand::Reverse);
        unmapped.mapping_category = MappingCategory::Unmapped;
        assert!(!is_concordant(&[r1, unmapped], 800));
    }
}
