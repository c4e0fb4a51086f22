//! Scanning accumulators over alignment target positions.
//!
//! A [`ScanningDeque`] is a window of per-position cells indexed by target
//! coordinate. The right edge grows as reads arrive; advancing the left edge
//! renders and discards the cells that fall behind it, so with
//! position-sorted input memory stays bounded by the open window. Two
//! accumulators build on it: [`MutationCounter`] tabulates mutation classes
//! and depths, [`VariantCounter`] tabulates sequence variants.

use std::collections::{BTreeMap, HashMap};
use std::collections::VecDeque;

use itertools::Itertools;

use crate::histogram::Histogram;
use crate::mutation::{mutation_classes, Mutation};
use crate::read::{MappingCategory, Read};

/// Windowed per-position storage with a target coordinate anchoring index 0.
#[derive(Debug, Default)]
pub struct ScanningDeque<T> {
    /// Target position of the deque's front cell
    pub target_pos: i32,
    deq: VecDeque<T>,
}

impl<T: Default> ScanningDeque<T> {
    pub fn new() -> Self {
        ScanningDeque { target_pos: 0, deq: VecDeque::new() }
    }

    /// Grows the deque so its back cell sits at `new_target_right`.
    pub fn update_right_bound(&mut self, new_target_right: i32) {
        let current_right = self.target_pos + self.deq.len() as i32 - 1;
        if new_target_right > current_right {
            self.deq.resize_with((new_target_right - self.target_pos + 1) as usize, T::default);
        }
    }

    /// Drains every cell left of `new_target_left` in position order and
    /// advances the anchor. Cells are returned for rendering.
    pub fn advance_left(&mut self, new_target_left: i32) -> Vec<T> {
        if new_target_left <= self.target_pos {
            return Vec::new();
        }
        let n = ((new_target_left - self.target_pos) as usize).min(self.deq.len());
        self.target_pos = new_target_left;
        self.deq.drain(..n).collect()
    }

    /// Drains every remaining cell.
    pub fn drain_all(&mut self) -> Vec<T> {
        let n = self.deq.len();
        self.target_pos += n as i32;
        self.deq.drain(..).collect()
    }

    /// Mutable cell at a target coordinate, when inside the window.
    pub fn cell_mut(&mut self, target_index: i32) -> Option<&mut T> {
        usize::try_from(target_index - self.target_pos).ok().and_then(|i| self.deq.get_mut(i))
    }

    pub fn len(&self) -> usize {
        self.deq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deq.is_empty()
    }
}

/// The output column set for mutation counting, fixed at construction.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    names: Vec<String>,
    separate_ambig_counts: bool,
}

impl ColumnLayout {
    /// Builds the column list: every mutation class (doubled with `_ambig`
    /// columns when requested), the depth pseudo-columns, then either a
    /// single mapped-depth column or one per primer pair.
    pub fn new(separate_ambig_counts: bool, primer_pairs: i32) -> Self {
        let mut names = Vec::new();
        for class in mutation_classes() {
            names.push(class.to_string());
            if separate_ambig_counts {
                names.push(format!("{class}_ambig"));
            }
        }
        names.push("read_depth".to_string());
        names.push("effective_depth".to_string());
        names.push("off_target_mapped_depth".to_string());
        names.push("low_mapq_mapped_depth".to_string());
        if primer_pairs > 0 {
            for i in 1..=primer_pairs {
                names.push(format!("primer_pair_{i}_mapped_depth"));
            }
        } else {
            names.push("mapped_depth".to_string());
        }
        ColumnLayout { names, separate_ambig_counts }
    }

    /// Tab-separated header line.
    pub fn header(&self) -> String {
        self.names.iter().join("\t")
    }
}

/// One position's counters, keyed by column name.
pub type CountRow = HashMap<String, u64>;

/// Per-position mutation-class counts and read depths.
pub struct MutationCounter {
    columns: ColumnLayout,
    deque: ScanningDeque<CountRow>,
    read_lengths: Histogram,
    mutations_per_read: Histogram,
}

impl MutationCounter {
    pub fn new(columns: ColumnLayout) -> Self {
        MutationCounter {
            columns,
            deque: ScanningDeque::new(),
            read_lengths: Histogram::new("Read lengths", 0, 1000, 21),
            mutations_per_read: Histogram::new("Mutations per read", 0, 20, 21),
        }
    }

    pub fn print_header(&self) -> String {
        let mut s = self.columns.header();
        s.push('\n');
        s
    }

    fn render(&self, rows: Vec<CountRow>) -> String {
        let mut out = String::new();
        for row in rows {
            let line = self
                .columns
                .names
                .iter()
                .map(|name| row.get(name).copied().unwrap_or(0).to_string())
                .join("\t");
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    pub fn update_right_bound(&mut self, new_target_right: i32) {
        self.deque.update_right_bound(new_target_right);
    }

    /// Renders and discards rows left of `new_target_left`.
    pub fn update_left_bound(&mut self, new_target_left: i32) -> String {
        let rows = self.deque.advance_left(new_target_left);
        self.render(rows)
    }

    /// Renders and discards every remaining row.
    pub fn print_all_values(&mut self) -> String {
        let rows = self.deque.drain_all();
        self.render(rows)
    }

    pub fn print_histograms(&self) -> String {
        format!(
            "{}\n{}",
            self.read_lengths.print_freq_table("range"),
            self.mutations_per_read.print_freq_table("simple")
        )
    }

    /// Folds one processed read into the window.
    ///
    /// Mutations count at their rightmost changed position. Read and
    /// effective depths count only for included reads; every read also
    /// contributes to a mapped-depth column chosen by its mapping category
    /// and primer pair.
    pub fn update_counts(&mut self, read: &Read) {
        self.read_lengths.count(read.depth.len() as i32);
        self.mutations_per_read.count(read.mutations.len() as i32);

        for m in &read.mutations {
            let mut tag = match m.tag {
                Some(tag) => tag.to_string(),
                None => String::new(),
            };
            if self.columns.separate_ambig_counts && m.ambig {
                tag.push_str("_ambig");
            }
            if let Some(cell) = self.deque.cell_mut(m.right - 1) {
                *cell.entry(tag).or_insert(0) += 1;
            }
        }

        if read.mapping_category == MappingCategory::Included {
            for i in 0..read.depth.len() as i32 {
                if let Some(cell) = self.deque.cell_mut(read.left + i) {
                    *cell.entry("read_depth".to_string()).or_insert(0) += 1;
                }
            }
            for (i, &covered) in read.depth.iter().enumerate() {
                if covered {
                    if let Some(cell) = self.deque.cell_mut(read.left + i as i32) {
                        *cell.entry("effective_depth".to_string()).or_insert(0) += 1;
                    }
                }
            }
        }

        let mapped_column = match read.mapping_category {
            MappingCategory::OffTarget => "off_target_mapped_depth".to_string(),
            MappingCategory::LowMapq => "low_mapq_mapped_depth".to_string(),
            _ if read.primer_pair >= 0 => {
                format!("primer_pair_{}_mapped_depth", read.primer_pair + 1)
            }
            _ => "mapped_depth".to_string(),
        };
        for (i, &covered) in read.mapped_depth.iter().enumerate() {
            if covered {
                if let Some(cell) = self.deque.cell_mut(read.left + i as i32) {
                    *cell.entry(mapped_column.clone()).or_insert(0) += 1;
                }
            }
        }
    }
}

/// One position's variant table: depth plus counts per canonical variant.
#[derive(Debug, Default, Clone)]
pub struct VariantRow {
    pub depth: u64,
    pub counts: BTreeMap<Mutation, u64>,
}

/// Per-position sequence variants, keyed by leftmost unchanged position.
pub struct VariantCounter {
    deque: ScanningDeque<VariantRow>,
}

impl Default for VariantCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl VariantCounter {
    pub fn new() -> Self {
        VariantCounter { deque: ScanningDeque::new() }
    }

    fn render(rows: Vec<VariantRow>) -> String {
        let mut out = String::new();
        for row in rows {
            out.push_str(&row.depth.to_string());
            out.push(' ');
            for (m, count) in &row.counts {
                out.push_str(&format!("({}-{}, \"{}\", {count})", m.left, m.right, m.seq));
            }
            out.push('\n');
        }
        out
    }

    pub fn update_right_bound(&mut self, new_target_right: i32) {
        self.deque.update_right_bound(new_target_right);
    }

    pub fn update_left_bound(&mut self, new_target_left: i32) -> String {
        Self::render(self.deque.advance_left(new_target_left))
    }

    pub fn print_all_values(&mut self) -> String {
        Self::render(self.deque.drain_all())
    }

    /// Folds one processed read into the window: effective depth per
    /// position, and each mutation (qualities blanked so identical variants
    /// with different basecall scores coalesce) at its leftmost position.
    pub fn update_counts(&mut self, read: &Read) {
        for (i, &covered) in read.depth.iter().enumerate() {
            if covered {
                if let Some(cell) = self.deque.cell_mut(read.left + i as i32) {
                    cell.depth += 1;
                }
            }
        }
        for m in &read.mutations {
            let mut key = m.clone();
            key.qual = String::new();
            if let Some(cell) = self.deque.cell_mut(key.left) {
                *cell.counts.entry(key).or_insert(0) += 1;
            }
        }
    }
}
