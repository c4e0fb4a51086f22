#![deny(unsafe_code)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::module_name_repetitions
)]

//! # mutscan - mutation parsing and counting for MaP sequencing
//!
//! Core library for turning aligned chemical-probing reads into per-position
//! mutation counts, read depths, and sequence-variant tables.
//!
//! The pipeline has two halves, mirrored by the two CLI subcommands:
//!
//! 1. **Parsing** (`mutscan parse`): each alignment record is decoded
//!    ([`sam`], [`cigar`], [`md`]), its mutations located against the
//!    reconstructed target ([`locate`]), ambiguous indels identified
//!    ([`ambig`]), mates merged ([`merge`]), ends or primers trimmed
//!    ([`trim`]), nearby mutations collapsed ([`collapse`]), classified
//!    ([`mutation`]), and quality-filtered ([`filter`]); the result is one
//!    processed [`read::Read`] per record, serialized as a tab-separated
//!    intermediate line.
//! 2. **Counting** (`mutscan count`): processed reads stream through the
//!    scanning accumulators ([`counter`]), which emit one tabular row per
//!    target position.
//!
//! Coordinates are 0-based throughout; a mutation's `left`/`right` bounds are
//! the nearest *unchanged* target positions, so spans touching a read's first
//! position can carry `left == -1`.

pub mod ambig;
pub mod cigar;
pub mod collapse;
pub mod counter;
pub mod errors;
pub mod filter;
pub mod histogram;
pub mod io;
pub mod locate;
pub mod md;
pub mod merge;
pub mod mutation;
pub mod pipeline;
pub mod primer;
pub mod process;
pub mod read;
pub mod sam;
pub mod trim;
pub mod util;

pub use errors::{MutScanError, Result};
