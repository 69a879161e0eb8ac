//! METS manifest parsing.

pub mod mets;
