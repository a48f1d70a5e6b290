//! psm-rescore: semi-supervised rescoring of peptide-spectrum matches.
//!
//! The crate learns a linear discriminant between target and decoy PSMs
//! without hand-labelled training data. Each cross-validation fold bootstraps
//! its positive set from the targets passing a selection FDR, retrains an
//! L2-SVM over a small (Cpos, Cneg) grid and re-ranks its PSMs. The held-out
//! folds are then merged and calibrated into q-values and posterior error
//! probabilities.
//!
//! Readers and writers for the tab-delimited "pin" format, weight files and
//! the XML report live in [`io`]; everything else operates on in-memory
//! [`psm::Psm`] records.
pub mod config;
pub mod data_handling;
pub mod enzyme;
pub mod error;
pub mod io;
pub mod models;
pub mod preprocessing;
pub mod psm;
pub mod psm_scorer;
pub mod sanity_check;
pub mod scores;
pub mod stats;
