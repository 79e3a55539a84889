//! ICA-AROMA confound extraction and denoising for BOLD fMRI.
//!
//! Given an ICA decomposition of a BOLD series (a mixing matrix of component
//! time courses plus a per-component signal/noise classification), this crate
//! rebuilds a confounds table for aggressive regression downstream and
//! produces a denoised 4D image using one of three regression strategies.
//!
//! # Modules
//! - `nifti_io`: NIfTI volume reading/writing (3D masks, 4D series)
//! - `tables`: mixing-matrix and classification-table I/O
//! - `linalg`: least-squares and z-scoring helpers
//! - `masker`: 4D <-> 2D masking transform with confound removal
//! - `confounds`: confound extraction from classified components
//! - `denoise`: aggressive / non-aggressive / orthogonalized-aggressive denoising

pub mod confounds;
pub mod denoise;
pub mod linalg;
pub mod masker;
pub mod nifti_io;
pub mod tables;

pub use confounds::{
    build_confounds, extract_ica_confounds, BuiltConfounds, ConfoundExtraction, ConfoundsRequest,
};
pub use denoise::{denoise_to_file, denoise_volume, DenoiseMethod, DenoiseRequest};
pub use masker::Masker;
pub use nifti_io::{Nifti4d, NiftiMask};
pub use tables::{Classification, ComponentTable};

/// Common result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type.
///
/// Everything here is fatal and non-retryable: the inputs are fixed files
/// and the computations are deterministic, so a failure means the inputs are
/// invalid, not that the operation should be attempted again.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    Nifti(String),

    #[error("table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed numeric matrix in {path}: {reason}")]
    MalformedMatrix { path: String, reason: String },

    #[error("schema violation: {0}")]
    Schema(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("unknown denoising method: {0:?}")]
    UnknownMethod(String),

    #[error("ICA-AROMA produced no confounds (degenerate decomposition)")]
    DegenerateDecomposition,
}
