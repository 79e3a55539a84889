//! ICA-based denoising of a BOLD series
//!
//! Three regression strategies over the classified component time courses:
//!
//! - aggressive: regress the rejected components straight out of the masked
//!   data and keep the residual;
//! - orthogonalized-aggressive: first remove from the rejected courses the
//!   part predictable from the accepted courses, then run the aggressive
//!   regression with those purified regressors;
//! - non-aggressive: fit one model over rejected + accepted + constant, and
//!   subtract only the part of the fit attributable to the rejected
//!   components.
//!
//! The mixing matrix is trimmed of `skip_vols` leading rows here; the BOLD
//! series itself is expected to be already aligned.

use std::path::PathBuf;
use std::str::FromStr;

use nalgebra::DMatrix;
use tracing::debug;

use crate::linalg::{hstack, lstsq, zscore_columns};
use crate::masker::Masker;
use crate::nifti_io::{load_bold, load_mask, save_bold, Nifti4d, NiftiMask};
use crate::tables::{load_mixing, ComponentTable};
use crate::{Error, Result};

/// Output filename for the denoised series.
pub const DENOISED_FILENAME: &str = "denoised.nii.gz";

/// Denoising strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenoiseMethod {
    Aggressive,
    NonAggressive,
    OrthogonalizedAggressive,
}

impl DenoiseMethod {
    /// Parse a method name, accepting both the short wire spellings
    /// (`aggr`, `nonaggr`, `orthaggr`) and the long names.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "aggr" | "aggressive" => Ok(DenoiseMethod::Aggressive),
            "nonaggr" | "nonaggressive" | "non-aggressive" => Ok(DenoiseMethod::NonAggressive),
            "orthaggr" | "orthogonalized-aggressive" => Ok(DenoiseMethod::OrthogonalizedAggressive),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

impl FromStr for DenoiseMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DenoiseMethod::parse(s)
    }
}

/// Denoising parameters.
#[derive(Debug, Clone)]
pub struct DenoiseRequest {
    pub method: DenoiseMethod,
    /// BOLD series to denoise
    pub bold: PathBuf,
    /// Binary brain mask
    pub mask: PathBuf,
    /// Mixing matrix (whitespace-delimited, no header)
    pub mixing: PathBuf,
    /// Component classification table
    pub features: PathBuf,
    /// Leading mixing rows to drop; the BOLD series is not trimmed
    pub skip_vols: usize,
    /// Output directory; created if missing
    pub out_dir: PathBuf,
}

impl DenoiseRequest {
    pub fn new(
        method: DenoiseMethod,
        bold: PathBuf,
        mask: PathBuf,
        mixing: PathBuf,
        features: PathBuf,
        out_dir: PathBuf,
    ) -> Self {
        Self {
            method,
            bold,
            mask,
            mixing,
            features,
            skip_vols: 0,
            out_dir,
        }
    }

    pub fn with_skip_vols(mut self, skip_vols: usize) -> Self {
        self.skip_vols = skip_vols;
        self
    }
}

/// Residual of the rejected courses after removing everything the accepted
/// courses can predict (ordinary least squares).
fn orthogonalize(rejected: &DMatrix<f64>, accepted: &DMatrix<f64>) -> DMatrix<f64> {
    if accepted.ncols() == 0 {
        return rejected.clone();
    }
    let betas = lstsq(accepted, rejected);
    rejected - accepted * betas
}

/// Denoise a BOLD series in memory.
///
/// `mixing` carries one row per time point and one column per component; its
/// first `skip_vols` rows are dropped before use and the remainder must match
/// the BOLD time dimension.
pub fn denoise_volume(
    method: DenoiseMethod,
    bold: &Nifti4d,
    mask: &NiftiMask,
    mixing: &DMatrix<f64>,
    components: &ComponentTable,
    skip_vols: usize,
) -> Result<Nifti4d> {
    if components.len() != mixing.ncols() {
        return Err(Error::Schema(format!(
            "classification table has {} rows, mixing matrix has {} components",
            components.len(),
            mixing.ncols()
        )));
    }
    if skip_vols > mixing.nrows() {
        return Err(Error::ShapeMismatch(format!(
            "cannot drop {} rows from a {}-row mixing matrix",
            skip_vols,
            mixing.nrows()
        )));
    }

    let trimmed = mixing
        .rows(skip_vols, mixing.nrows() - skip_vols)
        .into_owned();
    if trimmed.nrows() != bold.n_volumes() {
        return Err(Error::ShapeMismatch(format!(
            "mixing matrix has {} rows after dropping {}, BOLD series has {} volumes",
            trimmed.nrows(),
            skip_vols,
            bold.n_volumes()
        )));
    }

    let rejected_idx = components.rejected_indices();
    let accepted_idx = components.accepted_indices();
    let rejected = zscore_columns(&trimmed.select_columns(rejected_idx.iter()));
    let accepted = zscore_columns(&trimmed.select_columns(accepted_idx.iter()));

    let masker = Masker::new(mask);

    let denoised = match method {
        DenoiseMethod::Aggressive => {
            let residual = masker.transform_with_confounds(bold, &rejected)?;
            masker.inverse_transform(&residual)?
        }
        DenoiseMethod::OrthogonalizedAggressive => {
            let purified = orthogonalize(&rejected, &accepted);
            let residual = masker.transform_with_confounds(bold, &purified)?;
            masker.inverse_transform(&residual)?
        }
        DenoiseMethod::NonAggressive => {
            let data = masker.transform(bold)?;

            let ones = DMatrix::from_element(trimmed.nrows(), 1, 1.0);
            let design = hstack(&[&rejected, &accepted, &ones]);
            let betas = lstsq(&design, &data);

            // Keep only the fit attributable to the rejected components; the
            // accepted and constant coefficients are discarded.
            let noise_betas = betas.rows(0, rejected.ncols()).into_owned();
            let predicted = &rejected * noise_betas;
            masker.inverse_transform(&(data - predicted))?
        }
    };

    Ok(denoised)
}

/// Denoise from files and write `denoised.nii.gz` into the output directory.
pub fn denoise_to_file(request: &DenoiseRequest) -> Result<PathBuf> {
    let bold = load_bold(&request.bold)?;
    let mask = load_mask(&request.mask)?;
    let mixing = load_mixing(&request.mixing)?;
    let components = ComponentTable::from_file(&request.features)?;

    let denoised = denoise_volume(
        request.method,
        &bold,
        &mask,
        &mixing,
        &components,
        request.skip_vols,
    )?;

    std::fs::create_dir_all(&request.out_dir)?;
    let out = request.out_dir.join(DENOISED_FILENAME);
    save_bold(&out, &denoised)?;
    debug!(path = %out.display(), method = ?request.method, "wrote denoised series");
    Ok(out)
}
