//! Masking transform
//!
//! Maps between a 4D series and its 2D time-by-voxel representation over a
//! fixed binary mask, mirroring the masker boundary the denoiser needs:
//! extraction, optional confound removal during extraction, and reinsertion
//! into the mask's spatial layout.

use nalgebra::DMatrix;

use crate::linalg::lstsq;
use crate::nifti_io::{Nifti4d, NiftiMask};
use crate::{Error, Result};

/// Signal-cleaning options applied during extraction.
///
/// Everything defaults to off; the denoiser never enables any of these, it
/// wants the raw time series.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskerOptions {
    /// Z-score each voxel's time course after extraction
    pub standardize: bool,
    /// Remove a per-voxel linear trend after extraction
    pub detrend: bool,
}

/// Fixed-mask transform between 4D volumes and time x voxel matrices.
#[derive(Debug, Clone)]
pub struct Masker {
    mask: NiftiMask,
    options: MaskerOptions,
    /// Linear spatial indices of in-mask voxels, ascending
    in_mask: Vec<usize>,
}

impl Masker {
    /// Masker with all cleaning options disabled.
    pub fn new(mask: &NiftiMask) -> Self {
        Self::with_options(mask, MaskerOptions::default())
    }

    pub fn with_options(mask: &NiftiMask, options: MaskerOptions) -> Self {
        let in_mask = mask
            .data
            .iter()
            .enumerate()
            .filter(|(_, &m)| m != 0)
            .map(|(i, _)| i)
            .collect();
        Self {
            mask: mask.clone(),
            options,
            in_mask,
        }
    }

    /// Number of in-mask voxels (columns of the 2D representation).
    pub fn n_voxels(&self) -> usize {
        self.in_mask.len()
    }

    fn check_volume(&self, volume: &Nifti4d) -> Result<()> {
        if volume.spatial_dims() != self.mask.dims {
            return Err(Error::ShapeMismatch(format!(
                "volume spatial dims {:?} do not match mask dims {:?}",
                volume.spatial_dims(),
                self.mask.dims
            )));
        }
        Ok(())
    }

    /// Extract the time x voxel matrix of in-mask voxels.
    pub fn transform(&self, volume: &Nifti4d) -> Result<DMatrix<f64>> {
        self.check_volume(volume)?;

        let (nx, ny, nz, nt) = volume.dims;
        let n_spatial = nx * ny * nz;
        let n_vox = self.in_mask.len();

        let mut data = DMatrix::zeros(nt, n_vox);
        for t in 0..nt {
            let base = t * n_spatial;
            for (col, &idx) in self.in_mask.iter().enumerate() {
                data[(t, col)] = volume.data[base + idx];
            }
        }

        if self.options.detrend {
            data = detrend_columns(&data);
        }
        if self.options.standardize {
            data = crate::linalg::zscore_columns(&data);
        }
        Ok(data)
    }

    /// Extract and regress the given confounds out in one step.
    ///
    /// The result is the least-squares residual of the extracted data after
    /// projection onto `regressors` (time x k). With zero regressor columns
    /// this is a plain extraction.
    pub fn transform_with_confounds(
        &self,
        volume: &Nifti4d,
        regressors: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>> {
        let data = self.transform(volume)?;

        if regressors.ncols() == 0 {
            return Ok(data);
        }
        if regressors.nrows() != data.nrows() {
            return Err(Error::ShapeMismatch(format!(
                "confound regressors have {} rows, volume has {} time points",
                regressors.nrows(),
                data.nrows()
            )));
        }

        let betas = lstsq(regressors, &data);
        Ok(&data - regressors * betas)
    }

    /// Reinsert a time x voxel matrix into the mask's spatial layout.
    ///
    /// Out-of-mask voxels are zero. Voxel sizes and affine come from the
    /// mask, so the output is aligned with the input geometry.
    pub fn inverse_transform(&self, data: &DMatrix<f64>) -> Result<Nifti4d> {
        if data.ncols() != self.in_mask.len() {
            return Err(Error::ShapeMismatch(format!(
                "matrix has {} columns, mask has {} voxels",
                data.ncols(),
                self.in_mask.len()
            )));
        }

        let (nx, ny, nz) = self.mask.dims;
        let n_spatial = nx * ny * nz;
        let nt = data.nrows();

        let mut out = vec![0.0; n_spatial * nt];
        for t in 0..nt {
            let base = t * n_spatial;
            for (col, &idx) in self.in_mask.iter().enumerate() {
                out[base + idx] = data[(t, col)];
            }
        }

        Ok(Nifti4d {
            data: out,
            dims: (nx, ny, nz, nt),
            voxel_size: self.mask.voxel_size,
            affine: self.mask.affine,
        })
    }
}

/// Remove the per-column least-squares linear trend (slope and intercept).
fn detrend_columns(data: &DMatrix<f64>) -> DMatrix<f64> {
    let nt = data.nrows();
    let design = DMatrix::from_fn(nt, 2, |row, col| if col == 0 { row as f64 } else { 1.0 });
    let betas = lstsq(&design, data);
    data - design * betas
}
