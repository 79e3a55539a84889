//! Confound extraction from classified ICA components
//!
//! Pads the mixing matrix back to full scan length and pulls the rejected
//! component time courses into a confounds table for aggressive regression
//! downstream. A decomposition with no rejected components (or one where
//! deleting the rejected columns leaves nothing) yields no confounds table,
//! which is a warning rather than an error unless the caller opts in.

use std::path::PathBuf;

use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::tables::{load_mixing, motion_labels, save_mixing, write_confounds, ComponentTable};
use crate::{Error, Result};

/// Output filename for the padded mixing matrix.
pub const MIXING_FILENAME: &str = "mixing.tsv";
/// Output filename for the confounds table.
pub const CONFOUNDS_FILENAME: &str = "AROMAAggrCompAROMAConfounds.tsv";

/// Confound extraction parameters.
#[derive(Debug, Clone)]
pub struct ConfoundsRequest {
    /// Mixing matrix file (whitespace-delimited, no header)
    pub mixing: PathBuf,
    /// Component classification table (tab-separated, `classification` column)
    pub features: PathBuf,
    /// Output directory; created if missing
    pub out_dir: PathBuf,
    /// Number of non-steady-state volumes to pad back in
    pub skip_vols: usize,
    /// Treat "no confounds produced" as a hard error instead of a warning
    pub err_on_warn: bool,
}

impl ConfoundsRequest {
    pub fn new(mixing: PathBuf, features: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            mixing,
            features,
            out_dir,
            skip_vols: 0,
            err_on_warn: false,
        }
    }

    pub fn with_skip_vols(mut self, skip_vols: usize) -> Self {
        self.skip_vols = skip_vols;
        self
    }

    pub fn with_err_on_warn(mut self, err_on_warn: bool) -> Self {
        self.err_on_warn = err_on_warn;
        self
    }
}

/// In-memory confounds table plus its report column labels.
#[derive(Debug, Clone)]
pub struct BuiltConfounds {
    /// Time x rejected-component matrix
    pub table: DMatrix<f64>,
    /// `aroma_motion_<k>` labels, ascending original component index
    pub labels: Vec<String>,
}

/// Paths produced by [`extract_ica_confounds`].
#[derive(Debug, Clone)]
pub struct ConfoundExtraction {
    /// Confounds table, absent for a degenerate decomposition
    pub confounds: Option<PathBuf>,
    /// Padded mixing matrix, always written
    pub mixing: PathBuf,
}

/// Prepend `skip_vols` rows of zeros to the mixing matrix.
pub fn pad_mixing(mixing: &DMatrix<f64>, skip_vols: usize) -> DMatrix<f64> {
    if skip_vols == 0 {
        return mixing.clone();
    }
    let mut padded = DMatrix::zeros(mixing.nrows() + skip_vols, mixing.ncols());
    padded
        .view_mut((skip_vols, 0), (mixing.nrows(), mixing.ncols()))
        .copy_from(mixing);
    padded
}

/// Build the confounds table from a mixing matrix and its classifications.
///
/// Returns the confounds (or `None` for a degenerate decomposition) together
/// with the padded mixing matrix, which is produced regardless of the
/// classification outcome.
pub fn build_confounds(
    mixing: &DMatrix<f64>,
    components: &ComponentTable,
    skip_vols: usize,
) -> Result<(Option<BuiltConfounds>, DMatrix<f64>)> {
    if components.len() != mixing.ncols() {
        return Err(Error::Schema(format!(
            "classification table has {} rows, mixing matrix has {} components",
            components.len(),
            mixing.ncols()
        )));
    }

    let padded = pad_mixing(mixing, skip_vols);
    let rejected = components.rejected_indices();

    if rejected.is_empty() {
        warn!("no noise components were classified");
        return Ok((None, padded));
    }

    // Sanity guard on the complement: deleting the rejected columns must
    // leave a non-empty array. Fires only for a zero-row matrix or when
    // every column is rejected.
    let remaining_cols = padded.ncols() - rejected.len();
    if padded.nrows() == 0 || remaining_cols == 0 {
        warn!("no signal components were classified");
        return Ok((None, padded));
    }

    let table = padded.select_columns(rejected.iter());
    let labels = motion_labels(&rejected);
    Ok((Some(BuiltConfounds { table, labels }), padded))
}

/// Extract confounds from files and write the outputs.
///
/// Always writes the padded mixing matrix; writes the confounds table only
/// when the decomposition is non-degenerate. With `err_on_warn` set, a
/// missing confounds table becomes [`Error::DegenerateDecomposition`].
pub fn extract_ica_confounds(request: &ConfoundsRequest) -> Result<ConfoundExtraction> {
    let mixing = load_mixing(&request.mixing)?;
    let components = ComponentTable::from_file(&request.features)?;

    let (built, padded) = build_confounds(&mixing, &components, request.skip_vols)?;

    std::fs::create_dir_all(&request.out_dir)?;
    let mixing_out = request.out_dir.join(MIXING_FILENAME);
    save_mixing(&mixing_out, &padded)?;
    debug!(path = %mixing_out.display(), "wrote padded mixing matrix");

    let confounds = match built {
        Some(built) => {
            let path = request.out_dir.join(CONFOUNDS_FILENAME);
            write_confounds(&path, &built.table, &built.labels)?;
            debug!(path = %path.display(), columns = built.labels.len(), "wrote confounds table");
            Some(path)
        }
        None => {
            if request.err_on_warn {
                return Err(Error::DegenerateDecomposition);
            }
            None
        }
    };

    Ok(ConfoundExtraction {
        confounds,
        mixing: mixing_out,
    })
}
