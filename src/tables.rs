//! Delimited-table I/O
//!
//! The mixing matrix travels as whitespace-delimited numeric text with no
//! header (one row per time point, one column per component). The component
//! classification table is tab-separated with a header row and is matched to
//! the mixing matrix by row order: row index == component index.

use std::path::Path;

use nalgebra::DMatrix;

use crate::{Error, Result};

/// Per-component classification from the feature-scoring stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Signal component
    Accepted,
    /// Motion-noise component
    Rejected,
    /// Any other label (ignored by both index sets)
    Other(String),
}

impl Classification {
    fn from_label(label: &str) -> Self {
        match label {
            "accepted" => Classification::Accepted,
            "rejected" => Classification::Rejected,
            other => Classification::Other(other.to_string()),
        }
    }
}

/// Ordered component classifications; row index is the component index.
#[derive(Debug, Clone)]
pub struct ComponentTable {
    classifications: Vec<Classification>,
}

impl ComponentTable {
    pub fn new(classifications: Vec<Classification>) -> Self {
        Self { classifications }
    }

    /// Read a tab-separated table and pull out its `classification` column.
    ///
    /// A missing `classification` column is a fatal schema error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let col = headers
            .iter()
            .position(|h| h == "classification")
            .ok_or_else(|| {
                Error::Schema(format!(
                    "{}: no 'classification' column in header",
                    path.display()
                ))
            })?;

        let mut classifications = Vec::new();
        for record in reader.records() {
            let record = record?;
            let label = record.get(col).ok_or_else(|| {
                Error::Schema(format!(
                    "{}: row {} has no classification field",
                    path.display(),
                    classifications.len()
                ))
            })?;
            classifications.push(Classification::from_label(label));
        }

        Ok(Self { classifications })
    }

    pub fn len(&self) -> usize {
        self.classifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifications.is_empty()
    }

    /// Component indices classified as rejected, ascending.
    pub fn rejected_indices(&self) -> Vec<usize> {
        self.indices_of(&Classification::Rejected)
    }

    /// Component indices classified as accepted, ascending.
    pub fn accepted_indices(&self) -> Vec<usize> {
        self.indices_of(&Classification::Accepted)
    }

    fn indices_of(&self, wanted: &Classification) -> Vec<usize> {
        self.classifications
            .iter()
            .enumerate()
            .filter(|(_, c)| *c == wanted)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Load a whitespace-delimited numeric matrix with no header.
///
/// A single data row parses as a 1 x n matrix. Ragged rows or non-numeric
/// tokens are fatal.
pub fn load_mixing(path: &Path) -> Result<DMatrix<f64>> {
    let text = std::fs::read_to_string(path)?;
    let malformed = |reason: String| Error::MalformedMatrix {
        path: path.display().to_string(),
        reason,
    };

    let mut values: Vec<f64> = Vec::new();
    let mut ncols = 0usize;
    let mut nrows = 0usize;

    for (lineno, line) in text.lines().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if nrows == 0 {
            ncols = tokens.len();
        } else if tokens.len() != ncols {
            return Err(malformed(format!(
                "line {} has {} columns, expected {}",
                lineno + 1,
                tokens.len(),
                ncols
            )));
        }
        for token in tokens {
            let value: f64 = token
                .parse()
                .map_err(|_| malformed(format!("line {}: invalid number {:?}", lineno + 1, token)))?;
            values.push(value);
        }
        nrows += 1;
    }

    if nrows == 0 {
        return Err(malformed("no data rows".to_string()));
    }

    Ok(DMatrix::from_row_slice(nrows, ncols, &values))
}

/// Write a numeric matrix as tab-separated text, no header.
pub fn save_mixing(path: &Path, matrix: &DMatrix<f64>) -> Result<()> {
    let mut out = String::new();
    for row in 0..matrix.nrows() {
        for col in 0..matrix.ncols() {
            if col > 0 {
                out.push('\t');
            }
            out.push_str(&format!("{:e}", matrix[(row, col)]));
        }
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Column labels for a set of rejected components: 1-based original index,
/// zero-padded to two digits, matching the component report numbering.
pub fn motion_labels(indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .map(|&idx| format!("aroma_motion_{:02}", idx + 1))
        .collect()
}

/// Write a confounds table: tab-separated, one header row, no index column.
pub fn write_confounds(path: &Path, table: &DMatrix<f64>, labels: &[String]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;

    writer.write_record(labels)?;
    for row in 0..table.nrows() {
        let record: Vec<String> = (0..table.ncols())
            .map(|col| table[(row, col)].to_string())
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_mixing_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixing.txt");
        std::fs::write(&path, "1.0  2.0 -3.5\n0.25\t4e-2 6\n").unwrap();

        let m = load_mixing(&path).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(0, 2)], -3.5);
        assert_eq!(m[(1, 1)], 0.04);
    }

    #[test]
    fn test_load_mixing_single_row_is_2d() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixing.txt");
        std::fs::write(&path, "1 2 3\n").unwrap();

        let m = load_mixing(&path).unwrap();
        assert_eq!(m.shape(), (1, 3));
    }

    #[test]
    fn test_load_mixing_ragged_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixing.txt");
        std::fs::write(&path, "1 2 3\n4 5\n").unwrap();

        assert!(matches!(
            load_mixing(&path),
            Err(Error::MalformedMatrix { .. })
        ));
    }

    #[test]
    fn test_load_mixing_bad_token_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixing.txt");
        std::fs::write(&path, "1 2\n3 abc\n").unwrap();

        assert!(matches!(
            load_mixing(&path),
            Err(Error::MalformedMatrix { .. })
        ));
    }

    #[test]
    fn test_mixing_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixing.tsv");
        let m = DMatrix::from_row_slice(2, 2, &[0.125, -3.0, 1e-9, 42.5]);

        save_mixing(&path, &m).unwrap();
        let back = load_mixing(&path).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_component_table_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.tsv");
        std::fs::write(
            &path,
            "component\tmax_rp_corr\tclassification\n0\t0.9\trejected\n1\t0.1\taccepted\n2\t0.5\trejected\n3\t0.2\tedge\n",
        )
        .unwrap();

        let table = ComponentTable::from_file(&path).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.rejected_indices(), vec![0, 2]);
        assert_eq!(table.accepted_indices(), vec![1]);
    }

    #[test]
    fn test_component_table_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.tsv");
        std::fs::write(&path, "component\tscore\n0\t0.9\n").unwrap();

        assert!(matches!(
            ComponentTable::from_file(&path),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_motion_labels_zero_padded() {
        assert_eq!(
            motion_labels(&[0, 4, 11]),
            vec!["aroma_motion_01", "aroma_motion_05", "aroma_motion_12"]
        );
    }

    #[test]
    fn test_write_confounds_header_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confounds.tsv");
        let table = DMatrix::from_row_slice(2, 2, &[0.5, 1.5, -2.0, 3.0]);

        write_confounds(&path, &table, &motion_labels(&[1, 2])).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "aroma_motion_02\taroma_motion_03");
        assert_eq!(lines[1], "0.5\t1.5");
        assert_eq!(lines[2], "-2\t3");
    }
}
