//! NIfTI file I/O
//!
//! Reads the 4D BOLD series and the 3D brain mask, and writes the denoised
//! 4D output. Both .nii and .nii.gz are supported (gzip is auto-detected on
//! read; on write the extension decides).

use std::path::Path;

use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject, ReaderOptions};

use crate::{Error, Result};

/// A 4D BOLD series, flattened in Fortran order (x fastest, then y, z, t).
///
/// Voxel values carry the header scaling (`scl_slope`/`scl_inter`), which the
/// reader applies during conversion.
#[derive(Debug, Clone)]
pub struct Nifti4d {
    /// Volume data, length nx * ny * nz * nt
    pub data: Vec<f64>,
    /// Dimensions (nx, ny, nz, nt)
    pub dims: (usize, usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

impl Nifti4d {
    /// Spatial dimensions (nx, ny, nz).
    pub fn spatial_dims(&self) -> (usize, usize, usize) {
        (self.dims.0, self.dims.1, self.dims.2)
    }

    /// Number of time points.
    pub fn n_volumes(&self) -> usize {
        self.dims.3
    }
}

/// A binary spatial mask: 1 = in-brain voxel, 0 = background.
#[derive(Debug, Clone)]
pub struct NiftiMask {
    /// Mask data in Fortran order, length nx * ny * nz
    pub data: Vec<u8>,
    /// Dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

impl NiftiMask {
    /// Number of nonzero mask voxels.
    pub fn n_voxels(&self) -> usize {
        self.data.iter().filter(|&&m| m != 0).count()
    }
}

fn read_object(path: &Path) -> Result<InMemNiftiObject> {
    // .nii and .nii.gz both handled; the reader detects gzip by extension.
    ReaderOptions::new()
        .read_file(path)
        .map_err(|e| Error::Nifti(format!("{}: {}", path.display(), e)))
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        // Fall back to identity with voxel scaling
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// Load a 4D BOLD series.
///
/// A 3D file is accepted and treated as a single-volume series.
pub fn load_bold(path: &Path) -> Result<Nifti4d> {
    let obj = read_object(path)?;
    let header = obj.header();

    let pixdim = header.pixdim;
    let voxel_size = (pixdim[1] as f64, pixdim[2] as f64, pixdim[3] as f64);
    let affine = get_affine(header);

    let volume = obj.into_volume();
    let array: Array<f64, _> = volume
        .into_ndarray()
        .map_err(|e| Error::Nifti(format!("{}: {}", path.display(), e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(Error::Nifti(format!(
            "{}: expected a 3D or 4D volume, got {}D",
            path.display(),
            shape.len()
        )));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let nt = if shape.len() >= 4 { shape[3] } else { 1 };

    // Flatten in Fortran order: x fastest, then y, z, t. Header scaling is
    // already applied by into_ndarray.
    let mut data = Vec::with_capacity(nx * ny * nz * nt);
    for t in 0..nt {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let v = if shape.len() >= 4 {
                        array[[i, j, k, t]]
                    } else {
                        array[[i, j, k]]
                    };
                    data.push(v);
                }
            }
        }
    }

    Ok(Nifti4d {
        data,
        dims: (nx, ny, nz, nt),
        voxel_size,
        affine,
    })
}

/// Load a 3D binary mask. Any nonzero voxel counts as in-mask.
pub fn load_mask(path: &Path) -> Result<NiftiMask> {
    let obj = read_object(path)?;
    let header = obj.header();

    let pixdim = header.pixdim;
    let voxel_size = (pixdim[1] as f64, pixdim[2] as f64, pixdim[3] as f64);
    let affine = get_affine(header);

    let volume = obj.into_volume();
    let array: Array<f64, _> = volume
        .into_ndarray()
        .map_err(|e| Error::Nifti(format!("{}: {}", path.display(), e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(Error::Nifti(format!(
            "{}: expected a 3D mask, got {}D",
            path.display(),
            shape.len()
        )));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);

    let mut data = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let v = if shape.len() >= 4 {
                    array[[i, j, k, 0]]
                } else {
                    array[[i, j, k]]
                };
                data.push(if v != 0.0 { 1 } else { 0 });
            }
        }
    }

    Ok(NiftiMask {
        data,
        dims: (nx, ny, nz),
        voxel_size,
        affine,
    })
}

/// Build a NIfTI-1 file (header + float32 data) for a 4D volume.
fn encode_nifti(volume: &Nifti4d) -> Vec<u8> {
    let (nx, ny, nz, nt) = volume.dims;
    let (vsx, vsy, vsz) = volume.voxel_size;

    // NIfTI-1 header (348 bytes)
    let mut header = [0u8; 348];

    // sizeof_hdr = 348
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    // dim[0..7]
    let dim: [i16; 8] = [4, nx as i16, ny as i16, nz as i16, nt as i16, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 16 (FLOAT32), bitpix = 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    // pixdim[0..7]
    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = 352 (header + 4-byte extension flag)
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());

    // scl_slope = 1.0, scl_inter = 0.0
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    // srow_x, srow_y, srow_z
    for row in 0..3 {
        let offset = 280 + row * 16;
        for i in 0..4 {
            let val = volume.affine[row * 4 + i] as f32;
            header[offset + i * 4..offset + i * 4 + 4].copy_from_slice(&val.to_le_bytes());
        }
    }

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(352 + volume.data.len() * 4);
    buffer.extend_from_slice(&header);
    // Extension flag (4 zero bytes = no extension)
    buffer.extend_from_slice(&[0u8; 4]);
    for &val in &volume.data {
        buffer.extend_from_slice(&(val as f32).to_le_bytes());
    }
    buffer
}

/// Save a 4D volume as NIfTI-1 float32.
///
/// Writes gzip-compressed output when the path ends in `.gz`.
pub fn save_bold(path: &Path, volume: &Nifti4d) -> Result<()> {
    let bytes = encode_nifti(volume);

    let gz = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));

    if gz {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let file = std::fs::File::create(path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&bytes)?;
        encoder.finish()?;
    } else {
        std::fs::write(path, &bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_volume() -> Nifti4d {
        let dims = (3, 2, 2, 4);
        let n = dims.0 * dims.1 * dims.2 * dims.3;
        let data: Vec<f64> = (0..n).map(|i| i as f64 * 0.5 - 3.0).collect();
        Nifti4d {
            data,
            dims,
            voxel_size: (2.0, 2.0, 2.5),
            affine: [
                2.0, 0.0, 0.0, -10.0,
                0.0, 2.0, 0.0, -10.0,
                0.0, 0.0, 2.5, -12.0,
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    #[test]
    fn test_encode_header_fields() {
        let vol = synthetic_volume();
        let bytes = encode_nifti(&vol);

        assert_eq!(bytes.len(), 352 + vol.data.len() * 4);
        assert_eq!(&bytes[344..348], b"n+1\0");

        let ndim = i16::from_le_bytes([bytes[40], bytes[41]]);
        let nt = i16::from_le_bytes([bytes[48], bytes[49]]);
        assert_eq!(ndim, 4);
        assert_eq!(nt, 4);
    }

    #[test]
    fn test_bold_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let vol = synthetic_volume();

        let plain = dir.path().join("bold.nii");
        save_bold(&plain, &vol).unwrap();
        let back = load_bold(&plain).unwrap();
        assert_eq!(back.dims, vol.dims);
        for (a, b) in back.data.iter().zip(vol.data.iter()) {
            // float32 storage precision
            assert!((a - b).abs() < 1e-5);
        }

        let gz = dir.path().join("bold.nii.gz");
        save_bold(&gz, &vol).unwrap();
        let back = load_bold(&gz).unwrap();
        assert_eq!(back.dims, vol.dims);
    }

    #[test]
    fn test_mask_binarizes_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let mut vol = synthetic_volume();
        vol.dims = (3, 2, 2, 1);
        vol.data = vec![0.0, 0.5, -1.0, 0.0, 2.0, 0.0, 1.0, 0.0, 0.0, 0.0, 3.0, 0.0];

        let path = dir.path().join("mask.nii");
        save_bold(&path, &vol).unwrap();

        let mask = load_mask(&path).unwrap();
        assert_eq!(mask.dims, (3, 2, 2));
        assert_eq!(mask.n_voxels(), 5);
        assert_eq!(mask.data[0], 0);
        assert_eq!(mask.data[1], 1);
        assert_eq!(mask.data[2], 1);
    }
}
