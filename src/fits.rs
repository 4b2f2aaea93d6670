//! FITS files through cfitsio.
//!
//! Cubes are written as an empty primary HDU followed by one named `IMAGE`
//! extension. Single slices are written in the primary HDU. Readers take the
//! first HDU that holds data and let cfitsio apply `BSCALE` and `BZERO`.

use crate::cube::{Cube, SliceImage, Voxels};

use fitsio::{
    FitsFile,
    hdu::{FitsHdu, HduInfo},
    headers::ReadsKey,
    images::{ImageDescription, ImageType, WriteImage},
};
use ndarray::{Array2, Array3, ArrayView, ArrayView2, Dimension};
use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;

/// Extension name of cubes written without one.
pub const DEFAULT_EXTNAME: &str = "CUBE";

/// cfitsio keeps global state and is not built reentrant, so every file
/// access holds this lock.
static CFITSIO: Mutex<()> = Mutex::new(());

fn lock() -> MutexGuard<'static, ()> {
    CFITSIO.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Error)]
pub enum FitsError {
    #[error("FITS error: {0}")]
    Fits(#[from] fitsio::errors::Error),

    #[error("No image data in {}", .0.display())]
    NoImage(PathBuf),

    #[error("Unexpected image shape {shape:?} in {}", .path.display())]
    Shape { path: PathBuf, shape: Vec<usize> },
}

/// Pixel types written with their own FITS type.
pub trait FitsPixel: WriteImage + Copy {
    const IMAGE_TYPE: ImageType;
}

impl FitsPixel for u8 {
    const IMAGE_TYPE: ImageType = ImageType::UnsignedByte;
}

impl FitsPixel for i16 {
    const IMAGE_TYPE: ImageType = ImageType::Short;
}

impl FitsPixel for i32 {
    const IMAGE_TYPE: ImageType = ImageType::Long;
}

impl FitsPixel for f32 {
    const IMAGE_TYPE: ImageType = ImageType::Float;
}

impl FitsPixel for f64 {
    const IMAGE_TYPE: ImageType = ImageType::Double;
}

fn write_data<T: FitsPixel, D: Dimension>(
    file: &mut FitsFile,
    hdu: &FitsHdu,
    data: ArrayView<'_, T, D>,
) -> Result<(), FitsError> {
    // Logical order is row-major, which is FITS order with NAXIS1 fastest.
    let values: Vec<T> = data.iter().copied().collect();
    hdu.write_image(file, &values)?;
    Ok(())
}

fn create_extension<T: FitsPixel, D: Dimension>(
    file: &mut FitsFile,
    name: &str,
    data: ArrayView<'_, T, D>,
) -> Result<FitsHdu, FitsError> {
    let description = ImageDescription {
        data_type: T::IMAGE_TYPE,
        dimensions: data.shape(),
    };
    let hdu = file.create_image(name, &description)?;
    write_data(file, &hdu, data)?;
    Ok(hdu)
}

/// Write a cube as a single-extension FITS file, replacing any existing file.
/// Spacing, when known, goes to `CDELT1..3`.
pub fn write_cube(cube: &Cube, path: impl AsRef<Path>) -> Result<(), FitsError> {
    let _guard = lock();
    let mut file = FitsFile::create(path.as_ref()).overwrite().open()?;
    let name = cube.name.as_deref().unwrap_or(DEFAULT_EXTNAME);

    let hdu = match &cube.voxels {
        Voxels::Integer(data) => create_extension(&mut file, name, data.view())?,
        Voxels::Float(data) => create_extension(&mut file, name, data.view())?,
    };
    if let Some((x, y, z)) = cube.spacing {
        for (keyword, step) in [("CDELT1", x), ("CDELT2", y), ("CDELT3", z)] {
            hdu.write_key(&mut file, keyword, f64::from(step))?;
        }
    }
    Ok(())
}

/// Write a 2D image in the primary HDU, replacing any existing file.
pub fn write_image<T: FitsPixel>(
    image: ArrayView2<'_, T>,
    path: impl AsRef<Path>,
) -> Result<(), FitsError> {
    let _guard = lock();
    let description = ImageDescription {
        data_type: T::IMAGE_TYPE,
        dimensions: image.shape(),
    };
    let mut file = FitsFile::create(path.as_ref())
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = file.primary_hdu()?;
    write_data(&mut file, &hdu, image)
}

/// Write one slice with its own pixel type.
pub fn write_slice(slice: &SliceImage, path: impl AsRef<Path>) -> Result<(), FitsError> {
    match slice {
        SliceImage::Integer(image) => write_image(image.view(), path),
        SliceImage::Float(image) => write_image(image.view(), path),
    }
}

/// The first HDU of a file that holds image data.
struct ImageHdu {
    file: FitsFile,
    hdu: FitsHdu,
    shape: Vec<usize>,
    floating: bool,
}

impl ImageHdu {
    fn open(path: &Path) -> Result<Self, FitsError> {
        let mut file = FitsFile::open(path)?;
        let count = file.iter().count();

        for index in 0..count {
            let hdu = file.hdu(index)?;
            let HduInfo::ImageInfo { shape, image_type } = &hdu.info else {
                continue;
            };
            if shape.is_empty() || shape.iter().product::<usize>() == 0 {
                continue;
            }
            let shape = shape.clone();
            let floating = matches!(image_type, ImageType::Float | ImageType::Double);
            return Ok(Self {
                file,
                hdu,
                shape,
                floating,
            });
        }
        Err(FitsError::NoImage(path.to_path_buf()))
    }

    /// Physical values, after `BSCALE` and `BZERO`.
    fn values(&mut self) -> Result<Vec<f64>, FitsError> {
        Ok(self.hdu.read_image(&mut self.file)?)
    }

    fn key<T: ReadsKey>(&mut self, name: &str) -> Option<T> {
        self.hdu.read_key(&mut self.file, name).ok()
    }

    /// Integer images stay integer while every physical value is a whole
    /// number inside the `i32` range.
    fn integers(&self, values: &[f64]) -> Option<Vec<i32>> {
        if self.floating {
            return None;
        }
        let range = f64::from(i32::MIN)..=f64::from(i32::MAX);
        values
            .iter()
            .map(|&v| (v.fract() == 0.0 && range.contains(&v)).then_some(v as i32))
            .collect()
    }
}

fn shape_error(path: &Path, shape: &[usize]) -> FitsError {
    FitsError::Shape {
        path: path.to_path_buf(),
        shape: shape.to_vec(),
    }
}

/// Read the first 2D image of a file.
pub fn read_slice(path: impl AsRef<Path>) -> Result<SliceImage, FitsError> {
    let path = path.as_ref();
    let _guard = lock();
    let mut image = ImageHdu::open(path)?;
    let [rows, columns] = image.shape[..] else {
        return Err(shape_error(path, &image.shape));
    };

    let values = image.values()?;
    let slice = match image.integers(&values) {
        Some(integers) => Array2::from_shape_vec((rows, columns), integers).map(SliceImage::Integer),
        None => Array2::from_shape_vec((rows, columns), values).map(SliceImage::Float),
    };
    slice.map_err(|_| shape_error(path, &image.shape))
}

/// Read the first 3D image of a file with its `EXTNAME` and `CDELT1..3`.
pub fn read_cube(path: impl AsRef<Path>) -> Result<Cube, FitsError> {
    let path = path.as_ref();
    let _guard = lock();
    let mut image = ImageHdu::open(path)?;
    let [depth, rows, columns] = image.shape[..] else {
        return Err(shape_error(path, &image.shape));
    };

    let values = image.values()?;
    let voxels = match image.integers(&values) {
        Some(integers) => Array3::from_shape_vec((depth, rows, columns), integers).map(Voxels::Integer),
        None => Array3::from_shape_vec((depth, rows, columns), values).map(Voxels::Float),
    }
    .map_err(|_| shape_error(path, &image.shape))?;

    let spacing = match (
        image.key::<f32>("CDELT1"),
        image.key::<f32>("CDELT2"),
        image.key::<f32>("CDELT3"),
    ) {
        (Some(x), Some(y), Some(z)) => Some((x, y, z)),
        _ => None,
    };
    let name = image.key::<String>("EXTNAME");

    Ok(Cube {
        voxels,
        name,
        spacing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// A primary image of raw `i32`-typed `data` with extra integer keys.
    fn write_scaled(path: &Path, data_type: ImageType, raw: &[i32], keys: &[(&str, i64)]) {
        let _guard = lock();
        let description = ImageDescription {
            data_type,
            dimensions: &[1, raw.len()],
        };
        let mut file = FitsFile::create(path)
            .with_custom_primary(&description)
            .open()
            .unwrap();
        let hdu = file.primary_hdu().unwrap();
        hdu.write_image(&mut file, raw).unwrap();
        for &(keyword, value) in keys {
            hdu.write_key(&mut file, keyword, value).unwrap();
        }
    }

    #[test]
    fn integer_cube_keeps_name_and_spacing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.fits");
        let data = Array3::from_shape_fn((3, 2, 4), |(z, y, x)| (z * 100 + y * 10 + x) as i32 - 50);
        let cube = Cube::new(data)
            .with_name("P001")
            .with_spacing(Some((0.5, 0.75, 2.0)));

        write_cube(&cube, &path).unwrap();
        assert_eq!(read_cube(&path).unwrap(), cube);
    }

    #[test]
    fn unnamed_cube_gets_default_extname() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.fits");
        write_cube(&Cube::new(Array3::<i32>::ones((1, 1, 2))), &path).unwrap();

        let cube = read_cube(&path).unwrap();
        assert_eq!(cube.name.as_deref(), Some(DEFAULT_EXTNAME));
        assert_eq!(cube.spacing, None);
    }

    #[test]
    fn float_cube_stays_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.fits");
        let cube = Cube::new(array![[[0.5, 1.0]], [[-2.25, 3.0]]]);

        write_cube(&cube, &path).unwrap();
        assert_eq!(read_cube(&path).unwrap().voxels, cube.voxels);
    }

    #[test]
    fn slices_keep_their_pixel_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice.fits");

        let integer = SliceImage::from(array![[1, -2, 3], [4, 5, 6]]);
        write_slice(&integer, &path).unwrap();
        assert_eq!(read_slice(&path).unwrap(), integer);

        write_image(array![[1.5f32, 2.0]].view(), &path).unwrap();
        assert_eq!(read_slice(&path).unwrap(), SliceImage::from(array![[1.5, 2.0]]));
    }

    #[test]
    fn bscale_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaled.fits");
        write_scaled(&path, ImageType::Short, &[10, 20], &[("BSCALE", 2)]);

        assert_eq!(read_slice(&path).unwrap(), SliceImage::from(array![[20, 40]]));
    }

    #[test]
    fn unsigned_32_bit_offset_reads_as_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unsigned.fits");
        write_scaled(&path, ImageType::Long, &[0, 1], &[("BZERO", 2_147_483_648)]);

        assert_eq!(
            read_slice(&path).unwrap(),
            SliceImage::from(array![[2_147_483_648.0, 2_147_483_649.0]])
        );
    }

    #[test]
    fn cube_is_not_a_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.fits");
        write_cube(&Cube::new(Array3::<i32>::zeros((2, 2, 2))), &path).unwrap();

        assert!(matches!(read_slice(&path), Err(FitsError::Shape { .. })));
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.fits");
        std::fs::write(&path, b"not a fits file").unwrap();

        assert!(read_slice(&path).is_err());
        assert!(read_cube(dir.path().join("missing.fits")).is_err());
    }
}
