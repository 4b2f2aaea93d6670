use crate::{
    cube::{Cube, SliceImage, Voxels},
    enums::{SlicePolicy, SliceSource},
    fits::{self, FitsError},
    slice_order::{self, SliceOrderError},
};

use dicom::{
    object::{DefaultDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, s};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    PixelData(#[from] dicom::pixeldata::Error),

    #[error("FITS error: {0}")]
    Fits(#[from] FitsError),
}

/// A slice that could not be decoded.
#[derive(Debug, Error)]
#[error("{}: {source}", .path.display())]
pub struct SliceFailure {
    pub path: PathBuf,
    #[source]
    pub source: SliceError,
}

#[derive(Debug, Error)]
pub enum CubeLoaderError {
    #[error("No valid images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions: {} is {found:?}, expected {expected:?}", .path.display())]
    InconsistentDimensions {
        path: PathBuf,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error(transparent)]
    Order(#[from] SliceOrderError),

    #[error("Unreadable slice {0}")]
    Slice(#[from] SliceFailure),

    #[error("{}", describe_failures(.0))]
    Slices(Vec<SliceFailure>),
}

fn describe_failures(failures: &[SliceFailure]) -> String {
    let mut text = format!("{} slice(s) could not be read", failures.len());
    for failure in failures {
        text.push_str(&format!("\n  {failure}"));
    }
    text
}

/// One decoded, oriented slice.
struct DecodedSlice {
    image: SliceImage,
    spacing: Option<(f32, f32, f32)>,
}

pub struct CubeLoader;

impl CubeLoader {
    /// Load a cube from the slice files of `path`, in anatomical order.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be ordered, if `policy` rejects
    /// an unreadable slice, if no slice could be read, or if slice shapes
    /// differ.
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        source: SliceSource,
        policy: SlicePolicy,
    ) -> Result<Cube, CubeLoaderError> {
        let paths = slice_order::order_slices(path.as_ref())?;
        if paths.is_empty() {
            return Err(CubeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, source, policy)
    }

    /// Load a cube from already ordered slice paths. Stack order is input order.
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        source: SliceSource,
        policy: SlicePolicy,
    ) -> Result<Cube, CubeLoaderError> {
        let decoded: Vec<_> = paths
            .par_iter()
            .map(|path| {
                let path = path.as_ref();
                let result = Self::decode(path, source).map_err(|source| SliceFailure {
                    path: path.to_path_buf(),
                    source,
                });
                (path, result)
            })
            .collect();

        let slices = Self::apply_policy(decoded, policy)?;
        if slices.is_empty() {
            return Err(CubeLoaderError::NoValidImages);
        }

        Self::validate_dimensions(&slices)?;

        let spacing = slices.iter().find_map(|(_, slice)| slice.spacing);
        let images: Vec<_> = slices.into_iter().map(|(_, slice)| slice.image).collect();
        Ok(Cube::new(Voxels::stack(&images)).with_spacing(spacing))
    }

    /// Decode a single slice the same way cube assembly does (DICOM slices
    /// come back flipped vertically).
    pub fn load_slice(
        path: impl AsRef<Path>,
        source: SliceSource,
    ) -> Result<SliceImage, SliceError> {
        Self::decode(path.as_ref(), source).map(|slice| slice.image)
    }

    fn decode(path: &Path, source: SliceSource) -> Result<DecodedSlice, SliceError> {
        let (image, spacing) = match source {
            SliceSource::Dicom => {
                let object = open_file(path)?;
                let image = SliceImage::Integer(Self::decode_image(&object)?);
                (image, Self::get_spacing(&object))
            }
            SliceSource::Fits => (fits::read_slice(path)?, None),
        };

        let image = if source.flips_rows() {
            image.flipped()
        } else {
            image
        };
        Ok(DecodedSlice { image, spacing })
    }

    /// Stored pixel values of the first frame and first sample, without
    /// modality or VOI transforms.
    fn decode_image(dicom_object: &DefaultDicomObject) -> Result<Array2<i32>, SliceError> {
        let pixel_data = dicom_object.decode_pixel_data()?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let frames = pixel_data.to_ndarray_with_options::<i32>(&options)?;
        Ok(frames.slice_move(s![0, .., .., 0]))
    }

    fn get_spacing(dicom_object: &DefaultDicomObject) -> Option<(f32, f32, f32)> {
        let pixel_spacing = dicom_object
            .element(tags::PIXEL_SPACING)
            .ok()?
            .to_multi_float32()
            .ok()?;

        let slice_thickness = dicom_object
            .element(tags::SLICE_THICKNESS)
            .ok()?
            .to_float32()
            .ok()?;

        Some((*pixel_spacing.first()?, *pixel_spacing.get(1)?, slice_thickness))
    }

    fn apply_policy<'a>(
        decoded: Vec<(&'a Path, Result<DecodedSlice, SliceFailure>)>,
        policy: SlicePolicy,
    ) -> Result<Vec<(&'a Path, DecodedSlice)>, CubeLoaderError> {
        let mut slices = Vec::with_capacity(decoded.len());
        let mut failures = Vec::new();

        for (path, result) in decoded {
            match result {
                Ok(slice) => slices.push((path, slice)),
                Err(failure) => match policy {
                    SlicePolicy::AbortOnFirst => return Err(failure.into()),
                    SlicePolicy::SkipAndLog => {
                        log::warn!("Cannot load slice {failure}, skipping");
                    }
                    SlicePolicy::CollectAll => failures.push(failure),
                },
            }
        }

        if !failures.is_empty() {
            return Err(CubeLoaderError::Slices(failures));
        }
        Ok(slices)
    }

    fn validate_dimensions(slices: &[(&Path, DecodedSlice)]) -> Result<(), CubeLoaderError> {
        let expected = slices[0].1.image.dim();
        match slices
            .iter()
            .find(|(_, slice)| slice.image.dim() != expected)
        {
            Some((path, slice)) => Err(CubeLoaderError::InconsistentDimensions {
                path: path.to_path_buf(),
                expected,
                found: slice.image.dim(),
            }),
            None => Ok(()),
        }
    }
}
