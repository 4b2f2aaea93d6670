//! # DICOM-cube library
//!
//! This crate converts folders of DICOM slices into FITS data cubes, one
//! cube per patient, and renders JPEG previews of selected slices with the
//! DS9 FITS viewer.
//!
//! A patient folder holds one DICOM file per slice. The slice position is
//! taken from the file name (`<anything>.<index>.<ext>`, 1-based), the slices
//! are decoded with dicom-rs, flipped vertically and stacked along a new
//! leading axis. The resulting `(slices, height, width)` array is written as
//! a FITS image extension with cfitsio. Slices are decoded in parallel using rayon; the
//! stack order always follows the file name order.
//!
//! Patient folders are paired with rows of a metadata sheet (`.csv` or a
//! spreadsheet with `name` and `id` columns) and each cube is written as
//! `<id>_cube.fits`.
//!
//! # Examples
//!
//! ## Converting every patient folder
//!
//! ```no_run
//! # use dicom_cube::{BatchDriver, JoinStrategy, SlicePolicy};
//! let report = BatchDriver::new(JoinStrategy::Position, SlicePolicy::SkipAndLog)
//!     .run("patients", "cubes", "patient_list.xlsx")
//!     .expect("should have converted all patients");
//! println!("wrote {} cubes", report.written.len());
//! ```
//!
//! ## Loading a single cube
//!
//! ```no_run
//! # use dicom_cube::{CubeLoader, SlicePolicy, SliceSource, fits};
//! let cube = CubeLoader::load_from_directory("patients/001", SliceSource::Dicom, SlicePolicy::SkipAndLog)
//!     .expect("should have loaded the slices");
//! fits::write_cube(&cube, "001_cube.fits").expect("should have written the cube");
//! ```

pub mod batch;
pub mod cube;
pub mod cube_loader;
pub mod ds9;
pub mod enums;
pub mod fits;
pub mod info_card;
pub mod metadata;
pub mod preview;
pub mod slice_order;

pub use batch::{BatchDriver, BatchError, BatchReport};
pub use cube::{Cube, SliceImage, Voxels};
pub use cube_loader::{CubeLoader, CubeLoaderError};
pub use enums::{JoinStrategy, SlicePolicy, SliceSource};
pub use preview::{PreviewRenderer, RenderConfig, RenderError};
