use crate::{
    batch,
    ds9::{CommandError, CommandRunner, Ds9Options, ProcessRunner, RenderCommand},
    info_card,
    metadata::{self, DEFAULT_INFO_COLUMNS, MetadataError, PatientTable},
};

use std::{
    fmt, fs,
    ops::Range,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CropError {
    #[error("bounding box '{0}' is too short")]
    TooShort(String),

    #[error("bounding box '{text}' has {found} bound(s), expected 4")]
    TooFewBounds { text: String, found: usize },

    #[error("bound '{0}' is not a number")]
    InvalidBound(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Patient {folder}: {source}")]
    Crop {
        folder: String,
        #[source]
        source: CropError,
    },

    #[error("Patient {folder}: empty {column}")]
    MissingField { folder: String, column: &'static str },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Cannot write {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// DS9 crop box: centre and extent, in image pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRegion {
    /// Characters stripped from the front of the field, as in `box(`
    pub const PREFIX_LEN: usize = 4;
    /// Characters stripped from the back of the field, as in `)`
    pub const SUFFIX_LEN: usize = 1;

    /// Parse a region such as `box(10,20,30,40,0)`, keeping the first four bounds.
    pub fn parse(text: &str) -> Result<Self, CropError> {
        let text = text.trim();
        let chars: Vec<char> = text.chars().collect();
        if chars.len() < Self::PREFIX_LEN + Self::SUFFIX_LEN {
            return Err(CropError::TooShort(text.to_owned()));
        }
        let inner: String = chars[Self::PREFIX_LEN..chars.len() - Self::SUFFIX_LEN]
            .iter()
            .collect();

        let tokens: Vec<&str> = inner.split(',').take(4).collect();
        if tokens.len() < 4 {
            return Err(CropError::TooFewBounds {
                text: text.to_owned(),
                found: tokens.len(),
            });
        }

        let mut bounds = [0.0; 4];
        for (bound, token) in bounds.iter_mut().zip(&tokens) {
            *bound = token
                .trim()
                .parse::<f64>()
                .map_err(|_| CropError::InvalidBound(token.trim().to_owned()))?;
        }
        let [x, y, width, height] = bounds;
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }
}

impl FromStr for CropRegion {
    type Err = CropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x, self.y, self.width, self.height)
    }
}

/// Preview settings.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    /// Viewer executable
    pub renderer: String,
    /// Output width and height in pixels
    pub size: u32,
    /// JPEG quality
    pub quality: u8,
    pub scale: String,
    pub color_map: String,
    /// Metadata columns listed on the info card
    pub info_columns: Vec<usize>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            renderer: "ds9".to_owned(),
            size: 128,
            quality: 100,
            scale: "mode 99.5".to_owned(),
            color_map: "b".to_owned(),
            info_columns: DEFAULT_INFO_COLUMNS.collect(),
        }
    }
}

impl RenderConfig {
    fn base_options(&self, color_map: &str, crop: &CropRegion) -> Ds9Options {
        Ds9Options::new()
            .set("cmap", color_map)
            .set("scale", self.scale.as_str())
            .set("crop", crop.to_string())
            .set("width", self.size.to_string())
            .set("height", self.size.to_string())
    }

    pub fn colored_options(&self, crop: &CropRegion) -> Ds9Options {
        self.base_options(&self.color_map, crop)
    }

    pub fn inverted_options(&self, crop: &CropRegion) -> Ds9Options {
        self.base_options("invert yes", crop)
    }
}

/// `[low, high)` clamped to `count` items.
pub fn batch_range(count: usize, low: usize, high: usize) -> Range<usize> {
    let high = high.min(count);
    low.min(high)..high
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreviewReport {
    /// Images written, four per rendered patient
    pub images: Vec<PathBuf>,
    /// Folders with no matching metadata row
    pub skipped: Vec<String>,
}

pub struct PreviewRenderer<R = ProcessRunner> {
    config: RenderConfig,
    runner: R,
}

impl PreviewRenderer<ProcessRunner> {
    pub fn new(config: RenderConfig) -> Self {
        Self::with_runner(config, ProcessRunner)
    }
}

impl<R: CommandRunner> PreviewRenderer<R> {
    pub fn with_runner(config: RenderConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Render previews for the patient folders in `[low, high)` of the sorted
    /// listing of `fits_root` into `dest`.
    pub fn run(
        &mut self,
        fits_root: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        metadata_path: impl AsRef<Path>,
        low: usize,
        high: usize,
    ) -> Result<PreviewReport, RenderError> {
        let (fits_root, dest) = (fits_root.as_ref(), dest.as_ref());
        fs::create_dir_all(dest).map_err(|source| RenderError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

        let table = PatientTable::load(metadata_path)?;
        let folders = batch::list_subfolders(fits_root).map_err(|source| RenderError::Io {
            path: fits_root.to_path_buf(),
            source,
        })?;

        let mut report = PreviewReport::default();
        for folder in &folders[batch_range(folders.len(), low, high)] {
            log::info!("Processing on patient with ID {folder}");
            let row = match metadata::parse_integer(folder) {
                Some(key) => table.find_row("ID", key)?,
                None => None,
            };
            let Some(row) = row else {
                log::debug!("No patient info for {folder}, skipping");
                report.skipped.push(folder.clone());
                continue;
            };

            let images = self.render_patient(fits_root, dest, folder, &table, row)?;
            report.images.extend(images);
        }

        Ok(report)
    }

    /// Write the info card and the three viewer renders of one patient.
    pub fn render_patient(
        &mut self,
        fits_root: &Path,
        dest: &Path,
        folder: &str,
        table: &PatientTable,
        row: usize,
    ) -> Result<Vec<PathBuf>, RenderError> {
        let slice = table.value(row, "CT_MAX1")?;
        let slice = match metadata::parse_integer(slice) {
            Some(number) => number.to_string(),
            None if slice.is_empty() => {
                return Err(RenderError::MissingField {
                    folder: folder.to_owned(),
                    column: "CT_MAX1",
                });
            }
            None => slice.to_owned(),
        };
        let crop = CropRegion::parse(table.value(row, "BOX")?).map_err(|source| {
            RenderError::Crop {
                folder: folder.to_owned(),
                source,
            }
        })?;

        let fits_path = fits_root.join(folder).join(format!("{slice}.fits"));
        let output = |suffix: &str| dest.join(format!("{folder}_{suffix}.jpeg"));

        let card_path = output("m");
        let lines = table.info_lines(row, self.config.info_columns.iter().copied());
        let card = info_card::render_info_card(&lines, self.config.size);
        info_card::save_jpeg(&card, &card_path, self.config.quality).map_err(|source| {
            RenderError::Image {
                path: card_path.clone(),
                source,
            }
        })?;

        let colored = self.config.colored_options(&crop);
        let inverted = self.config.inverted_options(&crop);
        let commands = [
            (output("b"), &colored),
            (output("i"), &inverted),
            (output("c"), &colored),
        ]
        .map(|(path, options)| {
            RenderCommand::save_jpeg(
                self.config.renderer.as_str(),
                &fits_path,
                options,
                &path,
                self.config.quality,
            )
        });

        let mut written = vec![card_path];
        for command in &commands {
            log::info!("{command}");
            self.runner.run(command)?;
            written.push(command.output.clone());
        }
        Ok(written)
    }
}
