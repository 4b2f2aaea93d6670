use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dicom_cube::{BatchDriver, JoinStrategy, PreviewRenderer, RenderConfig, SlicePolicy};
use log::info;

#[derive(Parser)]
#[command(name = "dicom-cube", about = "Batch DICOM to FITS cube conversion and DS9 previews")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert each patient folder into <dest>/<id>_cube.fits
    Cube {
        /// Folder holding one subfolder of DICOM slices per patient
        source: PathBuf,
        /// Folder to save the cubes in
        dest: PathBuf,
        /// Patient info sheet with `name` and `id` columns
        metadata: PathBuf,
        /// How patient folders are paired with sheet rows
        #[arg(long, value_enum, default_value_t = JoinStrategy::Position)]
        join: JoinStrategy,
        /// What to do with unreadable slices
        #[arg(long, value_enum, default_value_t = SlicePolicy::SkipAndLog)]
        on_bad_slice: SlicePolicy,
    },

    /// Write every DICOM slice as <dest>/<folder>/<k>.fits
    Slices {
        /// Folder holding one subfolder of DICOM slices per patient
        source: PathBuf,
        /// Folder to save the slices in
        dest: PathBuf,
        /// What to do with unreadable slices
        #[arg(long, value_enum, default_value_t = SlicePolicy::SkipAndLog)]
        on_bad_slice: SlicePolicy,
    },

    /// Stack a folder of single-image FITS files into <dest>/<folder>_cube.fits
    Stack {
        /// Folder of FITS images named <name>.<index>.fits
        folder: PathBuf,
        /// Folder to save the cube in
        dest: PathBuf,
        /// What to do with unreadable slices
        #[arg(long, value_enum, default_value_t = SlicePolicy::SkipAndLog)]
        on_bad_slice: SlicePolicy,
    },

    /// Render cropped JPEG previews for patients [low, high)
    Preview {
        /// Folder holding one subfolder of FITS slices per patient
        fits_root: PathBuf,
        /// Folder to save the previews in
        dest: PathBuf,
        /// Patient info sheet with `ID`, `CT_MAX1` and `BOX` columns
        metadata: PathBuf,
        low: usize,
        high: usize,
        /// DS9 executable
        #[arg(long, env = "DICOM_CUBE_RENDERER", default_value = "ds9")]
        renderer: String,
        /// Preview width and height in pixels
        #[arg(long, default_value_t = 128)]
        size: u32,
        /// JPEG quality
        #[arg(long, default_value_t = 100)]
        quality: u8,
    },
}

fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Command::Cube {
            source,
            dest,
            metadata,
            join,
            on_bad_slice,
        } => {
            let report = BatchDriver::new(join, on_bad_slice)
                .run(&source, &dest, &metadata)
                .with_context(|| format!("converting patients in {}", source.display()))?;
            info!(
                "Wrote {} cube(s), skipped {} folder(s)",
                report.written.len(),
                report.skipped.len()
            );
        }

        Command::Slices {
            source,
            dest,
            on_bad_slice,
        } => {
            let report = BatchDriver::new(JoinStrategy::default(), on_bad_slice)
                .export_slices(&source, &dest)
                .with_context(|| format!("exporting slices of {}", source.display()))?;
            info!("Wrote {} slice(s)", report.written.len());
        }

        Command::Stack {
            folder,
            dest,
            on_bad_slice,
        } => {
            let path = BatchDriver::new(JoinStrategy::default(), on_bad_slice)
                .stack_extensions(&folder, &dest)
                .with_context(|| format!("stacking {}", folder.display()))?;
            info!("Wrote {}", path.display());
        }

        Command::Preview {
            fits_root,
            dest,
            metadata,
            low,
            high,
            renderer,
            size,
            quality,
        } => {
            let config = RenderConfig {
                renderer,
                size,
                quality,
                ..RenderConfig::default()
            };
            let report = PreviewRenderer::new(config)
                .run(&fits_root, &dest, &metadata, low, high)
                .with_context(|| format!("rendering previews of {}", fits_root.display()))?;
            info!(
                "Wrote {} image(s), skipped {} folder(s)",
                report.images.len(),
                report.skipped.len()
            );
        }
    }

    Ok(())
}
