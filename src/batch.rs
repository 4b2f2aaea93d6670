use crate::{
    cube::Cube,
    cube_loader::{CubeLoader, CubeLoaderError, SliceFailure},
    enums::{JoinStrategy, SlicePolicy, SliceSource},
    fits::{self, FitsError},
    metadata::{self, MetadataError, PatientIndex},
    slice_order,
};

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{folders} patient folder(s) but {records} metadata row(s)")]
    CountMismatch { folders: usize, records: usize },

    #[error("Patient {folder}: {source}")]
    Patient {
        folder: String,
        #[source]
        source: CubeLoaderError,
    },

    #[error("Cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: FitsError,
    },
}

/// What a batch produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    /// Folders left out because no metadata row matched them
    pub skipped: Vec<String>,
}

/// Names of the immediate subfolders of `root`, sorted.
pub fn list_subfolders(root: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn patient_folders(root: &Path) -> Result<Vec<String>, BatchError> {
    list_subfolders(root).map_err(|source| BatchError::Io {
        path: root.to_path_buf(),
        source,
    })
}

fn create_dir(path: &Path) -> Result<(), BatchError> {
    fs::create_dir_all(path).map_err(|source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_cube(cube: &Cube, path: PathBuf) -> Result<PathBuf, BatchError> {
    match fits::write_cube(cube, &path) {
        Ok(()) => {
            log::info!("Wrote {} ({:?})", path.display(), cube.dim());
            Ok(path)
        }
        Err(source) => Err(BatchError::Write { path, source }),
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BatchDriver {
    pub join: JoinStrategy,
    pub policy: SlicePolicy,
}

impl BatchDriver {
    pub fn new(join: JoinStrategy, policy: SlicePolicy) -> Self {
        Self { join, policy }
    }

    /// Convert every patient folder under `source_root` into
    /// `<dest>/<id>_cube.fits`. The first failing patient stops the batch.
    pub fn run(
        &self,
        source_root: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        metadata_path: impl AsRef<Path>,
    ) -> Result<BatchReport, BatchError> {
        let (source_root, dest) = (source_root.as_ref(), dest.as_ref());

        log::info!("Loading patient info from {}", metadata_path.as_ref().display());
        let index = metadata::load_patient_index(metadata_path)?;
        let folders = patient_folders(source_root)?;
        let pairs = self.pair(&folders, &index)?;
        create_dir(dest)?;

        let mut report = BatchReport::default();
        for (folder, id) in pairs {
            let Some(id) = id else {
                log::warn!("No patient info matches folder {folder}, skipping");
                report.skipped.push(folder);
                continue;
            };

            log::info!("Processing patient {folder} (id {id})");
            let cube = CubeLoader::load_from_directory(
                source_root.join(&folder),
                SliceSource::Dicom,
                self.policy,
            )
            .map_err(|source| BatchError::Patient {
                folder: folder.clone(),
                source,
            })?
            .with_name(id.as_str());

            let written = write_cube(&cube, dest.join(format!("{id}_cube.fits")))?;
            report.written.push(written);
        }

        Ok(report)
    }

    /// Pair each folder with the id of its patient, if any.
    fn pair(
        &self,
        folders: &[String],
        index: &PatientIndex,
    ) -> Result<Vec<(String, Option<String>)>, BatchError> {
        match self.join {
            JoinStrategy::Position => {
                if folders.len() != index.len() {
                    return Err(BatchError::CountMismatch {
                        folders: folders.len(),
                        records: index.len(),
                    });
                }
                Ok(folders
                    .iter()
                    .zip(index.records())
                    .map(|(folder, record)| (folder.clone(), Some(record.id.clone())))
                    .collect())
            }
            JoinStrategy::Name => Ok(folders
                .iter()
                .map(|folder| {
                    let id = index.find_by_name(folder).map(|r| r.id.clone());
                    (folder.clone(), id)
                })
                .collect()),
            JoinStrategy::Id => Ok(folders
                .iter()
                .map(|folder| {
                    let id = metadata::parse_integer(folder)
                        .and_then(|key| index.find_by_id(key))
                        .map(|r| r.id.clone());
                    (folder.clone(), id)
                })
                .collect()),
        }
    }

    /// Write every DICOM slice of every patient folder as its own FITS file,
    /// `<dest>/<folder>/<k>.fits` with `k` the 1-based slice position.
    pub fn export_slices(
        &self,
        source_root: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> Result<BatchReport, BatchError> {
        let (source_root, dest) = (source_root.as_ref(), dest.as_ref());
        let mut report = BatchReport::default();

        for folder in patient_folders(source_root)? {
            log::info!("Exporting slices of patient {folder}");
            let patient_error = |source: CubeLoaderError| BatchError::Patient {
                folder: folder.clone(),
                source,
            };

            let paths = slice_order::order_slices(source_root.join(&folder))
                .map_err(|err| patient_error(err.into()))?;
            let out_dir = dest.join(&folder);
            create_dir(&out_dir)?;

            let mut failures = Vec::new();
            for (position, path) in paths.iter().enumerate() {
                let image = match CubeLoader::load_slice(path, SliceSource::Dicom) {
                    Ok(image) => image,
                    Err(source) => {
                        let failure = SliceFailure {
                            path: path.clone(),
                            source,
                        };
                        match self.policy {
                            SlicePolicy::AbortOnFirst => return Err(patient_error(failure.into())),
                            SlicePolicy::SkipAndLog => {
                                log::warn!("Cannot load slice {failure}, skipping")
                            }
                            SlicePolicy::CollectAll => failures.push(failure),
                        }
                        continue;
                    }
                };

                let out = out_dir.join(format!("{}.fits", position + 1));
                fits::write_slice(&image, &out).map_err(|source| BatchError::Write {
                    path: out.clone(),
                    source,
                })?;
                report.written.push(out);
            }

            if !failures.is_empty() {
                return Err(patient_error(CubeLoaderError::Slices(failures)));
            }
        }

        Ok(report)
    }

    /// Stack the single-image FITS files of `folder` into
    /// `<dest>/<folder name>_cube.fits`, named after the folder.
    pub fn stack_extensions(
        &self,
        folder: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> Result<PathBuf, BatchError> {
        let (folder, dest) = (folder.as_ref(), dest.as_ref());
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.display().to_string());

        log::info!("Stacking FITS images of {}", folder.display());
        let cube = CubeLoader::load_from_directory(folder, SliceSource::Fits, self.policy)
            .map_err(|source| BatchError::Patient {
                folder: name.clone(),
                source,
            })?
            .with_name(name.clone());

        create_dir(dest)?;
        write_cube(&cube, dest.join(format!("{name}_cube.fits")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PatientTable;

    fn index(rows: &[(&str, &str)]) -> PatientIndex {
        let table = PatientTable::new(
            vec!["name".into(), "id".into()],
            rows.iter()
                .map(|(name, id)| vec![name.to_string(), id.to_string()])
                .collect(),
        );
        PatientIndex::from_table(&table).unwrap()
    }

    fn folders(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn position_join_requires_equal_counts() {
        let driver = BatchDriver::default();
        let index = index(&[("Bob", "102"), ("Alice", "101")]);

        let pairs = driver.pair(&folders(&["001", "002"]), &index).unwrap();
        assert_eq!(
            pairs,
            [
                ("001".to_string(), Some("101".to_string())),
                ("002".to_string(), Some("102".to_string()))
            ]
        );

        let err = driver.pair(&folders(&["001"]), &index).unwrap_err();
        assert!(matches!(
            err,
            BatchError::CountMismatch {
                folders: 1,
                records: 2
            }
        ));
    }

    #[test]
    fn name_and_id_joins_match_by_key() {
        let index = index(&[("Alice", "101"), ("Bob", "102")]);

        let by_name = BatchDriver::new(JoinStrategy::Name, SlicePolicy::default());
        let pairs = by_name.pair(&folders(&["Bob", "Carol"]), &index).unwrap();
        assert_eq!(pairs[0].1.as_deref(), Some("102"));
        assert_eq!(pairs[1].1, None);

        let by_id = BatchDriver::new(JoinStrategy::Id, SlicePolicy::default());
        let pairs = by_id.pair(&folders(&["0101", "x"]), &index).unwrap();
        assert_eq!(pairs[0].1.as_deref(), Some("101"));
        assert_eq!(pairs[1].1, None);
    }

    #[test]
    fn subfolders_are_sorted_and_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b", "a", "c"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        assert_eq!(list_subfolders(dir.path()).unwrap(), ["a", "b", "c"]);
    }
}
