use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Why a file name carries no usable slice index.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SliceNameError {
    #[error("{0}: no index segment (expected <name>.<index>.<ext>)")]
    MissingIndex(String),

    #[error("{name}: index segment '{token}' is not an integer")]
    InvalidIndex { name: String, token: String },

    #[error("{name}: index {index} outside 1..={count}")]
    OutOfRange {
        name: String,
        index: usize,
        count: usize,
    },

    #[error("{name}: index {index} already used by {other}")]
    Duplicate {
        name: String,
        index: usize,
        other: String,
    },
}

#[derive(Debug, Error)]
pub enum SliceOrderError {
    #[error("Cannot read folder {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", describe_bad_names(.0))]
    BadNames(Vec<SliceNameError>),
}

fn describe_bad_names(errors: &[SliceNameError]) -> String {
    let mut text = format!("{} slice file name(s) could not be ordered", errors.len());
    for err in errors {
        text.push_str(&format!("\n  {err}"));
    }
    text
}

/// The 1-based slice index embedded in `<anything>.<index>.<ext>`.
pub fn slice_index(file_name: &str) -> Result<usize, SliceNameError> {
    let mut segments = file_name.rsplit('.');
    let token = match (segments.next(), segments.next()) {
        (Some(_), Some(token)) => token,
        _ => return Err(SliceNameError::MissingIndex(file_name.to_owned())),
    };

    token
        .trim()
        .parse::<usize>()
        .map_err(|_| SliceNameError::InvalidIndex {
            name: file_name.to_owned(),
            token: token.to_owned(),
        })
}

/// Place each name at `index - 1`. Every problem is reported, not just the first.
pub fn order_names(names: &[String]) -> Result<Vec<String>, Vec<SliceNameError>> {
    let count = names.len();
    let mut ordered: Vec<Option<&String>> = vec![None; count];
    let mut errors = Vec::new();

    for name in names {
        let index = match slice_index(name) {
            Ok(index) => index,
            Err(err) => {
                errors.push(err);
                continue;
            }
        };
        if index == 0 || index > count {
            errors.push(SliceNameError::OutOfRange {
                name: name.clone(),
                index,
                count,
            });
            continue;
        }
        match ordered[index - 1] {
            Some(other) => errors.push(SliceNameError::Duplicate {
                name: name.clone(),
                index,
                other: other.clone(),
            }),
            None => ordered[index - 1] = Some(name),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // With `count` names and no range or duplicate errors every slot is filled.
    Ok(ordered.into_iter().flatten().cloned().collect())
}

/// List the files of `folder` in anatomical order.
pub fn order_slices(folder: impl AsRef<Path>) -> Result<Vec<PathBuf>, SliceOrderError> {
    let folder = folder.as_ref();
    let mut names = list_file_names(folder).inspect_err(|err| log::warn!("{err}"))?;
    names.sort();

    let ordered = order_names(&names).map_err(SliceOrderError::BadNames)?;
    Ok(ordered.into_iter().map(|name| folder.join(name)).collect())
}

fn list_file_names(folder: &Path) -> Result<Vec<String>, SliceOrderError> {
    let io_error = |source| SliceOrderError::Io {
        path: folder.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(folder).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_type().map_err(io_error)?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn index_is_second_to_last_segment() {
        assert_eq!(slice_index("CT.1.2.840.17.dcm"), Ok(17));
        assert_eq!(slice_index("IM.3.fits"), Ok(3));
        assert_eq!(
            slice_index("scan"),
            Err(SliceNameError::MissingIndex("scan".into()))
        );
        assert!(matches!(
            slice_index("IM.x.dcm"),
            Err(SliceNameError::InvalidIndex { ref token, .. }) if token == "x"
        ));
    }

    #[test]
    fn token_k_lands_at_k_minus_one() {
        let input: Vec<String> = (1..=10).rev().map(|k| format!("s.{k}.dcm")).collect();
        let ordered = order_names(&input).unwrap();
        assert_eq!(ordered.len(), 10);
        for (position, name) in ordered.iter().enumerate() {
            assert_eq!(slice_index(name).unwrap(), position + 1);
        }
    }

    #[test]
    fn index_beyond_count_is_out_of_range() {
        let errors = order_names(&names(&["a.10.dcm", "a.2.dcm", "a.1.dcm"])).unwrap_err();
        assert_eq!(
            errors,
            [SliceNameError::OutOfRange {
                name: "a.10.dcm".into(),
                index: 10,
                count: 3,
            }]
        );
    }

    #[test]
    fn all_bad_names_are_reported() {
        let input = names(&["a.1.dcm", "a.x.dcm", "readme", "a.1.img", "a.0.dcm"]);
        let errors = order_names(&input).unwrap_err();

        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], SliceNameError::InvalidIndex { .. }));
        assert!(matches!(errors[1], SliceNameError::MissingIndex(_)));
        assert!(matches!(errors[2], SliceNameError::Duplicate { index: 1, .. }));
        assert!(matches!(errors[3], SliceNameError::OutOfRange { index: 0, .. }));
    }

    #[test]
    fn orders_a_folder() {
        let dir = tempfile::tempdir().unwrap();
        for k in [3, 1, 2] {
            fs::write(dir.path().join(format!("IM.{k}.dcm")), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();

        let ordered = order_slices(dir.path()).unwrap();
        let names: Vec<_> = ordered
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["IM.1.dcm", "IM.2.dcm", "IM.3.dcm"]);
    }

    #[test]
    fn missing_folder_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = order_slices(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, SliceOrderError::Io { .. }));
    }
}
