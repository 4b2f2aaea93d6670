use clap::ValueEnum;

/// What to do when a single slice of a cube cannot be decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SlicePolicy {
    /// The first unreadable slice aborts the whole cube
    #[value(name = "abort")]
    AbortOnFirst,
    /// Unreadable slices are logged and left out of the stack
    #[default]
    #[value(name = "skip")]
    SkipAndLog,
    /// Every slice is attempted, failures are reported together
    #[value(name = "collect")]
    CollectAll,
}

/// Where the slices of a cube are read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceSource {
    /// DICOM files, flipped vertically before stacking
    Dicom,
    /// Single-image FITS files, stacked as stored
    Fits,
}

impl SliceSource {
    pub(crate) fn flips_rows(self) -> bool {
        matches!(self, SliceSource::Dicom)
    }
}

/// How patient folders are paired with metadata rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum JoinStrategy {
    /// Folder `i` of the sorted listing pairs with row `i` of the name-sorted table
    #[default]
    Position,
    /// Folder name equals the patient name
    Name,
    /// Folder name, read as an integer, equals the patient id
    Id,
}
