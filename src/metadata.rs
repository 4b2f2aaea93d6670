use calamine::{Data, Reader, open_workbook_auto};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Columns rendered on the info card when nothing else is requested.
pub const DEFAULT_INFO_COLUMNS: std::ops::RangeInclusive<usize> = 1..=9;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("No worksheet found in {}", .0.display())]
    EmptySheet(PathBuf),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Unsupported metadata format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

/// A patient metadata sheet held as text cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatientTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl PatientTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Load a table from a `.csv` file or from the first worksheet of a
    /// spreadsheet (`.xlsx`, `.xlsm`, `.xls`, `.ods`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("csv") => Self::load_csv(path),
            Some("xlsx" | "xlsm" | "xls" | "ods") => Self::load_spreadsheet(path),
            _ => Err(MetadataError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    fn load_csv(path: &Path) -> Result<Self, MetadataError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.iter().map(str::to_owned).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_owned).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;

        Ok(Self::new(headers, rows))
    }

    fn load_spreadsheet(path: &Path) -> Result<Self, MetadataError> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| MetadataError::EmptySheet(path.to_path_buf()))??;

        let mut rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
        let headers = rows
            .next()
            .ok_or_else(|| MetadataError::EmptySheet(path.to_path_buf()))?;

        Ok(Self::new(headers, rows.collect()))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the column named `name`.
    pub fn column(&self, name: &str) -> Result<usize, MetadataError> {
        self.headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| MetadataError::MissingColumn(name.to_owned()))
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Cell of `row` in the column named `name`; empty if the row is short.
    pub fn value(&self, row: usize, name: &str) -> Result<&str, MetadataError> {
        let column = self.column(name)?;
        Ok(self.cell(row, column).unwrap_or_default())
    }

    /// First row whose `column` cell holds the integer `key`.
    pub fn find_row(&self, column: &str, key: i64) -> Result<Option<usize>, MetadataError> {
        let column = self.column(column)?;
        Ok((0..self.rows.len())
            .find(|&row| self.cell(row, column).and_then(parse_integer) == Some(key)))
    }

    /// `"<header>: <value>"` for each requested column present in the table.
    pub fn info_lines(&self, row: usize, columns: impl IntoIterator<Item = usize>) -> Vec<String> {
        columns
            .into_iter()
            .filter_map(|column| {
                let header = self.headers.get(column)?;
                let value = self.cell(row, column).unwrap_or_default();
                Some(format!("{header}: {value}"))
            })
            .collect()
    }
}

/// Spreadsheet cell as text; whole floats lose their fractional part so
/// ids stored as numbers read back as `101` rather than `101.0`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_owned(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            (*f as i64).to_string()
        }
        other => other.to_string(),
    }
}

/// Integer value of a cell, accepting whole-valued decimals such as `"7.0"`.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>().ok().or_else(|| {
        let value = text.parse::<f64>().ok()?;
        (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientRecord {
    pub name: String,
    pub id: String,
}

/// Patients sorted by name. Positions are 0-based.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientIndex {
    records: Vec<PatientRecord>,
}

impl PatientIndex {
    /// Build the index from the `name` and `id` columns of `table`.
    pub fn from_table(table: &PatientTable) -> Result<Self, MetadataError> {
        let name_column = table.column("name")?;
        let id_column = table.column("id")?;

        let mut records: Vec<_> = (0..table.len())
            .map(|row| PatientRecord {
                name: table.cell(row, name_column).unwrap_or_default().to_owned(),
                id: table.cell(row, id_column).unwrap_or_default().to_owned(),
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self { records })
    }

    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&PatientRecord> {
        self.records.get(position)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&PatientRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn find_by_id(&self, id: i64) -> Option<&PatientRecord> {
        self.records
            .iter()
            .find(|r| parse_integer(&r.id) == Some(id))
    }
}

/// Load the name-sorted patient index from a metadata file.
pub fn load_patient_index(path: impl AsRef<Path>) -> Result<PatientIndex, MetadataError> {
    let path = path.as_ref();
    PatientTable::load(path)
        .and_then(|table| PatientIndex::from_table(&table))
        .inspect_err(|err| {
            log::error!("Failed to load patient info from {}: {err}", path.display())
        })
}
