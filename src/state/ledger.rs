//! Ledger tables
//!
//! Both ledgers are CSV files with a leading 0-based `Index` column.
//!
//! The store ledger (`data/log.csv`) has `File`, `Class` and one boolean
//! column per conversion key, telling whether that conversion has already
//! been applied to the stored file:
//!
//! ```text
//! Index,File,Class,grayscale,png,scale
//! 0,bar_01.jpg,bar,False,False,False
//! 1,pie_07.png,pie,False,True,True
//! ```
//!
//! A dataset ledger (`dataset-<i>/log.csv`) only has `File` and `Class`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::write_atomic;
use crate::error::{Result, StoreError};

const INDEX_COLUMN: &str = "Index";
const FILE_COLUMN: &str = "File";
const CLASS_COLUMN: &str = "Class";

/// One stored image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    /// Filename inside `data/images/`
    pub file: String,
    /// Label key
    pub class: String,
    /// Conversion key -> already applied
    pub flags: BTreeMap<String, bool>,
}

impl StoreRecord {
    /// A conversion with no column in the ledger has never been applied.
    pub fn is_applied(&self, conversion: &str) -> bool {
        self.flags.get(conversion).copied().unwrap_or(false)
    }

    /// The requested conversions this file still needs, in request order.
    pub fn remaining<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        requested
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| !self.is_applied(c))
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreLedger {
    /// Flag columns, in file order
    pub conversions: Vec<String>,
    pub records: Vec<StoreRecord>,
}

impl StoreLedger {
    /// An empty ledger with one flag column per conversion key.
    pub fn new(conversions: Vec<String>) -> Self {
        Self {
            conversions,
            records: Vec::new(),
        }
    }

    pub fn contains(&self, file: &str) -> bool {
        self.records.iter().any(|r| r.file == file)
    }

    /// Append a row with every flag unset.
    pub fn push(&mut self, file: impl Into<String>, class: impl Into<String>) {
        let flags = self
            .conversions
            .iter()
            .map(|c| (c.clone(), false))
            .collect();
        self.records.push(StoreRecord {
            file: file.into(),
            class: class.into(),
            flags,
        });
    }

    /// Flag `conversion` as applied on row `row`, adding the column (unset for
    /// every other row) if the ledger doesn't have it yet.
    pub fn mark_applied(&mut self, row: usize, conversion: &str) {
        if !self.conversions.iter().any(|c| c == conversion) {
            self.conversions.push(conversion.to_string());
            for record in &mut self.records {
                record.flags.insert(conversion.to_string(), false);
            }
        }
        if let Some(record) = self.records.get_mut(row) {
            record.flags.insert(conversion.to_string(), true);
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
        let headers = reader
            .headers()
            .map_err(|e| StoreError::csv(path, e))?
            .clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| StoreError::ledger(path, format!("missing '{name}' column")))
        };
        let file_col = column(FILE_COLUMN)?;
        let class_col = column(CLASS_COLUMN)?;

        // Every other named column is a conversion flag. An unnamed first
        // column is a bare row index.
        let flag_cols: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != file_col && *i != class_col)
            .filter(|(_, h)| !h.is_empty() && *h != INDEX_COLUMN)
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut ledger = StoreLedger::new(flag_cols.iter().map(|(_, h)| h.clone()).collect());
        let mut seen = HashSet::new();

        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|e| StoreError::csv(path, e))?;
            let field = |i: usize| row.get(i).unwrap_or("");

            let file = field(file_col).to_string();
            if !seen.insert(file.clone()) {
                return Err(StoreError::ledger(
                    path,
                    format!("duplicate File '{file}' on row {line}"),
                ));
            }

            let mut flags = BTreeMap::new();
            for (i, name) in &flag_cols {
                let value = parse_flag(field(*i)).ok_or_else(|| {
                    StoreError::ledger(
                        path,
                        format!("row {line}: '{}' is not a boolean in column '{name}'", field(*i)),
                    )
                })?;
                flags.insert(name.clone(), value);
            }

            ledger.records.push(StoreRecord {
                file,
                class: field(class_col).to_string(),
                flags,
            });
        }

        Ok(ledger)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec![INDEX_COLUMN, FILE_COLUMN, CLASS_COLUMN];
        header.extend(self.conversions.iter().map(String::as_str));
        writer
            .write_record(&header)
            .map_err(|e| StoreError::csv(path, e))?;

        for (index, record) in self.records.iter().enumerate() {
            let mut row = vec![index.to_string(), record.file.clone(), record.class.clone()];
            row.extend(
                self.conversions
                    .iter()
                    .map(|c| format_flag(record.is_applied(c)).to_string()),
            );
            writer
                .write_record(&row)
                .map_err(|e| StoreError::csv(path, e))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::io(path, e.into_error()))?;
        write_atomic(path, &bytes)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn format_flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// One image of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Image path, relative to the dataset directory unless absolute
    #[serde(rename = "File")]
    pub file: String,
    #[serde(rename = "Class")]
    pub class: String,
}

#[derive(Serialize)]
struct IndexedRow<'a> {
    #[serde(rename = "Index")]
    index: usize,
    #[serde(rename = "File")]
    file: &'a str,
    #[serde(rename = "Class")]
    class: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetLedger {
    pub records: Vec<DatasetRecord>,
}

impl DatasetLedger {
    pub fn new(records: Vec<DatasetRecord>) -> Self {
        Self { records }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<DatasetRecord>, _>>()
            .map_err(|e| StoreError::csv(path, e))?;
        Ok(Self { records })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if self.records.is_empty() {
            // serde writes headers lazily, so an empty ledger needs them by hand
            writer
                .write_record([INDEX_COLUMN, FILE_COLUMN, CLASS_COLUMN])
                .map_err(|e| StoreError::csv(path, e))?;
        }
        for (index, record) in self.records.iter().enumerate() {
            writer
                .serialize(IndexedRow {
                    index,
                    file: &record.file,
                    class: &record.class,
                })
                .map_err(|e| StoreError::csv(path, e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::io(path, e.into_error()))?;
        write_atomic(path, &bytes)
    }

    pub fn files(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.file.as_str()).collect()
    }

    pub fn classes(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.class.as_str()).collect()
    }
}
