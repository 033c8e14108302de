// ============================================================
// Layer 3 — Raw Rows and Partitions
// ============================================================
// The tabular shape the encoder and trainer depend on.
// How rows were produced (warehouse export, CSV, synthetic
// generator) is irrelevant past this point.
//
// A cell is either present with a string value or null.
// An empty string counts as null, matching how a CSV export
// renders SQL NULL.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Column holding the 0/1 click label.
pub const LABEL_COLUMN: &str = "label";

/// Column holding the TRAIN / VALIDATE / IGNORE tag.
pub const SPLIT_COLUMN: &str = "data_split";

/// Categorical request attributes, in the order the model sees them.
pub const DEFAULT_SPARSE_FEATURES: [&str; 11] = [
    "user_id", "campaign_id", "creative_id", "slot_id",
    "device", "browser", "os", "country", "city",
    "page_context", "bid_type",
];

/// Numeric request attributes, in the order the model sees them.
pub const DEFAULT_DENSE_FEATURES: [&str; 5] = [
    "banner_width", "banner_height", "bid", "req_hour", "req_dow",
];

/// Time-based split tag assigned upstream from the event timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Partition {
    Train,
    Validate,
    Ignore,
}

impl Partition {
    /// Anything that is not exactly TRAIN or VALIDATE is ignored.
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "TRAIN"    => Partition::Train,
            "VALIDATE" => Partition::Validate,
            _          => Partition::Ignore,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Train    => write!(f, "TRAIN"),
            Partition::Validate => write!(f, "VALIDATE"),
            Partition::Ignore   => write!(f, "IGNORE"),
        }
    }
}

/// One request's raw attributes, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    cells: HashMap<String, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for tests and the generator.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    /// Setting an empty value clears the cell.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let (column, value) = (column.into(), value.into());
        if value.is_empty() {
            self.cells.remove(&column);
        } else {
            self.cells.insert(column, value);
        }
    }

    /// Returns `None` for absent and empty cells alike.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// A raw row plus its supervision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub features:  RawRow,
    pub label:     f32,
    pub partition: Partition,
}

impl LabeledRow {
    pub fn new(features: RawRow, label: f32, partition: Partition) -> Self {
        Self { features, label, partition }
    }
}

/// A set of rows together with the schema they were read with.
///
/// `columns` is what "present in the input schema" means to the
/// encoder: a declared feature missing here is degraded, not an error.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub columns: BTreeSet<String>,
    pub rows:    Vec<LabeledRow>,
}

impl Corpus {
    pub fn new(columns: impl IntoIterator<Item = impl Into<String>>, rows: Vec<LabeledRow>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_parse() {
        assert_eq!(Partition::parse("TRAIN"), Partition::Train);
        assert_eq!(Partition::parse("VALIDATE"), Partition::Validate);
        assert_eq!(Partition::parse("IGNORE"), Partition::Ignore);
        assert_eq!(Partition::parse("train"), Partition::Ignore);
        assert_eq!(Partition::parse(""), Partition::Ignore);
    }

    #[test]
    fn test_empty_cell_reads_as_null() {
        let row = RawRow::new().with("device", "").with("os", "ios");
        assert_eq!(row.get("device"), None);
        assert_eq!(row.get("browser"), None);
        assert_eq!(row.get("os"), Some("ios"));
    }
}
