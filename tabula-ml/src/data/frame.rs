//! In-memory tabular datasets.
//!
//! [`RawDataset`] holds cells exactly as ingested. [`RefinedDataset`] is the
//! typed result of refinement: numeric, temporal, or categorical columns that
//! all share one row index.

use crate::error::MlError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

/// A single untyped value as ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Stable textual key used for duplicate detection.
    fn key(&self) -> String {
        match self {
            Cell::Null => "\u{0}".to_string(),
            Cell::Bool(b) => format!("b:{}", b),
            Cell::Number(v) => format!("n:{}", v.to_bits()),
            Cell::Text(s) => format!("t:{}", s),
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => write!(f, ""),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Number(v) => write!(f, "{}", v),
            Cell::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Row labels shared by every column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "labels", rename_all = "snake_case")]
pub enum RowIndex {
    /// Plain positional index `0..n`.
    #[default]
    Range,
    /// Explicit labels, one per row.
    Labels(Vec<String>),
}

impl RowIndex {
    /// Integer label of the row at `position`, or -1 when the label is not an integer.
    pub fn integer_label(&self, position: usize) -> i64 {
        match self {
            RowIndex::Range => position as i64,
            RowIndex::Labels(labels) => labels
                .get(position)
                .and_then(|l| l.trim().parse::<i64>().ok())
                .unwrap_or(-1),
        }
    }
}

/// A raw column: a name and its cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// The first `limit` non-null cells.
    pub fn sample(&self, limit: usize) -> Vec<&Cell> {
        self.cells.iter().filter(|c| !c.is_null()).take(limit).collect()
    }
}

/// Rows × columns of heterogeneous values as ingested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    columns: Vec<RawColumn>,
    index: RowIndex,
    n_rows: usize,
}

impl RawDataset {
    /// Build from columns of equal length.
    pub fn from_columns(columns: Vec<RawColumn>) -> Result<Self, MlError> {
        let n_rows = columns.first().map(|c| c.cells.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.cells.len() != n_rows) {
            return Err(MlError::dataset(format!(
                "column '{}' has {} rows, expected {}",
                bad.name,
                bad.cells.len(),
                n_rows
            )));
        }
        Ok(Self {
            columns,
            index: RowIndex::Range,
            n_rows,
        })
    }

    /// Build from a header and row-major cells. Short rows are padded with nulls;
    /// extra trailing cells are dropped.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let n_rows = rows.len();
        let mut columns: Vec<RawColumn> = headers
            .into_iter()
            .map(|name| RawColumn::new(name, Vec::with_capacity(n_rows)))
            .collect();
        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.cells.push(cells.next().unwrap_or(Cell::Null));
            }
        }
        Self {
            columns,
            index: RowIndex::Range,
            n_rows,
        }
    }

    /// Replace the row index.
    pub fn with_index(mut self, index: RowIndex) -> Result<Self, MlError> {
        if let RowIndex::Labels(labels) = &index
            && labels.len() != self.n_rows
        {
            return Err(MlError::dataset(format!(
                "index has {} labels for {} rows",
                labels.len(),
                self.n_rows
            )));
        }
        self.index = index;
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[RawColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn index(&self) -> &RowIndex {
        &self.index
    }

    /// Whether every non-null cell of the column is a number (and at least one is).
    pub fn is_numeric_column(column: &RawColumn) -> bool {
        let mut any = false;
        for cell in &column.cells {
            match cell {
                Cell::Null => {}
                Cell::Number(_) => any = true,
                _ => return false,
            }
        }
        any
    }

    /// Count of rows identical to an earlier row.
    pub fn duplicate_rows(&self) -> usize {
        count_duplicates(self.n_rows, |row| {
            self.columns
                .iter()
                .map(|c| c.cells[row].key())
                .collect::<Vec<_>>()
                .join("\u{1f}")
        })
    }
}

/// Typed column values after refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Temporal(Vec<NaiveDate>),
    Categorical(Vec<Cell>),
}

/// The type of a refined column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Temporal,
    Categorical,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Temporal => write!(f, "temporal"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

impl ColumnData {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Temporal(_) => ColumnKind::Temporal,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Temporal(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `row` in its raw form. Temporal values become ISO dates.
    pub fn cell(&self, row: usize) -> Cell {
        match self {
            ColumnData::Numeric(v) => v.get(row).map(|x| Cell::Number(*x)).unwrap_or(Cell::Null),
            ColumnData::Temporal(v) => v
                .get(row)
                .map(|d| Cell::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Cell::Null),
            ColumnData::Categorical(v) => v.get(row).cloned().unwrap_or(Cell::Null),
        }
    }
}

/// A typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn temporal(name: impl Into<String>, values: Vec<NaiveDate>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Temporal(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_temporal(&self) -> Option<&[NaiveDate]> {
        match &self.data {
            ColumnData::Temporal(v) => Some(v),
            _ => None,
        }
    }
}

/// A dataset whose columns have been re-typed by refinement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinedDataset {
    columns: Vec<Column>,
    index: RowIndex,
    n_rows: usize,
}

impl RefinedDataset {
    pub fn new(columns: Vec<Column>, index: RowIndex) -> Result<Self, MlError> {
        let n_rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.data.len() != n_rows) {
            return Err(MlError::dataset(format!(
                "column '{}' has {} rows, expected {}",
                bad.name,
                bad.data.len(),
                n_rows
            )));
        }
        if let RowIndex::Labels(labels) = &index
            && labels.len() != n_rows
        {
            return Err(MlError::dataset("index length does not match rows"));
        }
        Ok(Self {
            columns,
            index,
            n_rows,
        })
    }

    /// Convenience constructor for numeric-only data.
    pub fn from_numeric(columns: Vec<(&str, Vec<f64>)>) -> Result<Self, MlError> {
        Self::new(
            columns
                .into_iter()
                .map(|(name, values)| Column::numeric(name, values))
                .collect(),
            RowIndex::Range,
        )
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0 || self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self) -> &RowIndex {
        &self.index
    }

    /// Numeric columns in dataset order.
    pub fn numeric_columns(&self) -> Vec<(&str, &[f64])> {
        self.columns
            .iter()
            .filter_map(|c| c.as_numeric().map(|v| (c.name.as_str(), v)))
            .collect()
    }

    pub fn names_of_kind(&self, kind: ColumnKind) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind() == kind)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Null cells. Only categorical columns can hold nulls after refinement.
    pub fn missing_cells(&self) -> usize {
        self.columns
            .iter()
            .map(|c| match &c.data {
                ColumnData::Categorical(cells) => cells.iter().filter(|x| x.is_null()).count(),
                _ => 0,
            })
            .sum()
    }

    /// Count of rows identical to an earlier row.
    pub fn duplicate_rows(&self) -> usize {
        count_duplicates(self.n_rows, |row| {
            self.columns
                .iter()
                .map(|c| c.data.cell(row).key())
                .collect::<Vec<_>>()
                .join("\u{1f}")
        })
    }

    /// Convert back to raw cells.
    pub fn to_raw(&self) -> RawDataset {
        RawDataset {
            columns: self
                .columns
                .iter()
                .map(|c| RawColumn::new(c.name.clone(), (0..self.n_rows).map(|r| c.data.cell(r)).collect()))
                .collect(),
            index: self.index.clone(),
            n_rows: self.n_rows,
        }
    }

    /// Keep only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self, MlError> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name)
                    .cloned()
                    .ok_or_else(|| MlError::dataset(format!("column '{}' not found", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(columns, self.index.clone())
    }

    /// A short comma-separated rendering of the first `rows` rows.
    pub fn preview(&self, rows: usize) -> String {
        let mut out = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        for row in 0..rows.min(self.n_rows) {
            out.push('\n');
            let line = self
                .columns
                .iter()
                .map(|c| c.data.cell(row).to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "{}", line);
        }
        out
    }
}

fn count_duplicates(n_rows: usize, key: impl Fn(usize) -> String) -> usize {
    let mut seen = HashSet::with_capacity(n_rows);
    (0..n_rows).filter(|&row| !seen.insert(key(row))).count()
}
