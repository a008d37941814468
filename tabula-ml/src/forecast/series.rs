//! Column matching and monthly aggregation for forecasting.

use crate::data::dates::{DayOrder, month_end, parse_date};
use crate::data::refine::parse_numeric_text;
use crate::data::{Cell, ColumnData, RefinedDataset};
use crate::error::MlError;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use tracing::debug;

pub const DATE_HINTS: &[&str] = &["date", "time", "stamp"];
pub const VALUE_HINTS: &[&str] = &["price", "value", "amount", "val", "revenue", "sales"];

/// Month-end labeled series with one mean value per month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl MonthlySeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        Some((*self.dates.last()?, *self.values.last()?))
    }
}

/// Resolve a requested column: exact name, then case-insensitive, then the
/// first column containing one of `hints`.
pub fn resolve_column(names: &[&str], requested: &str, hints: &[&str]) -> Option<String> {
    if let Some(exact) = names.iter().find(|n| **n == requested) {
        return Some(exact.to_string());
    }
    let wanted = requested.to_lowercase();
    if let Some(ci) = names.iter().find(|n| n.to_lowercase() == wanted) {
        return Some(ci.to_string());
    }
    names
        .iter()
        .find(|n| {
            let lower = n.to_lowercase();
            hints.iter().any(|h| lower.contains(h))
        })
        .map(|n| n.to_string())
}

fn cell_date(cell: &Cell) -> Option<NaiveDate> {
    let text = cell.as_text()?;
    parse_date(text, DayOrder::MonthFirst).or_else(|| parse_date(text, DayOrder::DayFirst))
}

fn dates_of(data: &ColumnData) -> Vec<Option<NaiveDate>> {
    match data {
        ColumnData::Temporal(dates) => dates.iter().copied().map(Some).collect(),
        ColumnData::Categorical(cells) => cells.iter().map(cell_date).collect(),
        ColumnData::Numeric(values) => vec![None; values.len()],
    }
}

fn values_of(data: &ColumnData) -> Vec<Option<f64>> {
    match data {
        ColumnData::Numeric(values) => values
            .iter()
            .map(|v| v.is_finite().then_some(*v))
            .collect(),
        ColumnData::Categorical(cells) => cells
            .iter()
            .map(|cell| match cell {
                Cell::Number(n) if n.is_finite() => Some(*n),
                Cell::Text(s) => parse_numeric_text(s).filter(|v| v.is_finite()),
                _ => None,
            })
            .collect(),
        ColumnData::Temporal(dates) => vec![None; dates.len()],
    }
}

/// Build the monthly series for a (date, value) pair. Rows with an
/// unparseable date or a missing value are dropped.
pub fn monthly_series(
    ds: &RefinedDataset,
    date_column: &str,
    value_column: &str,
) -> Result<MonthlySeries, MlError> {
    let names: Vec<&str> = ds.columns().iter().map(|c| c.name.as_str()).collect();
    let date_name = resolve_column(&names, date_column, DATE_HINTS).ok_or_else(|| {
        MlError::forecast(format!(
            "Date column '{}' not found. Available: {:?}",
            date_column, names
        ))
    })?;
    let value_name = resolve_column(&names, value_column, VALUE_HINTS).ok_or_else(|| {
        MlError::forecast(format!(
            "Value column '{}' not found. Available: {:?}",
            value_column, names
        ))
    })?;

    let dates = ds
        .column(&date_name)
        .map(|c| dates_of(&c.data))
        .unwrap_or_default();
    let values = ds
        .column(&value_name)
        .map(|c| values_of(&c.data))
        .unwrap_or_default();

    let mut buckets: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();
    for (date, value) in dates.iter().zip(&values) {
        if let (Some(date), Some(value)) = (date, value) {
            let entry = buckets.entry((date.year(), date.month())).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    if buckets.is_empty() {
        return Err(MlError::forecast("No valid data points found after cleaning"));
    }

    let mut series = MonthlySeries {
        dates: Vec::with_capacity(buckets.len()),
        values: Vec::with_capacity(buckets.len()),
    };
    for ((year, month), (sum, count)) in buckets {
        let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            continue;
        };
        series.dates.push(month_end(first));
        series.values.push(sum / count as f64);
    }
    debug!(
        date_column = %date_name,
        value_column = %value_name,
        months = series.len(),
        "Aggregated monthly series"
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::data::RowIndex;
    use pretty_assertions::assert_eq;

    fn sales() -> RefinedDataset {
        RefinedDataset::new(
            vec![
                Column::categorical(
                    "Order Date",
                    vec![
                        Cell::text("2024-01-05"),
                        Cell::text("2024-01-20"),
                        Cell::text("not a date"),
                        Cell::text("2024-03-02"),
                    ],
                ),
                Column::categorical(
                    "Sales",
                    vec![
                        Cell::text("$100"),
                        Cell::Number(300.0),
                        Cell::Number(50.0),
                        Cell::Null,
                    ],
                ),
                Column::numeric("units", vec![1.0, 2.0, 3.0, 4.0]),
            ],
            RowIndex::Range,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_column_order() {
        let names = ["Date", "order_timestamp", "Price", "amount"];
        assert_eq!(resolve_column(&names, "Date", DATE_HINTS), Some("Date".into()));
        assert_eq!(resolve_column(&names, "date", DATE_HINTS), Some("Date".into()));
        assert_eq!(resolve_column(&names, "when", DATE_HINTS), Some("Date".into()));
        assert_eq!(resolve_column(&names, "AMOUNT", VALUE_HINTS), Some("amount".into()));
        assert_eq!(resolve_column(&names, "y", VALUE_HINTS), Some("Price".into()));
        assert_eq!(resolve_column(&["x", "y"], "z", VALUE_HINTS), None);
    }

    #[test]
    fn test_monthly_mean_and_drops() {
        let series = monthly_series(&sales(), "date", "sales").unwrap();
        assert_eq!(
            series.dates,
            vec![NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()]
        );
        assert_eq!(series.values, vec![200.0]);
    }

    #[test]
    fn test_missing_column_errors() {
        let ds = RefinedDataset::from_numeric(vec![("x", vec![1.0])]).unwrap();
        assert!(matches!(
            monthly_series(&ds, "date", "x"),
            Err(MlError::Forecast(_))
        ));
    }

    #[test]
    fn test_nothing_survives_cleaning() {
        let ds = RefinedDataset::new(
            vec![
                Column::categorical("date", vec![Cell::text("nope")]),
                Column::numeric("value", vec![1.0]),
            ],
            RowIndex::Range,
        )
        .unwrap();
        let err = monthly_series(&ds, "date", "value").unwrap_err();
        assert!(err.to_string().contains("No valid data points"));
    }
}
