//! Refinement: heuristic re-typing of raw columns.
//!
//! Each column runs through an ordered rule table. A rule pairs a predicate
//! over the column (and a sample of its non-null cells) with a coercion. The
//! first rule whose predicate accepts and whose coercion succeeds decides the
//! column's type; columns no rule claims stay categorical.
//!
//! Refinement never fails. Numeric output never contains NaN or ±Inf.

use crate::data::dates::{DayOrder, parse_date};
use crate::data::frame::{Cell, Column, ColumnData, RawColumn, RawDataset, RefinedDataset};
use chrono::NaiveDate;
use tracing::debug;

/// Non-null cells inspected per column.
pub const SAMPLE_SIZE: usize = 100;

const TEMPORAL_NAME_HINTS: &[&str] = &["date", "time", "stamp", "day", "month", "year"];

const STRIPPED_SYMBOLS: &[char] = &['$', '€', '%', ','];

/// One entry of the refinement table.
pub struct Rule {
    pub name: &'static str,
    accepts: fn(&RawColumn, &[&Cell]) -> bool,
    coerce: fn(&RawColumn, &[&Cell]) -> Option<ColumnData>,
}

/// Rules in evaluation order.
pub static RULES: &[Rule] = &[
    Rule {
        name: "native_numeric",
        accepts: is_native_numeric,
        coerce: sanitize_numeric,
    },
    Rule {
        name: "temporal_by_name",
        accepts: has_temporal_name,
        coerce: coerce_temporal,
    },
    Rule {
        name: "numeric_text",
        accepts: always,
        coerce: coerce_numeric_text,
    },
];

/// Refine a raw dataset. The input is left untouched.
pub fn refine(raw: &RawDataset) -> RefinedDataset {
    let columns: Vec<Column> = raw.columns().iter().map(refine_column).collect();
    // Every coercion preserves length, so this only fails on a broken raw dataset.
    RefinedDataset::new(columns, raw.index().clone()).unwrap_or_else(|e| {
        debug!(error = %e, "Refined columns disagreed on length; returning empty dataset");
        RefinedDataset::default()
    })
}

fn refine_column(column: &RawColumn) -> Column {
    let sample = column.sample(SAMPLE_SIZE);
    if !sample.is_empty() {
        for rule in RULES {
            if !(rule.accepts)(column, &sample) {
                continue;
            }
            if let Some(data) = (rule.coerce)(column, &sample) {
                debug!(column = %column.name, rule = rule.name, kind = %data.kind(), "Column refined");
                return Column {
                    name: column.name.clone(),
                    data,
                };
            }
        }
    }
    Column::categorical(column.name.clone(), column.cells.clone())
}

fn always(_: &RawColumn, _: &[&Cell]) -> bool {
    true
}

fn is_native_numeric(column: &RawColumn, _: &[&Cell]) -> bool {
    RawDataset::is_numeric_column(column)
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

fn sanitize_numeric(column: &RawColumn, _: &[&Cell]) -> Option<ColumnData> {
    Some(ColumnData::Numeric(
        column
            .cells
            .iter()
            .map(|c| c.as_number().map(finite_or_zero).unwrap_or(0.0))
            .collect(),
    ))
}

fn has_temporal_name(column: &RawColumn, _: &[&Cell]) -> bool {
    let lower = column.name.to_lowercase();
    TEMPORAL_NAME_HINTS.iter().any(|hint| lower.contains(hint))
}

fn parse_cell_date(cell: &Cell, order: DayOrder) -> Option<NaiveDate> {
    cell.as_text().and_then(|s| parse_date(s, order))
}

fn count_parsed(sample: &[&Cell], order: DayOrder) -> usize {
    sample
        .iter()
        .filter(|c| parse_cell_date(c, order).is_some())
        .count()
}

fn coerce_temporal(column: &RawColumn, sample: &[&Cell]) -> Option<ColumnData> {
    let mut order = DayOrder::DayFirst;
    let mut parsed = count_parsed(sample, order);
    if (sample.len() - parsed) * 2 > sample.len() {
        let retry = count_parsed(sample, DayOrder::MonthFirst);
        if retry > parsed {
            order = DayOrder::MonthFirst;
            parsed = retry;
        }
    }
    if parsed * 2 <= sample.len() {
        return None;
    }

    let mut dates: Vec<Option<NaiveDate>> = column
        .cells
        .iter()
        .map(|c| parse_cell_date(c, order))
        .collect();
    fill_forward_backward(&mut dates);
    dates
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .map(ColumnData::Temporal)
}

fn fill_forward_backward<T: Copy>(values: &mut [Option<T>]) {
    let mut last = None;
    for v in values.iter_mut() {
        match v {
            Some(x) => last = Some(*x),
            None => *v = last,
        }
    }
    let mut next = None;
    for v in values.iter_mut().rev() {
        match v {
            Some(x) => next = Some(*x),
            None => *v = next,
        }
    }
}

/// Parse a number after stripping currency, percent, thousands separators and whitespace.
pub fn parse_numeric_text(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED_SYMBOLS.contains(c))
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn cell_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(v) => Some(*v),
        Cell::Text(s) => parse_numeric_text(s),
        _ => None,
    }
}

fn coerce_numeric_text(column: &RawColumn, sample: &[&Cell]) -> Option<ColumnData> {
    let converted = sample.iter().filter(|c| cell_number(c).is_some()).count();
    if converted * 2 <= sample.len() {
        return None;
    }
    Some(ColumnData::Numeric(
        column
            .cells
            .iter()
            .map(|c| cell_number(c).map(finite_or_zero).unwrap_or(0.0))
            .collect(),
    ))
}
