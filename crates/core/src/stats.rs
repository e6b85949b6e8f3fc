//! Tabular reshaping helpers for the reporting module.
//!
//! The reporting endpoint bulk-loads entity tables and reduces them to small
//! summary tables: grouped counts, cross-tabulations with margins, flattened
//! list counts, and fixed-width histograms. Everything here is pure and
//! tolerates empty input.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::Value;

/// Label used when a grouped value is blank or missing.
pub const MISSING: &str = "Missing/None";

/// A small result table, serialized as `{columns, rows}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    match value {
        Some(v) => {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => None,
    }
}

/// Count occurrences per distinct value.
///
/// Blank values are folded into `fill` when given, dropped otherwise.
pub fn group_count<I>(values: I, label: &str, fill: Option<&str>) -> Table
where
    I: IntoIterator<Item = Option<String>>,
{
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();

    for value in values {
        match (normalize(value), fill) {
            (Some(v), _) => *counts.entry(v).or_default() += 1,
            (None, Some(f)) => *counts.entry(f.to_string()).or_default() += 1,
            (None, None) => {}
        }
    }

    counts_to_table(&counts, label)
}

/// Turn a prepared count map into a two-column table.
pub fn counts_to_table(counts: &BTreeMap<String, u64>, label: &str) -> Table {
    let mut table = Table::new(&[label, "Count"]);
    for (value, count) in counts {
        table
            .rows
            .push(vec![Value::from(value.as_str()), Value::from(*count)]);
    }
    table
}

/// Cross-tabulation of (row, column) pairs with "All" margins on both axes.
///
/// Pairs with a blank row or column value are ignored, matching how the
/// source data treats unknowns in pivots.
pub fn crosstab(pairs: &[(String, String)], row_label: &str) -> Table {
    let mut cells: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    let mut col_keys: BTreeMap<String, ()> = BTreeMap::new();

    for (row, col) in pairs {
        let (Some(row), Some(col)) = (
            normalize(Some(row.clone())),
            normalize(Some(col.clone())),
        ) else {
            continue;
        };

        *cells.entry(row).or_default().entry(col.clone()).or_default() += 1;
        col_keys.insert(col, ());
    }

    let mut columns: Vec<String> = vec![row_label.to_string()];
    columns.extend(col_keys.keys().cloned());
    columns.push("All".to_string());

    let mut table = Table {
        columns,
        rows: Vec::new(),
    };

    if cells.is_empty() {
        return table;
    }

    let mut col_totals: BTreeMap<String, u64> = BTreeMap::new();
    let mut grand_total = 0u64;

    for (row_key, row_counts) in &cells {
        let mut row: Vec<Value> = vec![Value::from(row_key.as_str())];
        let mut row_total = 0u64;

        for col_key in col_keys.keys() {
            let count = row_counts.get(col_key).copied().unwrap_or(0);
            row.push(Value::from(count));
            row_total += count;
            *col_totals.entry(col_key.clone()).or_default() += count;
        }

        row.push(Value::from(row_total));
        grand_total += row_total;
        table.rows.push(row);
    }

    let mut margin: Vec<Value> = vec![Value::from("All")];
    for col_key in col_keys.keys() {
        margin.push(Value::from(col_totals.get(col_key).copied().unwrap_or(0)));
    }
    margin.push(Value::from(grand_total));
    table.rows.push(margin);

    table
}

/// Flatten list-valued cells and count each item.
pub fn count_in_lists<'a, I>(lists: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'a Vec<String>>,
{
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for list in lists {
        for item in list {
            if let Some(item) = normalize(Some(item.clone())) {
                *counts.entry(item).or_default() += 1;
            }
        }
    }
    counts
}

/// Calendar-month bucket for a date ("YYYY-MM").
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Whole months elapsed between two dates, clamped at zero. A partial final
/// month does not count: someone born on the 15th turns a month older on the
/// 15th, not on the 1st.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let mut months =
        (to.year() as i64 - from.year() as i64) * 12 + (to.month() as i64 - from.month() as i64);
    if to.day() < from.day() {
        months -= 1;
    }
    months.max(0)
}

/// Fixed-width histogram over non-negative values; bins are `[lo, lo+step)`
/// labeled "lo-hi", covering zero through the maximum observed value.
pub fn histogram(values: &[i64], step: i64, label: &str) -> Table {
    let mut table = Table::new(&[label, "Count"]);

    let Some(&max) = values.iter().max() else {
        return table;
    };

    let mut lo = 0i64;
    while lo <= max {
        let hi = lo + step;
        let count = values.iter().filter(|&&v| v >= lo && v < hi).count() as u64;
        table.rows.push(vec![
            Value::from(format!("{}-{}", lo, hi)),
            Value::from(count),
        ]);
        lo = hi;
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opt(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn group_count_folds_blanks_into_fill() {
        let mut values = opt(&["a", "b", "a", ""]);
        values.push(None);

        let table = group_count(values, "Letter", Some(MISSING));

        assert_eq!(table.columns, vec!["Letter", "Count"]);
        assert_eq!(
            table.rows,
            vec![
                vec![json!("Missing/None"), json!(2)],
                vec![json!("a"), json!(2)],
                vec![json!("b"), json!(1)],
            ]
        );
    }

    #[test]
    fn group_count_drops_blanks_without_fill() {
        let table = group_count(opt(&["a", ""]), "Letter", None);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn group_count_of_nothing_is_empty() {
        let table = group_count(Vec::<Option<String>>::new(), "Letter", None);
        assert!(table.is_empty());
    }

    #[test]
    fn crosstab_produces_margins() {
        let pairs = vec![
            ("2024-01".to_string(), "male".to_string()),
            ("2024-01".to_string(), "female".to_string()),
            ("2024-02".to_string(), "male".to_string()),
        ];

        let table = crosstab(&pairs, "First Encounter");

        assert_eq!(
            table.columns,
            vec!["First Encounter", "female", "male", "All"]
        );
        assert_eq!(
            table.rows,
            vec![
                vec![json!("2024-01"), json!(1), json!(1), json!(2)],
                vec![json!("2024-02"), json!(0), json!(1), json!(1)],
                vec![json!("All"), json!(1), json!(2), json!(3)],
            ]
        );
    }

    #[test]
    fn crosstab_skips_blank_pairs_and_handles_empty_input() {
        let pairs = vec![("".to_string(), "male".to_string())];
        assert!(crosstab(&pairs, "Month").is_empty());
        assert!(crosstab(&[], "Month").is_empty());
    }

    #[test]
    fn count_in_lists_flattens() {
        let lists = vec![
            vec!["TDF".to_string(), "3TC".to_string()],
            vec!["TDF".to_string()],
        ];

        let counts = count_in_lists(lists.iter());

        assert_eq!(counts.get("TDF"), Some(&2));
        assert_eq!(counts.get("3TC"), Some(&1));
    }

    #[test]
    fn month_arithmetic() {
        let from = NaiveDate::from_ymd_opt(2023, 11, 20).unwrap();

        // The 20th has not come around yet in February, so only two whole
        // months have elapsed.
        let early = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(months_between(from, early), 2);

        let on_day = NaiveDate::from_ymd_opt(2024, 2, 20).unwrap();
        assert_eq!(months_between(from, on_day), 3);

        assert_eq!(months_between(early, from), 0);
        assert_eq!(month_key(early), "2024-02");
    }

    #[test]
    fn histogram_covers_zero_to_max() {
        let table = histogram(&[3, 11, 25], 10, "Age");

        assert_eq!(
            table.rows,
            vec![
                vec![json!("0-10"), json!(1)],
                vec![json!("10-20"), json!(1)],
                vec![json!("20-30"), json!(1)],
            ]
        );
    }

    #[test]
    fn histogram_of_nothing_is_empty() {
        assert!(histogram(&[], 10, "Age").is_empty());
    }
}
