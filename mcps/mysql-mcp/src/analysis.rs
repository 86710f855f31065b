//! Heuristic hints from MySQL `EXPLAIN` output

use crate::db::DbRow;

/// Selectivity (percent of rows kept by the condition) below which a
/// table access is flagged
const LOW_SELECTIVITY_PERCENT: f64 = 10.0;

/// Inspect `EXPLAIN` rows and suggest improvements
pub fn suggestions(plan: &[DbRow]) -> Vec<String> {
    let mut hints = Vec::new();
    for row in plan {
        let table = row.text("table").unwrap_or_else(|| "?".to_string());
        let extra = row.text("Extra").unwrap_or_default().to_lowercase();

        if row
            .text("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("ALL"))
        {
            hints.push(format!(
                "Full table scan on table '{}'. Consider adding an index.",
                table
            ));
        }
        if extra.contains("filesort") {
            hints.push(format!(
                "Using filesort on table '{}'. Consider adding an index on ORDER BY columns.",
                table
            ));
        }
        if extra.contains("temporary") {
            hints.push(format!(
                "Using temporary table for '{}'. Consider optimizing GROUP BY or DISTINCT.",
                table
            ));
        }
        if let Some(filtered) = row.float("filtered") {
            if filtered < LOW_SELECTIVITY_PERCENT {
                hints.push(format!(
                    "Low selectivity on table '{}' ({:.1}% of rows kept). Review WHERE conditions.",
                    table, filtered
                ));
            }
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlValue;

    fn step(table: &str, access: &str, extra: &str, filtered: f64) -> DbRow {
        DbRow::new()
            .with("id", SqlValue::Int(1))
            .with("table", SqlValue::Text(table.into()))
            .with("type", SqlValue::Text(access.into()))
            .with("filtered", SqlValue::Float(filtered))
            .with("Extra", SqlValue::Text(extra.into()))
    }

    #[test]
    fn test_detects_every_pattern() {
        let plan = vec![step(
            "orders",
            "ALL",
            "Using where; Using temporary; Using filesort",
            5.0,
        )];
        let hints = suggestions(&plan);
        assert_eq!(hints.len(), 4);
        assert!(hints[0].starts_with("Full table scan on table 'orders'"));
        assert!(hints[1].contains("ORDER BY"));
        assert!(hints[2].contains("GROUP BY or DISTINCT"));
        assert!(hints[3].contains("5.0%"));
    }

    #[test]
    fn test_indexed_lookup_is_clean() {
        let plan = vec![step("users", "ref", "Using index", 100.0)];
        assert!(suggestions(&plan).is_empty());
    }

    #[test]
    fn test_missing_columns_are_ignored() {
        assert!(suggestions(&[DbRow::new()]).is_empty());
    }
}
