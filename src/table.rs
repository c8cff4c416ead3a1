/// An untyped table produced by a format-specific reader. Every row holds
/// exactly `columns.len()` cells; constructors pad or truncate to keep that
/// invariant so downstream code can index freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|row| fit_row(row, width))
            .collect();
        Self { columns, rows }
    }

    /// Builds a table with generic `col_N` names from ragged candidate rows,
    /// sized to the widest row.
    pub fn from_ragged(rows: Vec<Vec<String>>, name_prefix: &str) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let columns = (0..width).map(|i| format!("{name_prefix}_{i}")).collect();
        Self::new(columns, rows)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    /// Merges extracted tables after a winning strategy: the widest table is
    /// the reference; the rest are padded or truncated to its width and all
    /// rows are concatenated in original table order under the reference's
    /// column names.
    pub fn align_and_concat(tables: Vec<RawTable>) -> Option<RawTable> {
        let reference = tables
            .iter()
            .max_by_key(|t| t.width())
            .cloned()?;
        let width = reference.width();
        let mut rows = Vec::new();
        for table in tables {
            for row in table.rows {
                rows.push(fit_row(row, width));
            }
        }
        Some(RawTable {
            columns: reference.columns,
            rows,
        })
    }
}

fn fit_row(mut row: Vec<String>, width: usize) -> Vec<String> {
    if row.len() < width {
        row.resize(width, String::new());
    } else {
        row.truncate(width);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(cols: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            cols.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn constructor_enforces_uniform_width() {
        let table = RawTable::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into()], vec!["1".into(), "2".into(), "3".into()]],
        );
        assert!(table.rows.iter().all(|r| r.len() == 2));
        assert_eq!(table.rows[0], vec!["1".to_string(), String::new()]);
    }

    #[test]
    fn ragged_rows_get_generic_names_at_max_width() {
        let table = RawTable::from_ragged(
            vec![vec!["x".into()], vec!["y".into(), "z".into()]],
            "col",
        );
        assert_eq!(table.columns, vec!["col_0", "col_1"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn alignment_uses_widest_table_and_preserves_order() {
        let narrow = t(&["p", "q"], &[&["1", "2"]]);
        let wide = t(&["a", "b", "c"], &[&["3", "4", "5"]]);
        let merged = RawTable::align_and_concat(vec![narrow, wide]).unwrap();
        assert_eq!(merged.columns, vec!["a", "b", "c"]);
        assert_eq!(merged.rows[0], vec!["1", "2", ""]);
        assert_eq!(merged.rows[1], vec!["3", "4", "5"]);
    }

    #[test]
    fn alignment_of_nothing_is_none() {
        assert!(RawTable::align_and_concat(Vec::new()).is_none());
    }
}
