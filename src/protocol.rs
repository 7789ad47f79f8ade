use serde::Deserialize;
use serde_json::Value;

/// Field the backend attaches to every row carrying the 1-indexed original
/// row position. Rendered in the row-number gutter, never exported.
pub const ROW_INDEX_FIELD: &str = "__row_index__";

/// One row as returned by the `data` endpoint: an ordered mapping from
/// column name to a JSON scalar (string, number, bool or null).
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Source type tag as reported by the backend, e.g. "int64", "utf8",
    /// "timestamp[ms]". Display uses the simplified form, filter
    /// classification the broader numeric vocabulary.
    #[serde(rename = "type")]
    pub dtype: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub columns: Vec<ColumnMeta>,
    pub total_rows: usize,
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResponse {
    pub data: Vec<Row>,
    pub has_more: bool,
    /// Row count after filtering, before pagination.
    pub total_rows: usize,
}

/// Aggregate statistics for one column. All type-specific sections are
/// optional; the backend only fills the ones matching the column type.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnStats {
    pub column_name: String,
    pub data_type: String,
    pub total_rows: u64,
    pub non_null_count: u64,
    pub non_null_percentage: f64,
    pub null_count: u64,
    pub null_percentage: f64,
    pub unique_count: u64,
    pub unique_percentage: f64,
    // Numeric columns
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub median: Option<f64>,
    #[serde(default)]
    pub std_dev: Option<f64>,
    #[serde(default)]
    pub outlier_count: Option<u64>,
    #[serde(default)]
    pub outlier_percentage: Option<f64>,
    #[serde(default)]
    pub outlier_lower_bound: Option<f64>,
    #[serde(default)]
    pub outlier_upper_bound: Option<f64>,
    // String columns
    #[serde(default)]
    pub most_common_value: Option<String>,
    #[serde(default)]
    pub most_common_count: Option<u64>,
    #[serde(default)]
    pub min_length: Option<u64>,
    #[serde(default)]
    pub max_length: Option<u64>,
    #[serde(default)]
    pub avg_length: Option<f64>,
    // Date / datetime columns
    #[serde(default)]
    pub earliest_date: Option<String>,
    #[serde(default)]
    pub latest_date: Option<String>,
    #[serde(default)]
    pub date_range_days: Option<i64>,
}

/// Capped unique-value listing for one column, most frequent first.
#[derive(Debug, Clone, Deserialize)]
pub struct UniqueValues {
    pub values: Vec<String>,
    pub counts: Vec<u64>,
    pub limit: i64,
    pub total_count: u64,
}

/// Render a JSON scalar the way it appears in a cell. Nulls render empty.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Original row position for the gutter, if the backend attached one.
pub fn row_index(row: &Row) -> Option<u64> {
    row.get(ROW_INDEX_FIELD).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_response_parses_with_and_without_file_size() {
        let with: MetadataResponse = serde_json::from_value(json!({
            "columns": [{"name": "age", "type": "int64"}],
            "totalRows": 1000,
            "fileSize": 2048,
        }))
        .unwrap();
        assert_eq!(with.columns[0].name, "age");
        assert_eq!(with.columns[0].dtype, "int64");
        assert_eq!(with.total_rows, 1000);
        assert_eq!(with.file_size, 2048);

        let without: MetadataResponse = serde_json::from_value(json!({
            "columns": [],
            "totalRows": 0,
        }))
        .unwrap();
        assert_eq!(without.file_size, 0);
    }

    #[test]
    fn column_stats_parses_partial_sections() {
        let stats: ColumnStats = serde_json::from_value(json!({
            "column_name": "age",
            "data_type": "int",
            "total_rows": 100,
            "non_null_count": 90,
            "non_null_percentage": 90.0,
            "null_count": 10,
            "null_percentage": 10.0,
            "unique_count": 42,
            "unique_percentage": 42.0,
            "min_value": 1.0,
            "max_value": 99.0,
        }))
        .unwrap();
        assert_eq!(stats.min_value, Some(1.0));
        assert!(stats.most_common_value.is_none());
        assert!(stats.earliest_date.is_none());
    }

    #[test]
    fn cell_text_renders_scalars() {
        assert_eq!(cell_text(&json!(null)), "");
        assert_eq!(cell_text(&json!("NYC")), "NYC");
        assert_eq!(cell_text(&json!(42)), "42");
        assert_eq!(cell_text(&json!(true)), "true");
    }

    #[test]
    fn row_index_reads_reserved_field() {
        let row: Row = serde_json::from_value(json!({"a": 1, "__row_index__": 7})).unwrap();
        assert_eq!(row_index(&row), Some(7));
        let bare: Row = serde_json::from_value(json!({"a": 1})).unwrap();
        assert_eq!(row_index(&bare), None);
    }

    #[test]
    fn unique_values_parse() {
        let uv: UniqueValues = serde_json::from_value(json!({
            "values": ["a", "b"],
            "counts": [5, 3],
            "limit": 2,
            "total_count": 10,
        }))
        .unwrap();
        assert_eq!(uv.values, ["a", "b"]);
        assert_eq!(uv.counts, [5, 3]);
        assert_eq!(uv.total_count, 10);
    }
}
