use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

/// Column types treated as numeric for filter classification. This is the
/// broad substring test the filter parser uses; it is deliberately wider
/// than the simplified display label.
const NUMERIC_TYPES: [&str; 12] = [
    "int", "float", "double", "decimal", "int8", "int16", "int32", "int64", "uint8", "uint16",
    "uint32", "uint64",
];

pub fn is_numeric_type(dtype: &str) -> bool {
    let lower = dtype.to_lowercase();
    NUMERIC_TYPES.iter().any(|t| lower.contains(t))
}

/// Simplify a source type tag for display. Pure and total; unrecognized
/// tags pass through unchanged. The classification order matters: the
/// first matching rule wins.
pub fn simplify_type(dtype: &str) -> String {
    let lower = dtype.to_lowercase();
    if lower.contains("date32") || lower.contains("date64") {
        return "date".to_string();
    }
    if lower.contains("timestamp") {
        return "datetime".to_string();
    }
    if matches!(
        lower.as_str(),
        "int8" | "int16" | "int32" | "int64" | "uint8" | "uint16" | "uint32" | "uint64"
    ) {
        return "int".to_string();
    }
    if matches!(
        lower.as_str(),
        "float"
            | "double"
            | "float16"
            | "float32"
            | "float64"
            | "double16"
            | "double32"
            | "double64"
    ) {
        return "float".to_string();
    }
    if lower.contains("decimal") {
        return "decimal".to_string();
    }
    if lower == "bool" {
        return "boolean".to_string();
    }
    if matches!(lower.as_str(), "string" | "utf8" | "large_string" | "large_utf8") {
        return "string".to_string();
    }
    if matches!(lower.as_str(), "binary" | "large_binary") {
        return "binary".to_string();
    }
    if lower.starts_with("list") {
        return "list".to_string();
    }
    if lower.starts_with("struct") {
        return "struct".to_string();
    }
    dtype.to_string()
}

/// Placeholder shown in an empty filter cell.
pub fn filter_placeholder(dtype: &str) -> &'static str {
    if is_numeric_type(dtype) {
        "=, >, <, >=, <="
    } else {
        "text or regex..."
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Text,
    Number,
}

/// One active column filter. At most one per column; a column with an
/// empty raw value has no entry at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Raw text as typed, used to seed the filter input when re-edited.
    #[serde(skip)]
    pub raw: String,
    /// Selection that produced a multi-select filter, used to pre-seed the
    /// value checkboxes when the filter modal is reopened.
    #[serde(skip)]
    pub value_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn indicator(self) -> &'static str {
        match self {
            SortOrder::Asc => "▲",
            SortOrder::Desc => "▼",
        }
    }
}

/// Canonical payload for the `data` endpoint. The backend is the only
/// interpreter of filters and sort; no local filtering of fetched rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    pub path: String,
    pub offset: usize,
    pub limit: usize,
    pub filters: BTreeMap<String, Filter>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub case_insensitive: bool,
    pub use_regex: bool,
}

/// Split a numeric filter input into its comparison operator prefix and
/// value, mirroring `^([><=]+)?\s*(.+)$` with backtracking: the value is
/// never empty, so a pure operator string donates its last char.
fn split_numeric(raw: &str) -> (String, String) {
    let trimmed = raw.trim();
    let mut op_len = trimmed
        .chars()
        .take_while(|c| matches!(c, '>' | '<' | '='))
        .count();
    if op_len == trimmed.len() && op_len > 0 {
        op_len -= 1;
    }
    let (op, rest) = trimmed.split_at(op_len);
    let op = if op.is_empty() { "=" } else { op };
    (op.to_string(), rest.trim().to_string())
}

/// Compile a value selection into a single anchored regex alternation of
/// escaped values, e.g. ["a", "b.c"] -> `^(a|b\.c)$`.
pub fn compile_value_regex(values: &[String]) -> String {
    let escaped: Vec<String> = values.iter().map(|v| regex::escape(v)).collect();
    format!("^({})$", escaped.join("|"))
}

/// Per-column predicate set, sort state and text-mode flags. Owned by the
/// viewer and shared with the load controller (request building) and the
/// render engine (indicators and active markers).
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    filters: BTreeMap<String, Filter>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub case_insensitive: bool,
    pub use_regex: bool,
}

impl QueryState {
    /// Set or clear the filter for a column. An input that trims to empty
    /// removes the filter; absence, not an empty entry, means "no filter".
    pub fn set_filter(&mut self, column: &str, raw: &str, dtype: &str) {
        if raw.trim().is_empty() {
            self.filters.remove(column);
            return;
        }
        let filter = if is_numeric_type(dtype) {
            let (operator, value) = split_numeric(raw);
            Filter {
                kind: FilterKind::Number,
                value,
                operator: Some(operator),
                raw: raw.to_string(),
                value_list: None,
            }
        } else {
            Filter {
                kind: FilterKind::Text,
                value: raw.to_string(),
                operator: None,
                raw: raw.to_string(),
                value_list: None,
            }
        };
        debug!("Filter {column}: {filter:?}");
        self.filters.insert(column.to_string(), filter);
    }

    /// Replace a column's filter with a regex alternation compiled from an
    /// explicit value selection. Forces regex mode on; an empty selection
    /// clears the filter instead.
    pub fn set_multi_select_filter(&mut self, column: &str, values: &[String]) {
        if values.is_empty() {
            self.filters.remove(column);
            return;
        }
        let pattern = compile_value_regex(values);
        self.filters.insert(
            column.to_string(),
            Filter {
                kind: FilterKind::Text,
                value: pattern.clone(),
                operator: None,
                raw: pattern,
                value_list: Some(values.to_vec()),
            },
        );
        self.use_regex = true;
    }

    pub fn clear_filter(&mut self, column: &str) {
        self.filters.remove(column);
    }

    /// Empty the filter set. The case/regex flags are independent of the
    /// filters and stay untouched.
    pub fn clear_all(&mut self) {
        self.filters.clear();
    }

    pub fn filter(&self, column: &str) -> Option<&Filter> {
        self.filters.get(column)
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Three-state sort cycle: other column -> ascending; active ascending
    /// -> descending; active descending -> sort off.
    pub fn toggle_sort(&mut self, column: &str) {
        if self.sort_by.as_deref() == Some(column) {
            match self.sort_order {
                SortOrder::Asc => self.sort_order = SortOrder::Desc,
                SortOrder::Desc => {
                    self.sort_by = None;
                    self.sort_order = SortOrder::Asc;
                }
            }
        } else {
            self.sort_by = Some(column.to_string());
            self.sort_order = SortOrder::Asc;
        }
    }

    pub fn to_request(&self, path: &str, offset: usize, limit: usize) -> DataRequest {
        DataRequest {
            path: path.to_string(),
            offset,
            limit,
            filters: self.filters.clone(),
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order,
            case_insensitive: self.case_insensitive,
            use_regex: self.use_regex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_filter_stored_verbatim_iff_nonempty() {
        let mut q = QueryState::default();
        q.set_filter("city", "NYC", "utf8");
        let f = q.filter("city").unwrap();
        assert_eq!(f.kind, FilterKind::Text);
        assert_eq!(f.value, "NYC");
        assert_eq!(f.operator, None);

        q.set_filter("city", "   ", "utf8");
        assert!(q.filter("city").is_none());
    }

    #[test]
    fn numeric_filter_parses_operator_prefix() {
        let mut q = QueryState::default();
        q.set_filter("age", ">30", "int64");
        let f = q.filter("age").unwrap();
        assert_eq!(f.kind, FilterKind::Number);
        assert_eq!(f.operator.as_deref(), Some(">"));
        assert_eq!(f.value, "30");

        q.set_filter("age", ">= 18", "int64");
        let f = q.filter("age").unwrap();
        assert_eq!(f.operator.as_deref(), Some(">="));
        assert_eq!(f.value, "18");
    }

    #[test]
    fn numeric_filter_defaults_to_equality() {
        let mut q = QueryState::default();
        q.set_filter("age", "30", "int64");
        let f = q.filter("age").unwrap();
        assert_eq!(f.operator.as_deref(), Some("="));
        assert_eq!(f.value, "30");
    }

    #[test]
    fn pure_operator_input_backtracks_one_char() {
        let (op, value) = split_numeric(">>>");
        assert_eq!(op, ">>");
        assert_eq!(value, ">");
    }

    #[test]
    fn sort_cycle_asc_desc_off() {
        let mut q = QueryState::default();
        q.toggle_sort("x");
        assert_eq!(q.sort_by.as_deref(), Some("x"));
        assert_eq!(q.sort_order, SortOrder::Asc);
        q.toggle_sort("x");
        assert_eq!(q.sort_order, SortOrder::Desc);
        q.toggle_sort("x");
        assert_eq!(q.sort_by, None);
        assert_eq!(q.sort_order, SortOrder::Asc);
    }

    #[test]
    fn sort_switch_column_resets_to_ascending() {
        let mut q = QueryState::default();
        q.toggle_sort("x");
        q.toggle_sort("y");
        assert_eq!(q.sort_by.as_deref(), Some("y"));
        assert_eq!(q.sort_order, SortOrder::Asc);
    }

    #[test]
    fn simplify_type_classification() {
        assert_eq!(simplify_type("int32"), "int");
        assert_eq!(simplify_type("uint64"), "int");
        assert_eq!(simplify_type("float64"), "float");
        assert_eq!(simplify_type("timestamp[ms]"), "datetime");
        assert_eq!(simplify_type("date32[day]"), "date");
        assert_eq!(simplify_type("decimal128(10, 2)"), "decimal");
        assert_eq!(simplify_type("bool"), "boolean");
        assert_eq!(simplify_type("large_utf8"), "string");
        assert_eq!(simplify_type("large_binary"), "binary");
        assert_eq!(simplify_type("list<item: int64>"), "list");
        assert_eq!(simplify_type("struct<a: int64>"), "struct");
        assert_eq!(simplify_type("map<string,int>"), "map<string,int>");
    }

    #[test]
    fn numeric_classification_is_broader_than_display_label() {
        assert!(is_numeric_type("int64"));
        assert!(is_numeric_type("Decimal128(10, 2)"));
        assert!(is_numeric_type("double"));
        assert!(!is_numeric_type("utf8"));
        assert!(!is_numeric_type("bool"));
    }

    #[test]
    fn multi_select_compiles_escaped_alternation_and_forces_regex() {
        let mut q = QueryState::default();
        assert!(!q.use_regex);
        q.set_multi_select_filter("city", &["a".to_string(), "b.c".to_string()]);
        let f = q.filter("city").unwrap();
        assert_eq!(f.value, r"^(a|b\.c)$");
        assert_eq!(f.value_list.as_deref(), Some(&["a".to_string(), "b.c".to_string()][..]));
        assert!(q.use_regex);
    }

    #[test]
    fn multi_select_empty_selection_clears() {
        let mut q = QueryState::default();
        q.set_filter("city", "NYC", "utf8");
        q.set_multi_select_filter("city", &[]);
        assert!(q.filter("city").is_none());
    }

    #[test]
    fn clear_all_keeps_flags() {
        let mut q = QueryState::default();
        q.case_insensitive = true;
        q.use_regex = true;
        q.set_filter("a", "x", "utf8");
        q.clear_all();
        assert!(!q.has_filters());
        assert!(q.case_insensitive);
        assert!(q.use_regex);
    }

    #[test]
    fn request_payload_shape() {
        let mut q = QueryState::default();
        q.set_filter("age", ">30", "int64");
        q.toggle_sort("age");
        let req = q.to_request("data/people.parquet", 0, 500);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["offset"], 0);
        assert_eq!(json["limit"], 500);
        assert_eq!(json["sortBy"], "age");
        assert_eq!(json["sortOrder"], "asc");
        assert_eq!(json["caseInsensitive"], false);
        assert_eq!(json["filters"]["age"]["type"], "number");
        assert_eq!(json["filters"]["age"]["operator"], ">");
        assert_eq!(json["filters"]["age"]["value"], "30");
        assert!(json["filters"]["age"].get("raw").is_none());
    }
}
