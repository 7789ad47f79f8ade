use std::io::Error;

use derive_setters::Setters;
use ratatui::crossterm::event::KeyEvent;

use crate::client::ApiError;

#[derive(Debug)]
pub enum TdvError {
    IoError(Error),
    ApiError(ApiError),
    InvalidPath(String),
}

impl From<Error> for TdvError {
    fn from(err: Error) -> Self {
        TdvError::IoError(err)
    }
}

impl From<ApiError> for TdvError {
    fn from(err: ApiError) -> Self {
        TdvError::ApiError(err)
    }
}

/// Viewer configuration, resolved from CLI flags in `main`. Column widths
/// are terminal cells.
#[derive(Debug, Clone, Setters)]
pub struct ViewerConfig {
    pub base_url: String,
    pub page_size: usize,
    /// Cell text longer than this many chars is truncated with an
    /// ellipsis; 0 disables truncation.
    pub max_cell_chars: usize,
    /// Cap passed to the unique-values endpoint.
    pub unique_limit: usize,
    pub request_timeout_secs: u64,
    pub event_poll_ms: u64,
    pub default_column_width: usize,
    pub min_column_width: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8888".to_string(),
            page_size: 500,
            max_cell_chars: 120,
            unique_limit: 100,
            request_timeout_secs: 30,
            event_poll_ms: 100,
            default_column_width: 20,
            min_column_width: 8,
        }
    }
}

/// Semantic input events produced by the controller. The model interprets
/// them according to its current mode; messages that make no sense in the
/// active mode are ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp(usize),
    MoveDown(usize),
    MoveLeft,
    MoveRight,
    MoveTop,
    MoveBottom,
    /// Start editing the cursor column's filter.
    EditFilter,
    ToggleSort,
    ToggleCaseInsensitive,
    ToggleRegex,
    ClearFilters,
    ShowColumnStats,
    ShowValueFilter,
    Refresh,
    GrowColumn,
    ShrinkColumn,
    /// Confirm: toggle row selection in the table, confirm a modal.
    Enter,
    /// Dismiss the active modal or editing state.
    Escape,
    /// Copy as JSON: the captured row, or the open stats snapshot.
    CopyJson,
    /// Value-filter modal: select every listed value.
    SelectAll,
    /// Value-filter modal: clear the selection.
    SelectNone,
    /// Value-filter modal: toggle the value under the cursor.
    ToggleValue,
    Help,
    Resize(usize, usize),
    MouseDown(u16, u16),
    MouseDrag(u16, u16),
    MouseUp(u16, u16),
    RightClick(u16, u16),
    WheelUp,
    WheelDown,
    /// Forwarded keystroke while a text input is active.
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "tdv - tabular data viewer

Navigation
  ↑/↓/←/→, hjkl     move cursor
  PgUp/PgDn         move one page
  g / G             first / last loaded row
  mouse wheel       scroll rows

Data
  / or e            edit filter for current column (Enter applies, Esc cancels)
  s                 toggle sort on current column (asc → desc → off)
  i                 toggle case-insensitive matching
  r                 toggle regex matching
  C                 clear all filters
  R                 refresh file metadata and reload
  t                 column statistics
  v                 filter current column by values
  < / >             shrink / widen current column
  drag header edge  resize column with the mouse

Rows
  Enter / click     select or deselect a row
  right-click       row actions (copy as JSON)
  y                 copy: captured row, or open statistics

Other
  ?                 this help
  q                 quit
";
