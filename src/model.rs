use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use arboard::Clipboard;
use ratatui::layout::Rect;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::client::{self, ApiError, Backend};
use crate::domain::{Message, TdvError, ViewerConfig};
use crate::inputter::Inputter;
use crate::loader::{LoadEvent, Loader};
use crate::protocol::{self, ColumnMeta, ColumnStats, Row, UniqueValues};
use crate::query::QueryState;

/// Rows above the body (filter row + header row) and below it (status bar).
pub const HEADER_ROWS: usize = 2;
pub const STATUS_ROWS: usize = 1;

#[derive(Debug, PartialEq)]
pub enum Status {
    RUNNING,
    QUITTING,
}

/// Which surface currently receives input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Table,
    FilterEdit,
    Stats,
    ValueFilter,
    ContextMenu,
    Help,
}

/// A column segment as laid out on screen, shared between rendering and
/// mouse hit-testing so both always agree.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleColumn {
    pub idx: usize,
    pub x: u16,
    pub width: usize,
    /// False for a trailing column clipped by the viewport edge.
    pub full: bool,
}

/// Filter input session for one column.
pub struct FilterEdit {
    pub column: usize,
    pub input: Inputter,
}

/// Statistics snapshot shown in the stats overlay. `raw` is exactly what
/// the backend sent, for the copy action.
pub struct StatsOverlay {
    pub stats: ColumnStats,
    pub raw: Value,
    pub copied: bool,
}

/// Checkbox state of the filter-by-values overlay.
pub struct ValueFilterOverlay {
    pub column: String,
    pub values: Vec<String>,
    pub counts: Vec<u64>,
    pub total_count: u64,
    pub checked: Vec<bool>,
    pub cursor: usize,
    pub scroll: usize,
}

/// An in-progress header drag. Cleared on mouse-up and on teardown.
struct ResizeDrag {
    column: usize,
    start_x: u16,
    start_width: usize,
}

enum OverlayOutcome {
    Stats(Result<(ColumnStats, Value), ApiError>),
    Unique {
        column: String,
        result: Result<UniqueValues, ApiError>,
    },
}

/// The viewer: owns the filter/sort state, the load controller, the
/// ephemeral view state (cursor, selection, widths) and the overlay state.
/// Driven exclusively through [`Message`]s and `poll`.
pub struct ViewerModel {
    config: ViewerConfig,
    backend: Arc<dyn Backend>,
    pub status: Status,
    mode: Mode,
    pub columns: Vec<ColumnMeta>,
    widths: BTreeMap<String, usize>,
    pub query: QueryState,
    pub loader: Loader,

    viewport_width: usize,
    viewport_height: usize,
    pub offset_row: usize,
    pub cursor_row: usize,
    pub offset_col: usize,
    pub cursor_col: usize,
    pub selected_row: Option<usize>,
    /// Row index whose highlight is pinned while the context menu is open.
    pub context_row: Option<usize>,
    /// Last right-clicked row, kept for the copy action after the menu
    /// closes.
    context_row_data: Option<Row>,
    highlight_cleanup_armed: bool,

    pub filter_edit: Option<FilterEdit>,
    pub stats_overlay: Option<StatsOverlay>,
    pub value_filter: Option<ValueFilterOverlay>,
    resize_drag: Option<ResizeDrag>,

    pub status_message: Option<String>,
    pub init_error: Option<String>,

    overlay_loading: bool,
    overlay_tx: Sender<OverlayOutcome>,
    overlay_rx: Receiver<OverlayOutcome>,
    clipboard: Option<Clipboard>,
}

impl ViewerModel {
    pub fn new(
        backend: Arc<dyn Backend>,
        path: String,
        config: ViewerConfig,
        width: usize,
        height: usize,
    ) -> Self {
        let loader = Loader::new(Arc::clone(&backend), path, config.page_size);
        let (overlay_tx, overlay_rx) = mpsc::channel();
        Self {
            config,
            backend,
            status: Status::RUNNING,
            mode: Mode::Table,
            columns: Vec::new(),
            widths: BTreeMap::new(),
            query: QueryState::default(),
            loader,
            viewport_width: width,
            viewport_height: height,
            offset_row: 0,
            cursor_row: 0,
            offset_col: 0,
            cursor_col: 0,
            selected_row: None,
            context_row: None,
            context_row_data: None,
            highlight_cleanup_armed: false,
            filter_edit: None,
            stats_overlay: None,
            value_filter: None,
            resize_drag: None,
            status_message: None,
            init_error: None,
            overlay_loading: false,
            overlay_tx,
            overlay_rx,
            clipboard: None,
        }
    }

    /// Kick off the metadata fetch. The first data load follows once the
    /// metadata lands (see `poll`).
    pub fn open(&mut self) {
        self.status_message = Some("Loading...".to_string());
        self.loader.open();
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// While a filter input is active, keystrokes are forwarded raw.
    pub fn raw_keyevents(&self) -> bool {
        self.mode == Mode::FilterEdit
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn column_width(&self, idx: usize) -> usize {
        self.columns
            .get(idx)
            .and_then(|c| self.widths.get(&c.name))
            .copied()
            .unwrap_or(self.config.default_column_width)
    }

    /// Sum of all column widths plus the row-number gutter, i.e. how wide
    /// the table would render unclipped.
    pub fn total_table_width(&self) -> usize {
        let columns: usize = (0..self.columns.len())
            .map(|i| self.column_width(i) + 1)
            .sum();
        self.gutter_width() + columns
    }

    pub fn body_height(&self) -> usize {
        self.viewport_height.saturating_sub(HEADER_ROWS + STATUS_ROWS)
    }

    pub fn viewport(&self) -> (usize, usize) {
        (self.viewport_width, self.viewport_height)
    }

    /// Width of the row-number gutter, sized by the largest visible
    /// original row index. Under a sort the indices are not monotone, so
    /// the maximum over the visible window decides.
    pub fn gutter_width(&self) -> usize {
        let rows = &self.loader.state.rows;
        let end = (self.offset_row + self.body_height()).min(rows.len());
        let label = rows
            .get(self.offset_row.min(end)..end)
            .unwrap_or(&[])
            .iter()
            .filter_map(protocol::row_index)
            .max()
            .map(|i| i.to_string().len())
            .unwrap_or(0);
        label.max(3) + 1
    }

    /// Columns that fit the viewport starting at the horizontal offset,
    /// with their screen positions. The last column may be clipped.
    pub fn visible_columns(&self) -> Vec<VisibleColumn> {
        let mut visible = Vec::new();
        let mut x = self.gutter_width();
        for idx in self.offset_col..self.columns.len() {
            let width = self.column_width(idx);
            if x + width < self.viewport_width {
                visible.push(VisibleColumn {
                    idx,
                    x: x as u16,
                    width,
                    full: true,
                });
                x += width + 1;
            } else {
                let remaining = self.viewport_width.saturating_sub(x);
                if remaining > 0 {
                    visible.push(VisibleColumn {
                        idx,
                        x: x as u16,
                        width: remaining,
                        full: false,
                    });
                }
                break;
            }
        }
        visible
    }

    fn column_at(&self, x: u16) -> Option<VisibleColumn> {
        self.visible_columns()
            .into_iter()
            .find(|c| x >= c.x && (x as usize) < c.x as usize + c.width)
    }

    /// A resize handle is the separator cell at a fully visible column's
    /// right edge, on either header line.
    fn boundary_at(&self, x: u16) -> Option<VisibleColumn> {
        self.visible_columns()
            .into_iter()
            .filter(|c| c.full)
            .find(|c| x as usize == c.x as usize + c.width)
    }

    fn row_at(&self, y: u16) -> Option<usize> {
        let y = y as usize;
        if y < HEADER_ROWS || y >= HEADER_ROWS + self.body_height() {
            return None;
        }
        let idx = self.offset_row + (y - HEADER_ROWS);
        (idx < self.loader.state.rows.len()).then_some(idx)
    }

    /// Centered rect for the stats and value-filter overlays.
    pub fn overlay_rect(&self) -> Rect {
        let w = (self.viewport_width.saturating_sub(4)).min(64) as u16;
        let h = (self.viewport_height.saturating_sub(4)).min(24) as u16;
        let x = (self.viewport_width as u16).saturating_sub(w) / 2;
        let y = (self.viewport_height as u16).saturating_sub(h) / 2;
        Rect::new(x, y, w, h)
    }

    /// Small centered rect for the row context menu.
    pub fn menu_rect(&self) -> Rect {
        let w = 26u16.min(self.viewport_width as u16);
        let h = 3u16.min(self.viewport_height as u16);
        let x = (self.viewport_width as u16).saturating_sub(w) / 2;
        let y = (self.viewport_height as u16).saturating_sub(h) / 2;
        Rect::new(x, y, w, h)
    }

    fn in_rect(rect: Rect, x: u16, y: u16) -> bool {
        x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
    }

    // -------------------- Message handling ---------------------- //

    pub fn update(&mut self, message: Message) -> Result<(), TdvError> {
        trace!("Update: mode {:?}, message {:?}", self.mode, message);
        // Window size and drag handling apply in every mode.
        match message {
            Message::Resize(w, h) => {
                self.resize(w, h);
                return Ok(());
            }
            Message::MouseUp(_, _) => {
                self.resize_drag = None;
                return Ok(());
            }
            Message::MouseDrag(x, _) if self.resize_drag.is_some() => {
                self.drag_resize(x);
                return Ok(());
            }
            _ => {}
        }
        match self.mode {
            Mode::Table => self.update_table(message),
            Mode::FilterEdit => self.update_filter_edit(message),
            Mode::Stats => self.update_stats(message),
            Mode::ValueFilter => self.update_value_filter(message),
            Mode::ContextMenu => self.update_context_menu(message),
            Mode::Help => self.update_help(message),
        }
        Ok(())
    }

    fn update_table(&mut self, message: Message) {
        match message {
            Message::Quit => self.quit(),
            Message::MoveUp(n) => self.move_cursor_up(n),
            Message::MoveDown(n) => self.move_cursor_down(n),
            Message::WheelUp => self.move_cursor_up(3),
            Message::WheelDown => self.move_cursor_down(3),
            Message::MoveLeft => self.move_cursor_left(),
            Message::MoveRight => self.move_cursor_right(),
            Message::MoveTop => {
                self.cursor_row = 0;
                self.offset_row = 0;
            }
            Message::MoveBottom => {
                let len = self.loader.state.rows.len();
                if len > 0 {
                    self.cursor_row = len - 1;
                    self.scroll_cursor_into_view();
                    self.maybe_load_more();
                }
            }
            Message::EditFilter => self.begin_filter_edit(self.cursor_col),
            Message::ToggleSort => self.toggle_sort(self.cursor_col),
            Message::ToggleCaseInsensitive => {
                self.query.case_insensitive = !self.query.case_insensitive;
                self.reset();
            }
            Message::ToggleRegex => {
                self.query.use_regex = !self.query.use_regex;
                self.reset();
            }
            Message::ClearFilters => self.clear_filters(),
            Message::ShowColumnStats => self.request_column_stats(self.cursor_col),
            Message::ShowValueFilter => self.request_value_filter(self.cursor_col),
            Message::Refresh => {
                info!("Refreshing {}", self.loader.path());
                self.status_message = Some("Loading...".to_string());
                self.loader.open();
            }
            Message::GrowColumn => self.adjust_column_width(self.cursor_col, 2),
            Message::ShrinkColumn => self.adjust_column_width(self.cursor_col, -2),
            Message::Enter => self.toggle_row_selection(self.cursor_row),
            Message::CopyJson => self.copy_context_row(),
            Message::Help => self.mode = Mode::Help,
            Message::MouseDown(x, y) => self.table_click(x, y),
            Message::RightClick(x, y) => self.table_right_click(x, y),
            _ => (),
        }
    }

    fn update_filter_edit(&mut self, message: Message) {
        let Message::RawKey(key) = message else {
            return;
        };
        let Some(edit) = self.filter_edit.as_mut() else {
            return;
        };
        let column = edit.column;
        let result = edit.input.read(key);
        let Some(col) = self.columns.get(column).cloned() else {
            self.filter_edit = None;
            self.mode = Mode::Table;
            return;
        };
        if result.canceled {
            self.filter_edit = None;
            self.mode = Mode::Table;
        } else if result.finished {
            // Enter always submits and starts a new page session.
            self.query.set_filter(&col.name, &result.input, &col.dtype);
            self.filter_edit = None;
            self.mode = Mode::Table;
            self.reset();
        } else if result.input.is_empty() && self.query.filter(&col.name).is_some() {
            // Erasing the field clears the filter without waiting for
            // Enter; editing continues.
            self.query.clear_filter(&col.name);
            self.reset();
        }
    }

    fn update_stats(&mut self, message: Message) {
        match message {
            Message::Quit => self.quit(),
            Message::Escape | Message::Enter => {
                self.stats_overlay = None;
                self.mode = Mode::Table;
            }
            Message::CopyJson => self.copy_stats_json(),
            Message::MouseDown(x, y) => {
                // Backdrop click closes; clicks inside the overlay do not.
                if !Self::in_rect(self.overlay_rect(), x, y) {
                    self.stats_overlay = None;
                    self.mode = Mode::Table;
                }
            }
            _ => (),
        }
    }

    fn update_value_filter(&mut self, message: Message) {
        let overlay_rect = self.overlay_rect();
        let Some(overlay) = self.value_filter.as_mut() else {
            self.mode = Mode::Table;
            return;
        };
        match message {
            Message::Quit => self.quit(),
            Message::MoveUp(n) => {
                overlay.cursor = overlay.cursor.saturating_sub(n);
                overlay.scroll = overlay.scroll.min(overlay.cursor);
            }
            Message::MoveDown(n) => {
                if !overlay.values.is_empty() {
                    overlay.cursor = (overlay.cursor + n).min(overlay.values.len() - 1);
                    let visible = (overlay_rect.height as usize).saturating_sub(6).max(1);
                    if overlay.cursor >= overlay.scroll + visible {
                        overlay.scroll = overlay.cursor + 1 - visible;
                    }
                }
            }
            Message::ToggleValue => {
                if let Some(checked) = overlay.checked.get_mut(overlay.cursor) {
                    *checked = !*checked;
                }
            }
            Message::SelectAll => overlay.checked.iter_mut().for_each(|c| *c = true),
            Message::SelectNone => overlay.checked.iter_mut().for_each(|c| *c = false),
            Message::Enter => self.confirm_value_filter(),
            Message::Escape => {
                self.value_filter = None;
                self.mode = Mode::Table;
            }
            Message::MouseDown(x, y) => {
                if Self::in_rect(overlay_rect, x, y) {
                    // Checkbox lines start below the overlay's title block.
                    let line = y.saturating_sub(overlay_rect.y + 2) as usize;
                    let idx = overlay.scroll + line;
                    if y > overlay_rect.y + 1
                        && let Some(checked) = overlay.checked.get_mut(idx)
                    {
                        overlay.cursor = idx;
                        *checked = !*checked;
                    }
                } else {
                    self.value_filter = None;
                    self.mode = Mode::Table;
                }
            }
            _ => (),
        }
    }

    fn update_context_menu(&mut self, message: Message) {
        match message {
            Message::Quit => self.quit(),
            Message::Enter | Message::CopyJson => {
                self.copy_context_row();
                self.close_context_menu();
            }
            Message::Escape | Message::MouseDown(_, _) | Message::RightClick(_, _) => {
                self.close_context_menu();
            }
            _ => (),
        }
    }

    fn update_help(&mut self, message: Message) {
        match message {
            Message::Quit => self.quit(),
            Message::Escape | Message::Enter | Message::Help | Message::MouseDown(_, _) => {
                self.mode = Mode::Table;
            }
            _ => (),
        }
    }

    // -------------------- Table interactions ---------------------- //

    fn move_cursor_up(&mut self, n: usize) {
        self.cursor_row = self.cursor_row.saturating_sub(n);
        self.scroll_cursor_into_view();
        self.maybe_load_more();
    }

    fn move_cursor_down(&mut self, n: usize) {
        let len = self.loader.state.rows.len();
        if len == 0 {
            return;
        }
        self.cursor_row = (self.cursor_row + n).min(len - 1);
        self.scroll_cursor_into_view();
        self.maybe_load_more();
    }

    fn move_cursor_left(&mut self) {
        self.cursor_col = self.cursor_col.saturating_sub(1);
        self.scroll_column_into_view();
    }

    fn move_cursor_right(&mut self) {
        if self.columns.is_empty() {
            return;
        }
        self.cursor_col = (self.cursor_col + 1).min(self.columns.len() - 1);
        self.scroll_column_into_view();
    }

    fn scroll_cursor_into_view(&mut self) {
        let height = self.body_height().max(1);
        if self.cursor_row < self.offset_row {
            self.offset_row = self.cursor_row;
        } else if self.cursor_row >= self.offset_row + height {
            self.offset_row = self.cursor_row + 1 - height;
        }
    }

    fn scroll_column_into_view(&mut self) {
        if self.cursor_col < self.offset_col {
            self.offset_col = self.cursor_col;
            return;
        }
        // Walk the offset right until the cursor column is fully on screen.
        while !self
            .visible_columns()
            .iter()
            .any(|c| c.idx == self.cursor_col && c.full)
        {
            if self.offset_col >= self.cursor_col {
                break;
            }
            self.offset_col += 1;
        }
    }

    /// Fetch the next page when the viewport bottom has entered the
    /// lookahead window. The loading/has_more guards make repeated calls
    /// at the threshold no-ops.
    fn maybe_load_more(&mut self) {
        let viewport_bottom =
            (self.offset_row + self.body_height()).min(self.loader.state.rows.len());
        if self.loader.near_buffer_end(viewport_bottom) {
            self.loader.load_more(&self.query);
        }
    }

    fn toggle_row_selection(&mut self, row: usize) {
        if row >= self.loader.state.rows.len() {
            return;
        }
        // Selecting an already selected row deselects it; a new row takes
        // over the single selection slot.
        self.selected_row = if self.selected_row == Some(row) {
            None
        } else {
            Some(row)
        };
    }

    fn toggle_sort(&mut self, column: usize) {
        let Some(col) = self.columns.get(column) else {
            return;
        };
        let name = col.name.clone();
        self.query.toggle_sort(&name);
        self.reset();
    }

    fn clear_filters(&mut self) {
        if self.query.has_filters() {
            self.query.clear_all();
            self.reset();
        }
    }

    fn begin_filter_edit(&mut self, column: usize) {
        let Some(col) = self.columns.get(column) else {
            return;
        };
        let mut input = Inputter::default();
        if let Some(filter) = self.query.filter(&col.name) {
            input.set(&filter.raw);
        }
        self.cursor_col = column;
        self.scroll_column_into_view();
        self.filter_edit = Some(FilterEdit { column, input });
        self.mode = Mode::FilterEdit;
    }

    fn adjust_column_width(&mut self, column: usize, delta: isize) {
        let Some(col) = self.columns.get(column) else {
            return;
        };
        let current = self.column_width(column) as isize;
        let width = (current + delta).max(self.config.min_column_width as isize) as usize;
        self.widths.insert(col.name.clone(), width);
    }

    fn table_click(&mut self, x: u16, y: u16) {
        if y as usize >= HEADER_ROWS {
            if let Some(row) = self.row_at(y) {
                self.cursor_row = row;
                self.toggle_row_selection(row);
            }
            return;
        }
        // Header area. The separator at a column's right edge is its
        // resize handle and takes precedence over the cell content.
        if let Some(col) = self.boundary_at(x) {
            self.resize_drag = Some(ResizeDrag {
                column: col.idx,
                start_x: x,
                start_width: self.column_width(col.idx),
            });
            return;
        }
        let Some(col) = self.column_at(x) else {
            return;
        };
        if y == 0 {
            self.begin_filter_edit(col.idx);
        } else if col.full && x as usize == col.x as usize + col.width - 1 {
            // The info affordance in the header cell's last column.
            self.cursor_col = col.idx;
            self.request_column_stats(col.idx);
        } else {
            self.cursor_col = col.idx;
            self.toggle_sort(col.idx);
        }
    }

    fn table_right_click(&mut self, _x: u16, y: u16) {
        let Some(row) = self.row_at(y) else {
            return;
        };
        self.cursor_row = row;
        self.context_row = Some(row);
        self.context_row_data = Some(self.loader.state.rows[row].clone());
        self.highlight_cleanup_armed = true;
        self.mode = Mode::ContextMenu;
    }

    /// Close the context menu and run the highlight cleanup exactly once.
    fn close_context_menu(&mut self) {
        self.mode = Mode::Table;
        if self.highlight_cleanup_armed {
            self.highlight_cleanup_armed = false;
            self.context_row = None;
        }
    }

    fn drag_resize(&mut self, x: u16) {
        let Some(drag) = &self.resize_drag else {
            return;
        };
        let Some(col) = self.columns.get(drag.column) else {
            return;
        };
        let delta = x as isize - drag.start_x as isize;
        let width =
            (drag.start_width as isize + delta).max(self.config.min_column_width as isize) as usize;
        self.widths.insert(col.name.clone(), width);
        trace!(
            "Resized column {} to {width} (table width {})",
            drag.column,
            self.total_table_width()
        );
    }

    pub fn resizing(&self) -> bool {
        self.resize_drag.is_some()
    }

    fn resize(&mut self, width: usize, height: usize) {
        trace!(
            "Viewport resized {}x{} -> {width}x{height}",
            self.viewport_width, self.viewport_height
        );
        self.viewport_width = width;
        self.viewport_height = height;
        self.scroll_cursor_into_view();
    }

    // -------------------- Page sessions ---------------------- //

    /// Start a new page session: discard the row buffer and selection and
    /// load from offset 0.
    fn reset(&mut self) {
        self.offset_row = 0;
        self.cursor_row = 0;
        self.selected_row = None;
        self.context_row = None;
        self.status_message = Some("Loading...".to_string());
        self.loader.reset(&self.query);
    }

    /// Drain async fetch results. Called once per event-loop tick.
    pub fn poll(&mut self) {
        if let Some(event) = self.loader.poll(&self.query) {
            match event {
                LoadEvent::MetadataLoaded(meta) => {
                    debug!(
                        "Metadata: {} columns, {} rows",
                        meta.columns.len(),
                        meta.total_rows
                    );
                    for col in &meta.columns {
                        self.widths
                            .entry(col.name.clone())
                            .or_insert(self.config.default_column_width);
                    }
                    self.columns = meta.columns;
                    self.cursor_col = self.cursor_col.min(self.columns.len().saturating_sub(1));
                    self.init_error = None;
                    self.reset();
                }
                LoadEvent::MetadataFailed(e) => {
                    self.init_error = Some(format!("Failed to load file: {e}"));
                    self.status_message = Some(format!("Failed to load file: {e}"));
                }
                LoadEvent::Appended { reset, appended } => {
                    trace!("Appended {appended} rows (reset: {reset})");
                    self.status_message = None;
                }
                LoadEvent::LoadFailed(e) => {
                    // Previously rendered rows stay intact; only the status
                    // line reports the failure.
                    self.status_message = Some(format!("Failed to load data: {e}"));
                }
            }
        }
        if let Ok(outcome) = self.overlay_rx.try_recv() {
            self.overlay_loading = false;
            match outcome {
                OverlayOutcome::Stats(Ok((stats, raw))) => {
                    self.stats_overlay = Some(StatsOverlay {
                        stats,
                        raw,
                        copied: false,
                    });
                    self.mode = Mode::Stats;
                }
                OverlayOutcome::Stats(Err(e)) => {
                    self.status_message = Some(format!("Failed to load statistics: {e}"));
                }
                OverlayOutcome::Unique { column, result: Ok(unique) } => {
                    self.open_value_filter(column, unique);
                }
                OverlayOutcome::Unique { result: Err(e), .. } => {
                    self.status_message = Some(format!("Failed to load unique values: {e}"));
                }
            }
        }
    }

    // -------------------- Overlays ---------------------- //

    fn request_column_stats(&mut self, column: usize) {
        let Some(col) = self.columns.get(column) else {
            return;
        };
        if self.overlay_loading {
            return;
        }
        self.overlay_loading = true;
        self.status_message = Some("Loading statistics...".to_string());
        let backend = Arc::clone(&self.backend);
        let path = self.loader.path().to_string();
        let name = col.name.clone();
        let tx = self.overlay_tx.clone();
        thread::spawn(move || {
            let result = client::fetch_column_stats(backend.as_ref(), &path, &name);
            let _ = tx.send(OverlayOutcome::Stats(result));
        });
    }

    fn request_value_filter(&mut self, column: usize) {
        let Some(col) = self.columns.get(column) else {
            return;
        };
        if self.overlay_loading {
            return;
        }
        self.overlay_loading = true;
        self.status_message = Some("Loading unique values...".to_string());
        let backend = Arc::clone(&self.backend);
        let path = self.loader.path().to_string();
        let name = col.name.clone();
        let limit = self.config.unique_limit;
        let tx = self.overlay_tx.clone();
        thread::spawn(move || {
            let result = client::fetch_unique_values(backend.as_ref(), &path, &name, limit);
            let _ = tx.send(OverlayOutcome::Unique {
                column: name,
                result,
            });
        });
    }

    fn open_value_filter(&mut self, column: String, unique: UniqueValues) {
        // Pre-seed the checkboxes from an existing multi-select filter.
        let selected: Vec<String> = self
            .query
            .filter(&column)
            .and_then(|f| f.value_list.clone())
            .unwrap_or_default();
        let checked = unique
            .values
            .iter()
            .map(|v| selected.contains(v))
            .collect();
        self.status_message = None;
        self.value_filter = Some(ValueFilterOverlay {
            column,
            values: unique.values,
            counts: unique.counts,
            total_count: unique.total_count,
            checked,
            cursor: 0,
            scroll: 0,
        });
        self.mode = Mode::ValueFilter;
    }

    fn confirm_value_filter(&mut self) {
        let Some(overlay) = self.value_filter.take() else {
            return;
        };
        self.mode = Mode::Table;
        let selection: Vec<String> = overlay
            .values
            .iter()
            .zip(&overlay.checked)
            .filter(|&(_, &checked)| checked)
            .map(|(v, _)| v.clone())
            .collect();
        if selection.is_empty() {
            self.query.clear_filter(&overlay.column);
        } else {
            self.query.set_multi_select_filter(&overlay.column, &selection);
        }
        self.reset();
    }

    // -------------------- Clipboard bridge ---------------------- //

    /// Serialize the captured row (without the reserved row-index field) as
    /// indented JSON onto the system clipboard.
    fn copy_context_row(&mut self) {
        let Some(row) = self.context_row_data.clone() else {
            self.status_message = Some("No row captured".to_string());
            return;
        };
        match serde_json::to_string_pretty(&export_row(&row)) {
            Ok(json) => self.copy_to_clipboard(json, "Copied row as JSON"),
            Err(e) => self.status_message = Some(format!("Failed to serialize row: {e}")),
        }
    }

    fn copy_stats_json(&mut self) {
        let Some(overlay) = &self.stats_overlay else {
            return;
        };
        match serde_json::to_string_pretty(&overlay.raw) {
            Ok(json) => {
                self.copy_to_clipboard(json, "Copied statistics as JSON");
                if let Some(overlay) = self.stats_overlay.as_mut() {
                    overlay.copied = true;
                }
            }
            Err(e) => self.status_message = Some(format!("Failed to serialize statistics: {e}")),
        }
    }

    fn copy_to_clipboard(&mut self, text: String, confirmation: &str) {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    warn!("Clipboard unavailable: {e}");
                    self.status_message = Some(format!("Clipboard unavailable: {e}"));
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(text) {
                Ok(()) => {
                    trace!("{confirmation}");
                    self.status_message = Some(confirmation.to_string());
                }
                Err(e) => self.status_message = Some(format!("Copy failed: {e}")),
            }
        }
    }
}

/// Copy of a row without the reserved row-index field, the shape used for
/// every exported representation.
pub fn export_row(row: &Row) -> Row {
    let mut out = row.clone();
    out.remove(protocol::ROW_INDEX_FIELD);
    out
}
