use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Clear, Paragraph},
};

use crate::domain::HELP_TEXT;
use crate::inputter::InputResult;
use crate::model::{Mode, ViewerModel, VisibleColumn};
use crate::protocol::{self, ColumnStats};
use crate::query;

/// Stateless renderer: draws the whole viewer from the model every frame.
/// All geometry comes from the model so mouse hit-testing stays in sync.
pub struct ViewerUi;

impl ViewerUi {
    pub fn new() -> Self {
        Self
    }

    pub fn draw(&self, model: &ViewerModel, frame: &mut Frame) {
        let area = frame.area();
        if area.width < 20 || area.height < 5 {
            frame.render_widget(Paragraph::new("Terminal too small"), area);
            return;
        }

        let mut lines = Vec::with_capacity(area.height as usize);
        let visible = model.visible_columns();
        lines.push(self.filter_row(model, &visible));
        lines.push(self.header_row(model, &visible));
        self.body_rows(model, &visible, &mut lines);
        frame.render_widget(Paragraph::new(Text::from(lines)), area);

        let status_area = Rect::new(area.x, area.y + area.height - 1, area.width, 1);
        frame.render_widget(
            Paragraph::new(self.status_row(model)).style(Style::new().bg(Color::DarkGray)),
            status_area,
        );

        match model.mode() {
            Mode::Stats => self.draw_stats_overlay(model, frame),
            Mode::ValueFilter => self.draw_value_filter_overlay(model, frame),
            Mode::ContextMenu => self.draw_context_menu(model, frame),
            Mode::Help => self.draw_help(model, frame),
            Mode::Table | Mode::FilterEdit => {}
        }
    }

    /// Filter cells, one per visible column. The edited column shows the
    /// live input with a block cursor; stored filters render as active
    /// markers, empty cells show a type-appropriate placeholder.
    fn filter_row<'a>(&self, model: &ViewerModel, visible: &[VisibleColumn]) -> Line<'a> {
        let separator_style = separator_style(model);
        let mut spans = vec![Span::raw(" ".repeat(model.gutter_width()))];
        for col in visible {
            let column = &model.columns[col.idx];
            let editing = model
                .filter_edit
                .as_ref()
                .filter(|e| e.column == col.idx)
                .map(|e| e.input.get());
            match editing {
                Some(input) => spans.extend(input_spans(&input, col.width)),
                None => {
                    if let Some(filter) = model.query.filter(&column.name) {
                        spans.push(Span::styled(
                            fit(&filter.raw, col.width),
                            Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                        ));
                    } else {
                        spans.push(Span::styled(
                            fit(query::filter_placeholder(&column.dtype), col.width),
                            Style::new().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                        ));
                    }
                }
            }
            if col.full {
                spans.push(Span::styled("│", separator_style));
            }
        }
        Line::from(spans)
    }

    /// Header cells: column name, sort indicator, simplified type badge and
    /// the trailing info affordance. The separator doubles as the resize
    /// handle.
    fn header_row<'a>(&self, model: &ViewerModel, visible: &[VisibleColumn]) -> Line<'a> {
        let separator_style = separator_style(model);
        let mut spans = vec![Span::raw(" ".repeat(model.gutter_width()))];
        for col in visible {
            let column = &model.columns[col.idx];
            let sorted = model.query.sort_by.as_deref() == Some(column.name.as_str());
            let indicator = if sorted {
                format!(" {}", model.query.sort_order.indicator())
            } else {
                String::new()
            };
            let badge = query::simplify_type(&column.dtype);
            let badge_len = badge.chars().count();
            let name_style = if col.idx == model.cursor_col {
                Style::new().add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else {
                Style::new().add_modifier(Modifier::BOLD)
            };
            // name+indicator left, type badge and ℹ right-aligned; the ℹ
            // occupies the cell's last column for click targeting. Cells
            // too narrow for the badge show the name alone.
            if col.width >= badge_len + 3 {
                spans.push(Span::styled(
                    fit(
                        &format!("{}{indicator}", column.name),
                        col.width - badge_len - 2,
                    ),
                    name_style,
                ));
                spans.push(Span::styled(
                    format!("{badge} "),
                    Style::new().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                ));
                spans.push(Span::styled("ℹ", Style::new().fg(Color::Blue)));
            } else {
                spans.push(Span::styled(
                    fit(&format!("{}{indicator}", column.name), col.width),
                    name_style,
                ));
            }
            if col.full {
                spans.push(Span::styled("│", separator_style));
            }
        }
        Line::from(spans)
    }

    fn body_rows<'a>(
        &self,
        model: &ViewerModel,
        visible: &[VisibleColumn],
        lines: &mut Vec<Line<'a>>,
    ) {
        let rows = &model.loader.state.rows;
        let gutter = model.gutter_width();
        let max_chars = model.config().max_cell_chars;
        let context_open = model.mode() == Mode::ContextMenu;

        if let Some(error) = &model.init_error {
            lines.push(Line::styled(
                error.clone(),
                Style::new().fg(Color::Red).add_modifier(Modifier::BOLD),
            ));
            return;
        }

        for i in 0..model.body_height() {
            let idx = model.offset_row + i;
            let Some(row) = rows.get(idx) else {
                lines.push(Line::raw(""));
                continue;
            };
            let label = protocol::row_index(row)
                .map(|n| n.to_string())
                .unwrap_or_else(|| (idx + 1).to_string());
            let mut text = format!("{label:>width$} ", width = gutter - 1);
            for col in visible {
                let column = &model.columns[col.idx];
                let value = row
                    .get(&column.name)
                    .map(protocol::cell_text)
                    .unwrap_or_default();
                text.push_str(&fit(&truncate_cell(&value, max_chars), col.width));
                if col.full {
                    text.push(' ');
                }
            }
            // Highlight precedence: pinned context row, then the cursor
            // (suppressed while the context menu is open), then selection.
            let style = if model.context_row == Some(idx) {
                Style::new().bg(Color::Yellow).fg(Color::Black)
            } else if idx == model.cursor_row && !context_open {
                Style::new().add_modifier(Modifier::REVERSED)
            } else if model.selected_row == Some(idx) {
                Style::new().bg(Color::Blue).fg(Color::White)
            } else {
                Style::new()
            };
            lines.push(Line::styled(text, style));
        }
    }

    /// Status bar: unfiltered file facts on the left, match-mode flags in
    /// the middle, load progress and filter affordances on the right.
    fn status_row<'a>(&self, model: &ViewerModel) -> Line<'a> {
        let state = &model.loader.state;
        let left = format!(
            "{} columns • {} rows • {}",
            model.columns.len(),
            state.total_rows_unfiltered,
            format_bytes(state.file_size),
        );
        let flags = format!(
            "case[{}] regex[{}]",
            if model.query.case_insensitive { "i" } else { " " },
            if model.query.use_regex { "r" } else { " " },
        );
        let right = match &model.status_message {
            Some(message) => message.clone(),
            None => {
                let mut text = showing_text(
                    state.rows.len(),
                    state.total_rows_filtered,
                    model.query.filter_count(),
                );
                if model.query.has_filters() {
                    text.push_str(" • C: clear filters");
                }
                text
            }
        };
        let (width, _) = model.viewport();
        let used = left.chars().count() + 2 + flags.chars().count() + right.chars().count();
        let pad = width.saturating_sub(used).max(1);
        Line::from(vec![
            Span::styled(left, Style::new().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(flags, Style::new().fg(Color::Cyan)),
            Span::raw(" ".repeat(pad)),
            Span::raw(right),
        ])
    }

    fn draw_stats_overlay(&self, model: &ViewerModel, frame: &mut Frame) {
        let Some(overlay) = &model.stats_overlay else {
            return;
        };
        let rect = model.overlay_rect();
        frame.render_widget(Clear, rect);
        let mut lines: Vec<Line> = stats_lines(&overlay.stats)
            .into_iter()
            .map(Line::raw)
            .collect();
        lines.push(Line::raw(""));
        let footer = if overlay.copied {
            "Copied!  Esc: close"
        } else {
            "y: copy as JSON  Esc: close"
        };
        lines.push(Line::styled(footer, Style::new().fg(Color::DarkGray)));
        let block = Block::bordered().title(format!(" Column: {} ", overlay.stats.column_name));
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), rect);
    }

    fn draw_value_filter_overlay(&self, model: &ViewerModel, frame: &mut Frame) {
        let Some(overlay) = &model.value_filter else {
            return;
        };
        let rect = model.overlay_rect();
        frame.render_widget(Clear, rect);
        let mut lines = vec![Line::styled(
            "space: toggle  a: all  n: none  Enter: apply  Esc: cancel",
            Style::new().fg(Color::DarkGray),
        )];
        let visible = (rect.height as usize).saturating_sub(6).max(1);
        let end = (overlay.scroll + visible).min(overlay.values.len());
        for idx in overlay.scroll..end {
            let mark = if overlay.checked[idx] { "x" } else { " " };
            let count = overlay
                .counts
                .get(idx)
                .map(|c| format!(" ({})", format_number(*c)))
                .unwrap_or_default();
            let text = format!("[{mark}] {}{count}", overlay.values[idx]);
            let style = if idx == overlay.cursor {
                Style::new().add_modifier(Modifier::REVERSED)
            } else {
                Style::new()
            };
            lines.push(Line::styled(text, style));
        }
        if overlay.values.len() < overlay.total_count as usize {
            lines.push(Line::styled(
                format!(
                    "showing first {} of {} values",
                    overlay.values.len(),
                    format_number(overlay.total_count)
                ),
                Style::new().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ));
        }
        let block = Block::bordered().title(format!(" Filter {} by values ", overlay.column));
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), rect);
    }

    fn draw_context_menu(&self, model: &ViewerModel, frame: &mut Frame) {
        let rect = model.menu_rect();
        frame.render_widget(Clear, rect);
        let line = Line::styled(
            " Copy row as JSON ",
            Style::new().add_modifier(Modifier::REVERSED),
        );
        frame.render_widget(
            Paragraph::new(line).block(Block::bordered().title(" Row ")),
            rect,
        );
    }

    fn draw_help(&self, model: &ViewerModel, frame: &mut Frame) {
        let rect = model.overlay_rect();
        frame.render_widget(Clear, rect);
        frame.render_widget(
            Paragraph::new(HELP_TEXT).block(Block::bordered().title(" Help ")),
            rect,
        );
    }
}

/// Column separators double as resize handles; highlighted while a drag
/// is active.
fn separator_style(model: &ViewerModel) -> Style {
    if model.resizing() {
        Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::new().fg(Color::DarkGray)
    }
}

/// Live filter input as spans with a block cursor, scrolled so the cursor
/// stays visible inside the cell.
fn input_spans<'a>(input: &InputResult, width: usize) -> Vec<Span<'a>> {
    let chars: Vec<char> = input.input.chars().collect();
    let start = input.cursor_pos.saturating_sub(width.saturating_sub(1));
    let before: String = chars[start..input.cursor_pos.min(chars.len())].iter().collect();
    let cursor_char = chars
        .get(input.cursor_pos)
        .copied()
        .unwrap_or(' ')
        .to_string();
    let after_start = (input.cursor_pos + 1).min(chars.len());
    let shown = before.chars().count() + 1;
    let after: String = chars[after_start..]
        .iter()
        .take(width.saturating_sub(shown))
        .collect();
    let pad = width.saturating_sub(shown + after.chars().count());
    let edit_style = Style::new().fg(Color::Yellow);
    vec![
        Span::styled(before, edit_style),
        Span::styled(cursor_char, edit_style.add_modifier(Modifier::REVERSED)),
        Span::styled(format!("{after}{}", " ".repeat(pad)), edit_style),
    ]
}

/// Clip to `width` chars, padding with spaces on the right.
fn fit(s: &str, width: usize) -> String {
    let mut out: String = s.chars().take(width).collect();
    let len = out.chars().count();
    out.extend(std::iter::repeat_n(' ', width - len));
    out
}

/// Truncate cell text to a maximum char count with an ellipsis marker.
/// A limit of zero disables truncation.
pub fn truncate_cell(s: &str, limit: usize) -> String {
    if limit == 0 || s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit).collect();
    out.push('…');
    out
}

/// Right-hand status text: rows fetched so far versus the filtered total.
fn showing_text(fetched: usize, total: usize, filter_count: usize) -> String {
    let mut text = format!("Showing {fetched} of {total} rows");
    if filter_count > 0 {
        text.push_str(&format!(
            " ({filter_count} filter{} active)",
            if filter_count > 1 { "s" } else { "" }
        ));
    }
    text
}

/// Human-readable byte size.
fn format_bytes(n: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;
    if n >= TB {
        format!("{:.2} TB", n as f64 / TB as f64)
    } else if n >= GB {
        format!("{:.2} GB", n as f64 / GB as f64)
    } else if n >= MB {
        format!("{:.2} MB", n as f64 / MB as f64)
    } else if n >= KB {
        format!("{:.2} KB", n as f64 / KB as f64)
    } else {
        format!("{n} B")
    }
}

/// Integer with thousands separators.
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn format_float(x: f64) -> String {
    format!("{x:.2}")
}

/// Flatten a stats record into the overlay's display lines: the common
/// summary first, then the section matching the column type.
fn stats_lines(stats: &ColumnStats) -> Vec<String> {
    let mut lines = vec![
        format!("Type: {}", stats.data_type),
        String::new(),
        "Data Summary".to_string(),
        format!("  Total rows: {}", format_number(stats.total_rows)),
        format!(
            "  Non-null: {} ({}%)",
            format_number(stats.non_null_count),
            stats.non_null_percentage
        ),
        format!(
            "  Null: {} ({}%)",
            format_number(stats.null_count),
            stats.null_percentage
        ),
        format!(
            "  Unique values: {} ({}%)",
            format_number(stats.unique_count),
            stats.unique_percentage
        ),
    ];

    if stats.data_type == "int" || stats.data_type == "float" {
        let mut section = Vec::new();
        if let Some(min) = stats.min_value {
            section.push(format!("  Min: {}", format_float(min)));
        }
        if let Some(max) = stats.max_value {
            section.push(format!("  Max: {}", format_float(max)));
        }
        if let Some(mean) = stats.mean {
            section.push(format!("  Mean: {}", format_float(mean)));
        }
        if let Some(median) = stats.median {
            section.push(format!("  Median: {}", format_float(median)));
        }
        if let Some(std_dev) = stats.std_dev {
            section.push(format!("  Std Dev: {}", format_float(std_dev)));
        }
        if let Some(count) = stats.outlier_count {
            let pct = stats.outlier_percentage.unwrap_or(0.0);
            section.push(format!(
                "  Outliers (IQR×1.5): {} ({pct}%)",
                format_number(count)
            ));
        }
        if !section.is_empty() {
            lines.push(String::new());
            lines.push("Numeric Statistics".to_string());
            lines.append(&mut section);
        }
    }

    if stats.data_type == "string" {
        let mut section = Vec::new();
        if let Some(value) = &stats.most_common_value {
            let count = stats.most_common_count.unwrap_or(0);
            section.push(format!("  Most common: \"{value}\" ({count})"));
        }
        if let Some(min) = stats.min_length {
            section.push(format!("  Min length: {min} characters"));
        }
        if let Some(max) = stats.max_length {
            section.push(format!("  Max length: {max} characters"));
        }
        if let Some(avg) = stats.avg_length {
            section.push(format!("  Avg length: {} characters", format_float(avg)));
        }
        if !section.is_empty() {
            lines.push(String::new());
            lines.push("String Statistics".to_string());
            lines.append(&mut section);
        }
    }

    if stats.data_type == "date" || stats.data_type == "datetime" {
        let mut section = Vec::new();
        if let Some(earliest) = &stats.earliest_date {
            section.push(format!("  Earliest: {earliest}"));
        }
        if let Some(latest) = &stats.latest_date {
            section.push(format!("  Latest: {latest}"));
        }
        if let Some(days) = stats.date_range_days {
            section.push(format!("  Span: {} days", format_number(days.max(0) as u64)));
        }
        if !section.is_empty() {
            lines.push(String::new());
            lines.push("Date Range".to_string());
            lines.append(&mut section);
        }
    }

    lines
}
