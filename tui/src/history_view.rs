//! The history table: one row per snapshot, newest first, with id, addition
//! and deletion counts, and the exit cell for failed runs.

use ratatui::layout::Constraint;
use ratatui::style::Color;
use ratatui::style::Style;
use ratatui::widgets::Block;
use ratatui::widgets::Borders;
use ratatui::widgets::Cell;
use ratatui::widgets::Row;
use ratatui::widgets::Table;

use viddy_core::controller::HistoryRow;

use crate::theme::Theme;

pub(crate) const HISTORY_PANE_WIDTH: u16 = 21;

pub(crate) fn history_table(rows: &[HistoryRow], theme: &Theme) -> Table<'static> {
    let rows: Vec<Row<'static>> = rows.iter().map(|row| table_row(row, theme)).collect();

    Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(6),
        ],
    )
    .column_spacing(1)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title("History")
            .title_style(Style::default().fg(theme.title)),
    )
    .row_highlight_style(Style::default().bg(Color::Gray))
}

fn table_row(row: &HistoryRow, theme: &Theme) -> Row<'static> {
    // Pending ids are dimmed until the runner reports completion.
    let id_style = if row.completed {
        Style::default().fg(theme.text)
    } else {
        Style::default().fg(theme.secondary_text)
    };

    let addition = row
        .additions
        .map(|count| format!("+{count}"))
        .unwrap_or_default();
    let deletion = row
        .deletions
        .map(|count| format!("-{count}"))
        .unwrap_or_default();
    let exit = row
        .exit_code
        .map(|code| format!("E({code})"))
        .unwrap_or_default();

    Row::new(vec![
        Cell::from(row.id.to_string()).style(id_style),
        Cell::from(addition).style(Style::default().fg(Color::Green)),
        Cell::from(deletion).style(Style::default().fg(Color::Red)),
        Cell::from(exit).style(Style::default().fg(Color::Yellow)),
    ])
}
