//! The one-line status strip: suspend / diff / bell indicators.

use ratatui::style::Color;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;

use viddy_core::Modes;

pub(crate) const STATUS_WIDTH: u16 = 25;

pub(crate) fn status_line(modes: &Modes) -> Line<'static> {
    Line::from(vec![
        Span::raw("Suspend "),
        indicator(modes.is_suspend),
        Span::raw("  Diff "),
        indicator(modes.is_show_diff),
        Span::raw("  Bell "),
        indicator(modes.is_ring_bell),
    ])
}

fn indicator(on: bool) -> Span<'static> {
    let color = if on { Color::Green } else { Color::Red };
    Span::styled("◯", Style::default().fg(color))
}
