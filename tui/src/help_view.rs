//! The full-screen help page, rendered from the active keymap so remapped
//! bindings show their real keys.

use ratatui::style::Color;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::text::Text;

use crate::keymap::Action;
use crate::keymap::Keymap;

pub(crate) fn help_text(keymap: &Keymap) -> Text<'static> {
    let mut lines = vec![
        Line::raw("Press ESC or q to go back"),
        Line::raw(""),
        heading(" Key Bindings"),
        Line::raw(""),
        section("   General"),
        Line::raw(""),
        entry(
            "Toggle time machine mode ",
            keymap.display_for(Action::ToggleTimeMachine),
        ),
        entry("Toggle suspend execution ", "s".to_owned()),
        entry("Toggle ring terminal bell", "b".to_owned()),
        entry("Toggle diff              ", "d".to_owned()),
        entry("Toggle header display    ", "t".to_owned()),
        entry("Toggle help view         ", "?".to_owned()),
        entry("Toggle unfold            ", "u".to_owned()),
        entry("Quit Viddy               ", "Q".to_owned()),
        Line::raw(""),
        section("   Pager"),
        Line::raw(""),
        entry("Search text              ", "/".to_owned()),
        entry("Move to next line        ", "j".to_owned()),
        entry("Move to previous line    ", "k".to_owned()),
        entry("Page down                ", "Ctrl-F".to_owned()),
        entry("Page up                  ", "Ctrl-B".to_owned()),
        entry("Go to top of page        ", "g".to_owned()),
        entry("Go to bottom of page     ", "G".to_owned()),
        Line::raw(""),
        section("   Time machine"),
        Line::raw(""),
    ];

    lines.extend([
        entry(
            "Go to the past           ",
            keymap.display_for(Action::GoToPast),
        ),
        entry(
            "Back to the future       ",
            keymap.display_for(Action::GoToFuture),
        ),
        entry(
            "Go to more past          ",
            keymap.display_for(Action::GoToMorePast),
        ),
        entry(
            "Back to more future      ",
            keymap.display_for(Action::GoToMoreFuture),
        ),
        entry(
            "Go to oldest position    ",
            keymap.display_for(Action::GoToOldest),
        ),
        entry(
            "Back to current position ",
            keymap.display_for(Action::GoToNow),
        ),
    ]);

    Text::from(lines)
}

fn heading(text: &str) -> Line<'static> {
    Line::styled(text.to_owned(), Style::default().add_modifier(Modifier::BOLD))
}

fn section(text: &str) -> Line<'static> {
    Line::styled(
        text.to_owned(),
        Style::default().add_modifier(Modifier::UNDERLINED),
    )
}

fn entry(label: &str, keys: String) -> Line<'static> {
    Line::from(vec![
        Span::raw(format!("   {label} : ")),
        Span::styled(keys, Style::default().fg(Color::Yellow)),
    ])
}
