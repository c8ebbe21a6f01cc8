//! The pager body: the engine hands over ANSI-annotated bytes, the widget
//! layer turns them into styled text.

use ansi_to_tui::IntoText;
use ratatui::text::Text;

pub(crate) fn text_from_ansi(bytes: &[u8]) -> Text<'static> {
    match bytes.into_text() {
        Ok(text) => text,
        // Malformed escapes degrade to plain text instead of a blank body.
        Err(_) => Text::raw(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use ratatui::style::Color;

    use super::*;

    #[test]
    fn plain_bytes_stay_plain() {
        let text = text_from_ansi(b"hello\nworld\n");
        assert_eq!(text.lines.len(), 2);
        assert_eq!(text.lines[0].spans[0].content, "hello");
    }

    #[test]
    fn ansi_regions_become_styles() {
        let text = text_from_ansi(b"\x1b[31mboom\x1b[0m");
        let span = &text.lines[0].spans[0];
        assert_eq!(span.content, "boom");
        assert_eq!(span.style.fg, Some(Color::Red));
    }
}
