//! Semantic colors resolved from the `[color]` config section.

use std::str::FromStr;

use ratatui::style::Color;
use tracing::warn;

use viddy_core::config::ColorToml;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Theme {
    pub background: Color,
    pub contrast_background: Color,
    pub more_contrast_background: Color,
    pub border: Color,
    pub title: Color,
    pub graphics: Color,
    pub text: Color,
    pub secondary_text: Color,
    pub tertiary_text: Color,
    pub inverse_text: Color,
    pub contrast_secondary_text: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::from_config(&ColorToml::default())
    }
}

impl Theme {
    pub fn from_config(color: &ColorToml) -> Self {
        Self {
            background: resolve(&color.background, Color::Reset),
            contrast_background: resolve(&color.contrast_background, Color::Reset),
            more_contrast_background: resolve(&color.more_contrast_background, Color::Reset),
            border: resolve(&color.border, Color::Gray),
            title: resolve(&color.title, Color::Gray),
            graphics: resolve(&color.graphics, Color::Reset),
            text: resolve(&color.text, Color::Reset),
            secondary_text: resolve(&color.secondary_text, Color::DarkGray),
            tertiary_text: resolve(&color.tertiary_text, Color::Reset),
            inverse_text: resolve(&color.inverse_text, Color::Reset),
            contrast_secondary_text: resolve(&color.contrast_secondary_text, Color::Reset),
        }
    }
}

fn resolve(value: &Option<String>, default: Color) -> Color {
    match value.as_deref() {
        Some(name) => match Color::from_str(name) {
            Ok(color) => color,
            Err(_) => {
                warn!(name, "unknown color name, keeping default");
                default
            }
        },
        None => default,
    }
}
