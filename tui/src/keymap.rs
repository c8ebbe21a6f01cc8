//! Keystroke grammar and the time-machine keymap.
//!
//! Grammar: optional `Ctrl-`, `Alt-`, `Shift-` prefixes in that fixed order,
//! then a named key or a single character. A lone letter without `Shift-` is
//! lowercased. `Shift-` on a letter uppercases the character and adds no
//! shift modifier bit (the character already carries the case); `Shift-` on a
//! named key adds the modifier bit.

use std::collections::HashMap;

use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyModifiers;
use tracing::warn;

use viddy_core::VidError;
use viddy_core::config::KeymapEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

/// Remappable actions; everything else is a fixed binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    ToggleTimeMachine,
    GoToPast,
    GoToFuture,
    GoToMorePast,
    GoToMoreFuture,
    GoToNow,
    GoToOldest,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::ToggleTimeMachine,
        Action::GoToPast,
        Action::GoToFuture,
        Action::GoToMorePast,
        Action::GoToMoreFuture,
        Action::GoToNow,
        Action::GoToOldest,
    ];

    fn config_key(self) -> &'static str {
        match self {
            Action::ToggleTimeMachine => "toggle_timemachine",
            Action::GoToPast => "timemachine_go_to_past",
            Action::GoToFuture => "timemachine_go_to_future",
            Action::GoToMorePast => "timemachine_go_to_more_past",
            Action::GoToMoreFuture => "timemachine_go_to_more_future",
            Action::GoToNow => "timemachine_go_to_now",
            Action::GoToOldest => "timemachine_go_to_oldest",
        }
    }

    fn default_stroke(self) -> &'static str {
        match self {
            Action::ToggleTimeMachine => " ",
            Action::GoToPast => "Shift-J",
            Action::GoToFuture => "Shift-K",
            Action::GoToMorePast => "Shift-F",
            Action::GoToMoreFuture => "Shift-B",
            Action::GoToNow => "Shift-N",
            Action::GoToOldest => "Shift-O",
        }
    }
}

pub fn parse_key_stroke(input: &str) -> Result<KeyStroke, VidError> {
    if input.is_empty() {
        return Err(VidError::KeyParse(input.to_owned()));
    }

    let mut rest = input;
    let mut modifiers = KeyModifiers::NONE;

    if let Some(stripped) = rest.strip_prefix("Ctrl-") {
        modifiers |= KeyModifiers::CONTROL;
        rest = stripped;
    }
    if let Some(stripped) = rest.strip_prefix("Alt-") {
        modifiers |= KeyModifiers::ALT;
        rest = stripped;
    }

    if let Some(stripped) = rest.strip_prefix("Shift-") {
        if let Some(code) = named_key(stripped) {
            modifiers |= KeyModifiers::SHIFT;
            return Ok(KeyStroke { code, modifiers });
        }

        let c = stripped
            .chars()
            .next()
            .ok_or_else(|| VidError::KeyParse(input.to_owned()))?;
        let c = c.to_uppercase().next().unwrap_or(c);
        return Ok(KeyStroke {
            code: KeyCode::Char(c),
            modifiers,
        });
    }

    if let Some(code) = named_key(rest) {
        return Ok(KeyStroke { code, modifiers });
    }

    let c = rest
        .chars()
        .next()
        .ok_or_else(|| VidError::KeyParse(input.to_owned()))?;
    let c = c.to_lowercase().next().unwrap_or(c);
    Ok(KeyStroke {
        code: KeyCode::Char(c),
        modifiers,
    })
}

fn named_key(name: &str) -> Option<KeyCode> {
    let code = match name {
        "Up" => KeyCode::Up,
        "Down" => KeyCode::Down,
        "Left" => KeyCode::Left,
        "Right" => KeyCode::Right,
        "Enter" => KeyCode::Enter,
        "Esc" | "Escape" => KeyCode::Esc,
        "Tab" => KeyCode::Tab,
        "Backspace" => KeyCode::Backspace,
        "Home" => KeyCode::Home,
        "End" => KeyCode::End,
        "PgUp" | "PageUp" => KeyCode::PageUp,
        "PgDn" | "PageDown" => KeyCode::PageDown,
        "Delete" => KeyCode::Delete,
        "Insert" => KeyCode::Insert,
        _ => {
            let number = name.strip_prefix('F')?.parse::<u8>().ok()?;
            if (1..=12).contains(&number) {
                KeyCode::F(number)
            } else {
                return None;
            }
        }
    };
    Some(code)
}

/// Terminals report Shift+letter as the uppercase character plus the shift
/// bit; bindings carry the case in the character alone, so the bit is
/// dropped for characters before lookup.
pub fn normalize(event: &KeyEvent) -> KeyStroke {
    let mut modifiers =
        event.modifiers & (KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SHIFT);
    if matches!(event.code, KeyCode::Char(_)) {
        modifiers.remove(KeyModifiers::SHIFT);
    }
    KeyStroke {
        code: event.code,
        modifiers,
    }
}

pub fn format_key_stroke(stroke: KeyStroke) -> String {
    let mut out = String::new();
    if stroke.modifiers.contains(KeyModifiers::CONTROL) {
        out.push_str("Ctrl-");
    }
    if stroke.modifiers.contains(KeyModifiers::ALT) {
        out.push_str("Alt-");
    }
    if stroke.modifiers.contains(KeyModifiers::SHIFT) {
        out.push_str("Shift-");
    }
    match stroke.code {
        KeyCode::Char(' ') => out.push_str("SPACE"),
        KeyCode::Char(c) => out.push(c),
        KeyCode::F(n) => {
            out.push('F');
            out.push_str(&n.to_string());
        }
        code => out.push_str(&format!("{code:?}")),
    }
    out
}

#[derive(Clone, Debug)]
pub struct Keymap {
    bindings: HashMap<Action, Vec<KeyStroke>>,
}

impl Default for Keymap {
    fn default() -> Self {
        Self::from_config(&HashMap::new())
    }
}

impl Keymap {
    /// Build the keymap from `[keymap]`. A binding that fails to parse falls
    /// back to the action's default and is logged; it never aborts startup.
    pub fn from_config(config: &HashMap<String, KeymapEntry>) -> Self {
        let mut bindings = HashMap::new();

        for action in Action::ALL {
            let default = parse_default(action.default_stroke());

            let strokes = match config.get(action.config_key()) {
                Some(entry) => {
                    let parsed: Result<Vec<KeyStroke>, VidError> =
                        entry.strokes().map(parse_key_stroke).collect();
                    match parsed {
                        Ok(strokes) if !strokes.is_empty() => strokes,
                        Ok(_) => default,
                        Err(err) => {
                            warn!(action = action.config_key(), %err, "falling back to default binding");
                            default
                        }
                    }
                }
                None => default,
            };

            bindings.insert(action, strokes);
        }

        Self { bindings }
    }

    /// Every action bound to this keystroke. Conflicting bindings all fire.
    pub fn actions_for(&self, stroke: KeyStroke) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| {
                self.bindings
                    .get(action)
                    .is_some_and(|strokes| strokes.contains(&stroke))
            })
            .collect()
    }

    pub fn strokes_for(&self, action: Action) -> &[KeyStroke] {
        self.bindings.get(&action).map_or(&[], Vec::as_slice)
    }

    /// Comma-joined display form for the help view.
    pub fn display_for(&self, action: Action) -> String {
        self.strokes_for(action)
            .iter()
            .map(|stroke| format_key_stroke(*stroke))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn parse_default(stroke: &str) -> Vec<KeyStroke> {
    match parse_key_stroke(stroke) {
        Ok(stroke) => vec![stroke],
        Err(_) => Vec::new(),
    }
}
