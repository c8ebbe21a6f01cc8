//! Configuration: the `viddy.toml` file model, interval parsing, and the
//! merge of file values with CLI overrides into the runtime [`Config`].
//!
//! A missing config file is not an error; an unreadable one is fatal at
//! startup. Keymap and color values stay as raw strings here — the UI layer
//! owns their interpretation.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::error::VidError;
use crate::scheduler::IntervalMode;

pub const CONFIG_FILE_NAME: &str = "viddy.toml";

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Raw deserialization of `viddy.toml`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConfigToml {
    #[serde(default)]
    pub general: GeneralToml,
    #[serde(default)]
    pub color: ColorToml,
    #[serde(default)]
    pub keymap: HashMap<String, KeymapEntry>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GeneralToml {
    pub shell: Option<String>,
    pub shell_options: Option<String>,
    pub debug: Option<bool>,
    pub bell: Option<bool>,
    pub differences: Option<bool>,
    pub no_title: Option<bool>,
    pub unfold: Option<bool>,
    pub pty: Option<bool>,
    pub skip_empty_diffs: Option<bool>,
}

/// Semantic color names; values are parsed by the widget library.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ColorToml {
    pub background: Option<String>,
    pub contrast_background: Option<String>,
    pub more_contrast_background: Option<String>,
    pub border: Option<String>,
    pub title: Option<String>,
    pub graphics: Option<String>,
    pub text: Option<String>,
    pub secondary_text: Option<String>,
    pub tertiary_text: Option<String>,
    pub inverse_text: Option<String>,
    pub contrast_secondary_text: Option<String>,
}

/// A keymap action maps to one keystroke or a list of them.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum KeymapEntry {
    Single(String),
    Multiple(Vec<String>),
}

impl KeymapEntry {
    pub fn strokes(&self) -> impl Iterator<Item = &str> {
        match self {
            KeymapEntry::Single(stroke) => std::slice::from_ref(stroke).iter(),
            KeymapEntry::Multiple(strokes) => strokes.iter(),
        }
        .map(String::as_str)
    }
}

/// Resolved runtime configuration after merging file and CLI values.
#[derive(Clone, Debug)]
pub struct Config {
    pub command: String,
    pub args: Vec<String>,
    pub interval: Duration,
    pub mode: IntervalMode,
    pub general: General,
    pub color: ColorToml,
    pub keymap: HashMap<String, KeymapEntry>,
}

#[derive(Clone, Debug)]
pub struct General {
    pub shell: String,
    pub shell_options: String,
    pub debug: bool,
    pub bell: bool,
    pub differences: bool,
    pub no_title: bool,
    pub unfold: bool,
    pub pty: bool,
    pub skip_empty_diffs: bool,
}

/// CLI-provided values; boolean flags turn a setting on, they never turn a
/// config-file setting off.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub interval: Option<String>,
    pub mode: Option<IntervalMode>,
    pub shell: Option<String>,
    pub shell_options: Option<String>,
    pub debug: bool,
    pub bell: bool,
    pub differences: bool,
    pub no_title: bool,
    pub unfold: bool,
    pub pty: bool,
    pub skip_empty_diffs: bool,
    pub command: Vec<String>,
}

impl Config {
    pub fn load_with_overrides(file: ConfigToml, overrides: ConfigOverrides) -> Result<Self> {
        let interval = parse_interval(overrides.interval.as_deref().unwrap_or("2s"))?;

        let mut command_line = overrides.command.into_iter();
        let command = command_line.next().ok_or(VidError::NoCommand)?;
        let args: Vec<String> = command_line.collect();

        let general = General {
            shell: overrides
                .shell
                .or(file.general.shell)
                .unwrap_or_else(|| "sh".to_owned()),
            shell_options: overrides
                .shell_options
                .or(file.general.shell_options)
                .unwrap_or_default(),
            debug: overrides.debug || file.general.debug.unwrap_or(false),
            bell: overrides.bell || file.general.bell.unwrap_or(false),
            differences: overrides.differences || file.general.differences.unwrap_or(false),
            no_title: overrides.no_title || file.general.no_title.unwrap_or(false),
            unfold: overrides.unfold || file.general.unfold.unwrap_or(false),
            pty: overrides.pty || file.general.pty.unwrap_or(false),
            skip_empty_diffs: overrides.skip_empty_diffs
                || file.general.skip_empty_diffs.unwrap_or(false),
        };

        Ok(Self {
            command,
            args,
            interval,
            mode: overrides.mode.unwrap_or_default(),
            general,
            color: file.color,
            keymap: file.keymap,
        })
    }
}

/// `"500ms"`, `"2s"`, … via humantime; a bare decimal is seconds, so
/// `"0.5"` is 500 ms. Anything under 10 ms is rejected.
pub fn parse_interval(s: &str) -> Result<Duration> {
    let duration = match humantime::parse_duration(s) {
        Ok(duration) => duration,
        Err(_) => {
            let seconds: f64 = s
                .parse()
                .map_err(|_| VidError::IntervalParse(s.to_owned()))?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(VidError::IntervalParse(s.to_owned()));
            }
            Duration::from_secs_f64(seconds)
        }
    };

    if duration < MIN_INTERVAL {
        return Err(VidError::IntervalTooSmall);
    }

    Ok(duration)
}

/// `viddy.toml` inside the user config directory.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Load the config file, or defaults when none exists.
pub fn load_config_toml() -> Result<ConfigToml> {
    match config_path() {
        Some(path) => load_config_toml_from(&path),
        None => Ok(ConfigToml::default()),
    }
}

pub fn load_config_toml_from(path: &Path) -> Result<ConfigToml> {
    if !path.exists() {
        return Ok(ConfigToml::default());
    }

    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(VidError::ConfigRead)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn interval_accepts_duration_strings() {
        assert_eq!(
            parse_interval("500ms").expect("valid"),
            Duration::from_millis(500)
        );
        assert_eq!(parse_interval("2s").expect("valid"), Duration::from_secs(2));
    }

    #[test]
    fn interval_bare_decimal_is_seconds() {
        assert_eq!(
            parse_interval("0.5").expect("valid"),
            Duration::from_millis(500)
        );
        assert_eq!(parse_interval("1").expect("valid"), Duration::from_secs(1));
    }

    #[test]
    fn interval_boundary_is_ten_milliseconds() {
        assert_eq!(
            parse_interval("10ms").expect("valid"),
            Duration::from_millis(10)
        );
        assert!(matches!(
            parse_interval("9ms"),
            Err(VidError::IntervalTooSmall)
        ));
    }

    #[test]
    fn interval_garbage_is_a_parse_error() {
        assert!(matches!(
            parse_interval("soon"),
            Err(VidError::IntervalParse(_))
        ));
        assert!(matches!(
            parse_interval("-1"),
            Err(VidError::IntervalParse(_))
        ));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load_config_toml_from(&dir.path().join("viddy.toml")).expect("defaults");
        assert!(loaded.general.shell.is_none());
        assert!(loaded.keymap.is_empty());
    }

    #[test]
    fn invalid_toml_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("viddy.toml");
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "general = not toml").expect("write");

        assert!(matches!(
            load_config_toml_from(&path),
            Err(VidError::ConfigRead(_))
        ));
    }

    #[test]
    fn full_file_round_trips() {
        let source = r#"
            [general]
            shell = "zsh"
            shell_options = "--norc"
            differences = true

            [color]
            border = "blue"

            [keymap]
            toggle_timemachine = "Ctrl-t"
            timemachine_go_to_past = ["Shift-J", "Down"]
        "#;
        let parsed: ConfigToml = toml::from_str(source).expect("parse");

        assert_eq!(parsed.general.shell.as_deref(), Some("zsh"));
        assert_eq!(parsed.color.border.as_deref(), Some("blue"));

        let past = parsed
            .keymap
            .get("timemachine_go_to_past")
            .expect("binding");
        let strokes: Vec<&str> = past.strokes().collect();
        assert_eq!(strokes, vec!["Shift-J", "Down"]);
    }

    #[test]
    fn overrides_take_precedence_over_file() {
        let file: ConfigToml = toml::from_str(
            r#"
            [general]
            shell = "zsh"
            bell = true
        "#,
        )
        .expect("parse");

        let config = Config::load_with_overrides(
            file,
            ConfigOverrides {
                shell: Some("bash".to_owned()),
                command: vec!["ls".to_owned(), "-l".to_owned()],
                ..ConfigOverrides::default()
            },
        )
        .expect("config");

        assert_eq!(config.general.shell, "bash");
        assert!(config.general.bell);
        assert_eq!(config.command, "ls");
        assert_eq!(config.args, vec!["-l".to_owned()]);
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.mode, IntervalMode::Sequential);
    }

    #[test]
    fn missing_command_is_fatal() {
        assert!(matches!(
            Config::load_with_overrides(ConfigToml::default(), ConfigOverrides::default()),
            Err(VidError::NoCommand)
        ));
    }
}
