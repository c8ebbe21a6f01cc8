use clap::ArgAction;
use clap::Parser;

use viddy_core::IntervalMode;
use viddy_core::config::ConfigOverrides;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "viddy",
    version,
    disable_version_flag = true,
    about = "A modern watch command: re-run a command on an interval and time-travel through its output"
)]
pub struct Cli {
    /// Seconds to wait between updates; accepts durations like "500ms" or
    /// bare decimal seconds
    #[arg(
        short = 'n',
        long = "interval",
        value_name = "INTERVAL",
        default_value = "2s"
    )]
    pub interval: String,

    /// Attempt to run the command in precise intervals
    #[arg(short = 'p', long = "precise")]
    pub precise: bool,

    /// Run the command on fixed wall-clock ticks, even while runs overlap
    #[arg(short = 'c', long = "clockwork", conflicts_with = "precise")]
    pub clockwork: bool,

    /// Highlight changes between updates
    #[arg(short = 'd', long = "differences")]
    pub differences: bool,

    /// Turn off the header
    #[arg(short = 't', long = "no-title")]
    pub no_title: bool,

    /// Ring the terminal bell when the output changes
    #[arg(short = 'b', long = "bell")]
    pub bell: bool,

    /// Hide snapshots with no changes from the history table
    #[arg(short = 's', long = "skip-empty-diffs")]
    pub skip_empty_diffs: bool,

    /// Shell executable
    #[arg(long = "shell", value_name = "SHELL")]
    pub shell: Option<String>,

    /// Additional shell options placed before -c
    #[arg(long = "shell-options", value_name = "OPTS")]
    pub shell_options: Option<String>,

    /// Turn off line wrapping in the body
    #[arg(long = "unfold")]
    pub unfold: bool,

    /// Run the command on a pseudo-terminal
    #[arg(long = "pty")]
    pub pty: bool,

    /// Enable the debug log view
    #[arg(long = "debug")]
    pub debug: bool,

    /// Output version information and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Command to run
    #[arg(
        value_name = "COMMAND",
        num_args = 0..,
        allow_hyphen_values = true,
        trailing_var_arg = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    pub fn into_overrides(self) -> ConfigOverrides {
        let mode = if self.clockwork {
            Some(IntervalMode::Clockwork)
        } else if self.precise {
            Some(IntervalMode::Precise)
        } else {
            None
        };

        ConfigOverrides {
            interval: Some(self.interval),
            mode,
            shell: self.shell,
            shell_options: self.shell_options,
            debug: self.debug,
            bell: self.bell,
            differences: self.differences,
            no_title: self.no_title,
            unfold: self.unfold,
            pty: self.pty,
            skip_empty_diffs: self.skip_empty_diffs,
            command: self.command,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).expect("valid arguments")
    }

    #[test]
    fn defaults() {
        let cli = parse(&["viddy", "ls"]);
        assert_eq!(cli.interval, "2s");
        assert!(!cli.precise);
        assert!(!cli.clockwork);
        assert_eq!(cli.command, vec!["ls".to_owned()]);
    }

    #[test]
    fn trailing_command_keeps_its_own_flags() {
        let cli = parse(&["viddy", "-n", "1s", "ls", "-l", "--color=auto"]);
        assert_eq!(cli.interval, "1s");
        assert_eq!(
            cli.command,
            vec!["ls".to_owned(), "-l".to_owned(), "--color=auto".to_owned()]
        );
    }

    #[test]
    fn mode_flags_map_to_interval_modes() {
        let cli = parse(&["viddy", "-p", "date"]);
        assert_eq!(cli.into_overrides().mode, Some(IntervalMode::Precise));

        let cli = parse(&["viddy", "-c", "date"]);
        assert_eq!(cli.into_overrides().mode, Some(IntervalMode::Clockwork));

        let cli = parse(&["viddy", "date"]);
        assert_eq!(cli.into_overrides().mode, None);
    }

    #[test]
    fn precise_and_clockwork_conflict() {
        assert!(Cli::try_parse_from(["viddy", "-p", "-c", "date"]).is_err());
    }

    #[test]
    fn shell_and_toggles_flow_into_overrides() {
        let cli = parse(&[
            "viddy",
            "-d",
            "-b",
            "-t",
            "--shell",
            "bash",
            "--shell-options",
            "-e",
            "--pty",
            "--unfold",
            "--",
            "sh",
            "-c",
            "date +%S",
        ]);
        let overrides = cli.into_overrides();
        assert!(overrides.differences);
        assert!(overrides.bell);
        assert!(overrides.no_title);
        assert!(overrides.pty);
        assert!(overrides.unfold);
        assert_eq!(overrides.shell.as_deref(), Some("bash"));
        assert_eq!(overrides.shell_options.as_deref(), Some("-e"));
        assert_eq!(
            overrides.command,
            vec!["sh".to_owned(), "-c".to_owned(), "date +%S".to_owned()]
        );
    }
}
