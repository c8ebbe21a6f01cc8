use clap::Parser;

use viddy_tui::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Argument errors exit 1; --help and --version print to stdout and
    // exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    viddy_tui::run_main(cli).await
}
