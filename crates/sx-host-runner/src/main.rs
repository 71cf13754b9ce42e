use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use sx_engine::EngineOptions;

#[derive(Parser)]
#[command(name = "sx-host-runner")]
#[command(about = "Deterministic fixture-backed script runner.", long_about = None)]
struct Cli {
    /// Script body file to run.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Fixture file supplying capability replies.
    #[arg(long)]
    fixture: Option<PathBuf>,

    #[arg(long, default_value_t = 5_000_000)]
    fuel: u64,

    #[arg(long, default_value_t = 5_000)]
    deadline_ms: u64,

    #[arg(long, default_value_t = 64)]
    max_call_depth: usize,

    /// Print the language identifier and exit.
    #[arg(long)]
    lang_id: bool,

    /// Print the script authoring guide and exit.
    #[arg(long)]
    guide: bool,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();

    if cli.lang_id {
        println!("{}", sx_engine::language::LANG_ID);
        return Ok(std::process::ExitCode::SUCCESS);
    }
    if cli.guide {
        print!("{}", sx_engine::guide::guide_md());
        return Ok(std::process::ExitCode::SUCCESS);
    }

    let Some(script) = &cli.script else {
        anyhow::bail!("set --script (or --lang-id / --guide)");
    };

    let options = EngineOptions {
        fuel: cli.fuel,
        deadline: Duration::from_millis(cli.deadline_ms),
        max_call_depth: cli.max_call_depth,
        ..EngineOptions::default()
    };
    let report = sx_host_runner::run_script_file(script, cli.fixture.as_deref(), &options)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    let exit_code: u8 = if report.outcome.success { 0 } else { 1 };
    Ok(std::process::ExitCode::from(exit_code))
}
