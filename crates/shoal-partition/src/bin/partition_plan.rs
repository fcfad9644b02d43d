use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use shoal_partition::{plan, LayoutEntry};

#[derive(Debug, Parser)]
#[command(name = "partition-plan", about = "Render the sgdisk/mkfs command sequence for a disk layout", version)]
struct Cli {
    /// Target disk device, e.g. /dev/nvme0n1.
    #[arg(long)]
    disk: String,

    /// Path to a JSON file containing the layout array.
    #[arg(long)]
    layout: PathBuf,

    #[arg(long, value_enum, default_value = "shell")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Shell,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let contents = match std::fs::read_to_string(&cli.layout) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: reading {}: {e}", cli.layout.display());
            return ExitCode::FAILURE;
        }
    };
    let layout: Vec<LayoutEntry> = match serde_json::from_str(&contents) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: parsing layout: {e}");
            return ExitCode::FAILURE;
        }
    };

    match plan(&cli.disk, &layout) {
        Ok(commands) => {
            match cli.output {
                OutputFormat::Shell => {
                    for command in &commands {
                        println!("{}", command.to_shell_line());
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&commands).unwrap());
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
