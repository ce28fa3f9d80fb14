use std::path::PathBuf;

use clap::{Parser, Subcommand};
use datahub_sheets::config::{DATA_DIR_ENV, DEFAULT_DATA_DIR, Settings};
use datahub_sheets::io::authored::parse_authored;
use datahub_sheets::merge::MergeRequest;
use datahub_sheets::pipeline;
use datahub_sheets::{Result, SheetError};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.log_level)?;
    let settings = Settings::new(cli.data_dir);

    match cli.command {
        Command::Save(args) => {
            let authored = parse_authored(&load_json(&args.input)?)?;
            let mut location = settings.location(&args.project.project)?;
            print_json(&pipeline::save_authored(&mut location, &authored)?)
        }
        Command::Load(args) => {
            let location = settings.location(&args.project.project)?;
            let loaded = pipeline::load_workbook(&location)?;
            match args.output {
                Some(output) => {
                    std::fs::write(&output, serde_json::to_string_pretty(&loaded)?)?;
                    Ok(())
                }
                None => print_json(&loaded),
            }
        }
        Command::Merge(args) => {
            let request: MergeRequest = serde_json::from_value(load_json(&args.request)?)?;
            let mut location = settings.location(&args.project.project)?;
            print_json(&pipeline::merge_tables(&mut location, &request)?)
        }
        Command::Import(args) => {
            let mut location = settings.location(&args.project.project)?;
            print_json(&pipeline::import_sheets(&mut location, &args.input)?)
        }
        Command::Sheets(args) => {
            let location = settings.location(&args.project)?;
            print_json(&pipeline::list_sheets(&location)?)
        }
    }
}

fn init_logging(fallback: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .map_err(|error| SheetError::Logging(error.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| SheetError::Logging(error.to_string()))
}

fn load_json(path: &PathBuf) -> Result<Value> {
    if !path.exists() {
        return Err(SheetError::MissingInput(path.clone()));
    }
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Store, merge and import project workbooks."
)]
struct Cli {
    /// Root directory holding one sub-directory per project.
    #[arg(long, global = true, env = DATA_DIR_ENV, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an authored JSON workbook as the project's workbook.
    Save(SaveArgs),
    /// Print the project's workbook in the authored JSON shape.
    Load(LoadArgs),
    /// Merge source tables into a target table and save the result.
    Merge(MergeArgs),
    /// Append every sheet of another workbook to the project's workbook.
    Import(ImportArgs),
    /// List the sheets of the project's workbook.
    Sheets(ProjectArgs),
}

#[derive(clap::Args)]
struct ProjectArgs {
    /// Project identifier.
    #[arg(long)]
    project: String,
}

#[derive(clap::Args)]
struct SaveArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Authored workbook JSON file.
    #[arg(long)]
    input: PathBuf,
}

#[derive(clap::Args)]
struct LoadArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Write the JSON here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct MergeArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Merge request JSON file.
    #[arg(long)]
    request: PathBuf,
}

#[derive(clap::Args)]
struct ImportArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Workbook whose sheets are appended.
    #[arg(long)]
    input: PathBuf,
}
