//! ortforge CLI: validate, generate and repair bilingual ORT item batches.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ortforge",
    version,
    about = "Bilingual ORT test item generator and validator"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an item batch (exit code 1 if any item has errors)
    Validate {
        /// Path to a JSON batch file or a directory of batches
        #[arg(long)]
        items: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Also save the JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Generate a balanced batch from template libraries
    Generate {
        /// Path to a .toml template library or directory
        #[arg(long)]
        templates: PathBuf,

        /// Number of items to plan
        #[arg(long)]
        count: usize,

        /// Batch seed (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory (overrides config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Report formats: json, html, sarif, all (comma-separated)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Show the category x difficulty allocation for a batch size
    Plan {
        /// Number of items to plan
        #[arg(long)]
        count: usize,
    },

    /// Patch fields of selected items and re-validate them
    Fix {
        /// JSON batch file to patch
        #[arg(long)]
        items: PathBuf,

        /// Item ids to patch (comma-separated)
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,

        /// Assignments of the form /json/pointer=<json or text>
        #[arg(long = "set", required = true)]
        set: Vec<String>,

        /// Where to write the patched batch (default: overwrite --items)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare two validation reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Exit code 1 if regressions found
        #[arg(long)]
        fail_on_regression: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create a starter config and template library
    Init,
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ortforge=info,ortforge_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Validate {
            items,
            format,
            report,
        } => commands::validate::execute(items, format, report, config),
        Commands::Generate {
            templates,
            count,
            seed,
            output,
            format,
        } => commands::generate::execute(templates, count, seed, output, format, config),
        Commands::Plan { count } => commands::plan::execute(count, config),
        Commands::Fix {
            items,
            ids,
            set,
            output,
        } => commands::fix::execute(items, ids, set, output, config),
        Commands::Compare {
            baseline,
            current,
            fail_on_regression,
            format,
        } => commands::compare::execute(baseline, current, fail_on_regression, format),
        Commands::Init => commands::init::execute(),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}
