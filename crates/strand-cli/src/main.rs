//! Strand command-line driver
//!
//! Reads a compilation unit (JSON) and an optional `strand.toml`, runs the
//! backend and writes the rendered text with its side channels.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Structured-code backend for cooperative runtimes", long_about = None)]
#[command(version)]
struct Cli {
    /// Log backend passes (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Colored output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a unit to target source
    Compile {
        /// Unit file (JSON)
        input: PathBuf,
        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output file; defaults to the input with a `.js` extension
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Shorten names and drop whitespace
        #[arg(long)]
        minify: bool,
        /// Print the input IR before compiling
        #[arg(long)]
        dump_ir: bool,
    },

    /// List the methods that may suspend
    Analyze {
        /// Unit file (JSON)
        input: PathBuf,
        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run a method of a unit on the reference evaluator
    Eval {
        /// Unit file (JSON)
        input: PathBuf,
        /// Method as `class.name(descriptor)`
        method: String,
        /// Integer arguments
        #[arg(allow_negative_numbers = true)]
        args: Vec<i32>,
        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Make every intrinsic suspend once before returning
        #[arg(long)]
        suspend: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "strand_backend=debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut out = output::StyledOutput::new(output::resolve_color_choice(cli.color.as_deref()));

    let result = match cli.command {
        Commands::Compile {
            input,
            config,
            output,
            minify,
            dump_ir,
        } => commands::compile::execute(
            &mut out,
            commands::compile::CompileOptions {
                input,
                config,
                output,
                minify,
                dump_ir,
            },
        ),
        Commands::Analyze { input, config } => commands::analyze::execute(&mut out, &input, config.as_deref()),
        Commands::Eval {
            input,
            method,
            args,
            config,
            suspend,
        } => commands::eval::execute(&mut out, &input, &method, args, config.as_deref(), suspend),
    };

    if let Err(err) = result {
        out.error(&format!("{:#}", err));
        std::process::exit(1);
    }
    Ok(())
}
