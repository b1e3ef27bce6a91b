use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rfp_assistant::cli::commands;

#[derive(Parser)]
#[command(name = "rfp-assistant")]
#[command(
    version,
    about = "Multi-stage LLM assistant for analyzing RFPs and drafting responses"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize rfp-assistant in the current directory
    Init {
        #[arg(long, short, help = "Overwrite existing initialization")]
        force: bool,
    },

    /// Extract, preprocess and split an RFP into requirements
    Analyze {
        #[arg(help = "RFP document (.txt or .md)")]
        file: PathBuf,
        #[arg(
            short = 'f',
            long,
            default_value = "json",
            help = "Output format: json, text"
        )]
        format: String,
        #[arg(long, short, help = "Write the analysis JSON to this file")]
        output: Option<PathBuf>,
    },

    /// Build queries and draft responses per requirement
    Draft {
        #[arg(help = "RFP document (.txt or .md)")]
        file: PathBuf,
        #[arg(long, help = "Confirm the build queries and generate responses")]
        confirm: bool,
        #[arg(long, short, help = "Clarification session whose answers are used")]
        session_file: Option<PathBuf>,
        #[arg(long, short, help = "Export path (default: .rfp-assistant/responses.json)")]
        output: Option<PathBuf>,
        #[arg(long, help = "Skip quality assessment of each draft")]
        skip_quality: bool,
    },

    /// Clarification questions for the bidder
    Questions {
        #[command(subcommand)]
        action: QuestionsAction,
    },

    /// Manage the reference document index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Inspect stored memories of earlier runs
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum QuestionsAction {
    /// Generate questions for an RFP and save them as a session
    Ask {
        file: PathBuf,
        #[arg(long, short, help = "Session file to create")]
        session_file: Option<PathBuf>,
    },
    /// Record an answer in a session
    Answer {
        #[arg(long, short)]
        session_file: PathBuf,
        question_id: String,
        text: String,
    },
    /// Show a session's questions and answers
    Show {
        #[arg(long, short)]
        session_file: PathBuf,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed every document in the docs folder
    Build {
        #[arg(long, help = "Docs folder override")]
        docs: Option<PathBuf>,
    },
    /// Show index statistics
    Stats {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },
    /// Nearest chunks for a query
    Search {
        query: String,
        #[arg(short, default_value = "5")]
        k: usize,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Related memories for a query
    Search {
        query: String,
        #[arg(long, help = "preprocess, requirements or build_query")]
        stage: Option<String>,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mrfp-assistant encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Analyze {
            file,
            format,
            output,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::analyze::run(&file, &format, output))?;
        }
        Commands::Draft {
            file,
            confirm,
            session_file,
            output,
            skip_quality,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::draft::run(commands::draft::DraftOptions {
                file,
                confirm,
                session_file,
                output,
                skip_quality,
            }))?;
        }
        Commands::Questions { action } => match action {
            QuestionsAction::Ask { file, session_file } => {
                let rt = Runtime::new()?;
                rt.block_on(commands::questions::ask(&file, session_file))?;
            }
            QuestionsAction::Answer {
                session_file,
                question_id,
                text,
            } => {
                commands::questions::answer(&session_file, &question_id, &text)?;
            }
            QuestionsAction::Show { session_file } => {
                commands::questions::show(&session_file)?;
            }
        },
        Commands::Index { action } => match action {
            IndexAction::Build { docs } => {
                let rt = Runtime::new()?;
                rt.block_on(commands::index::build(docs))?;
            }
            IndexAction::Stats { format } => {
                commands::index::stats(&format)?;
            }
            IndexAction::Search { query, k } => {
                let rt = Runtime::new()?;
                rt.block_on(commands::index::search(&query, k))?;
            }
        },
        Commands::Memory { action } => match action {
            MemoryAction::Search {
                query,
                stage,
                limit,
            } => {
                let rt = Runtime::new()?;
                rt.block_on(commands::memory::search(&query, stage.as_deref(), limit))?;
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => {
                commands::config::show(global, &format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project()?;
                }
            }
        },
    }

    Ok(())
}
