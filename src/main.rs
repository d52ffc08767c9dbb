// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use handelsregister::cli;
use handelsregister::model::KeywordMatch;

#[derive(Parser)]
#[command(
    name = "handelsregister",
    about = "Search the German company register and fetch company documents",
    version,
    after_help = "Run 'handelsregister <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Bypass the results-page cache
    #[arg(long, short, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search companies by keywords
    Search {
        /// Keywords to search for (e.g. "deutsche bahn ag")
        keywords: String,
        /// How the keywords must match
        #[arg(long, value_enum, default_value = "all")]
        mode: KeywordMatch,
    },
    /// Fetch one company by register number, with its document list
    Fetch {
        /// Register number (e.g. "HRB 44343 B")
        register_number: String,
        /// Company name, to disambiguate between register courts
        #[arg(long)]
        name: Option<String>,
        /// Also retrieve the newest shareholder-list document
        #[arg(long)]
        with_shareholder_list: bool,
    },
    /// Manage the results-page cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove all cached results pages
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Publish global flags via environment variables so all modules can
    // check them
    if cli.json {
        std::env::set_var("HANDELSREGISTER_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("HANDELSREGISTER_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("HANDELSREGISTER_VERBOSE", "1");
    }

    let default_level = if cli.verbose {
        "handelsregister=debug"
    } else {
        "handelsregister=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Search { keywords, mode } => {
            cli::search_cmd::run(&keywords, mode, cli.force).await
        }
        Commands::Fetch {
            register_number,
            name,
            with_shareholder_list,
        } => {
            cli::fetch_cmd::run(
                &register_number,
                name.as_deref(),
                with_shareholder_list,
                cli.force,
            )
            .await
        }
        Commands::Cache { action } => match action {
            CacheAction::Clear => cli::cache_cmd::run_clear().await,
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "handelsregister", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success (including zero matches), 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
