//! tinyevm CLI Application
//!
//! A command-line interface for assembling, deploying and calling contracts.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tinyevm::cli::{self, AppState};
use tinyevm::config::EngineConfig;

#[derive(Parser)]
#[command(name = "tinyevm")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A small EVM-compatible bytecode engine", long_about = None)]
struct Cli {
    /// Initial-states JSON file, loaded at start and rewritten after changes
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Instruction budget for each deploy or call
    #[arg(long)]
    step_limit: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a source file into hex bytecode
    Asm {
        /// Source file (.asm)
        file: PathBuf,

        /// Wrap the output in a loader so it can be deployed as-is
        #[arg(short, long)]
        deployable: bool,
    },

    /// Disassemble hex bytecode or an .asm file
    Disasm {
        /// Hex bytecode or path to a .asm file
        code: String,
    },

    /// Deploy init code
    Deploy {
        /// Hex init code or path to a .asm file
        #[arg(short, long)]
        code: String,

        /// Deploying account
        #[arg(short, long)]
        owner: String,
    },

    /// Call a contract
    Call {
        /// Contract address
        #[arg(short, long)]
        target: String,

        /// Calling account
        #[arg(short = 'f', long)]
        caller: String,

        /// Hex calldata
        #[arg(short, long, default_value = "")]
        data: String,

        /// Value to transfer, decimal or 0x hex
        #[arg(short, long, default_value = "0")]
        value: String,
    },

    /// Show an account
    Account {
        /// Account address
        address: String,
    },

    /// Print the whole state as initial-states JSON
    State,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match cli.step_limit {
        Some(limit) => EngineConfig::with_step_limit(limit),
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Asm { file, deployable } => {
            cli::cmd_asm(&file, deployable)?;
        }

        Commands::Disasm { code } => {
            cli::cmd_disasm(&code)?;
        }

        Commands::Deploy { code, owner } => {
            let state = AppState::new(cli.state, config)?;
            cli::cmd_deploy(&state, &code, &owner)?;
        }

        Commands::Call {
            target,
            caller,
            data,
            value,
        } => {
            let state = AppState::new(cli.state, config)?;
            cli::cmd_call(&state, &target, &caller, &data, &value)?;
        }

        Commands::Account { address } => {
            let state = AppState::new(cli.state, config)?;
            cli::cmd_account(&state, &address)?;
        }

        Commands::State => {
            let state = AppState::new(cli.state, config)?;
            cli::cmd_state(&state)?;
        }
    }

    Ok(())
}
