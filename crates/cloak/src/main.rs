mod commands;
mod logging;
mod platform;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cloak",
    version,
    about = "Hide application windows from screen capture"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exclude the windows of matching processes from screen capture
    Hide {
        /// Process names, with or without ".exe"
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Make the windows of matching processes capturable again
    Show {
        /// Process names, with or without ".exe"
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show whether a process is running and how many windows it has
    Status {
        /// Process name, with or without ".exe"
        name: String,
    },
    /// List the visible windows of matching processes
    Windows {
        /// Process name, with or without ".exe"
        name: String,
    },
    /// Answer JSON commands on stdin, one per line, until stdin closes
    Serve,
    /// Inspect or set the update and restart markers
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
}

#[derive(Subcommand)]
enum LockCommands {
    /// Show which markers are present
    Status,
    /// Mark an update as in progress
    Begin {
        /// Version being installed
        #[arg(long)]
        version: String,
    },
    /// Clear the update marker
    End,
}

fn main() {
    let cli = Cli::parse();
    let config = cloak_core::config::load();
    logging::init(&config, "cloak.log");

    match cli.command {
        Commands::Hide { names } => commands::hide::execute(&config, &names, true),
        Commands::Show { names } => commands::hide::execute(&config, &names, false),
        Commands::Status { name } => commands::status::execute(&name),
        Commands::Windows { name } => commands::windows::execute(&name),
        Commands::Serve => commands::serve::execute(&config),
        Commands::Lock { command } => match command {
            LockCommands::Status => commands::lock::status(),
            LockCommands::Begin { version } => commands::lock::begin(&version),
            LockCommands::End => commands::lock::end(),
        },
    }
}
