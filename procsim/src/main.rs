//! procsim - process modeling with LLM-backed simulation
//!
//! Define a sequence of steps, simulate baseline and optimized runs through the
//! oracle, compare them, and iterate on the process with the assistant.

mod render;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use procsim_core::config::OracleProvider;
use procsim_core::oracle::create_oracle_client;
use procsim_core::store::Confirm;
use procsim_core::{
    Config, Database, Error, ProcessStep, ProcessStore, RunType, StepPatch, Workspace,
};

#[derive(Parser)]
#[command(name = "procsim")]
#[command(about = "Model a process, simulate it with an LLM and iterate on it")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the process, its steps and which runs exist
    Status,

    /// Rename the process
    Rename {
        name: String,
    },

    /// Edit the step list
    #[command(subcommand)]
    Step(StepCommand),

    /// Replace the steps with ones extracted from a free-text description
    Import {
        /// Description text (reads --file when omitted)
        text: Option<String>,

        /// Read the description from a file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// Simulate the current steps
    Simulate {
        /// Record the run as the optimized run instead of the baseline
        #[arg(long)]
        optimized: bool,
    },

    /// Show a stored simulation run
    Results {
        /// Show the optimized run instead of the baseline
        #[arg(long)]
        optimized: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Compare the baseline and optimized runs metric by metric
    Compare {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Send a message to the optimization assistant
    Chat {
        message: String,
    },

    /// Show the chat transcript
    History,

    /// Replace the steps with the assistant's latest proposal
    Apply,

    /// Manage the oracle API key
    #[command(subcommand)]
    Key(KeyCommand),

    /// Clear the process, both runs and the transcript
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum StepCommand {
    /// Append a step
    Add {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        description: String,

        #[arg(short, long)]
        inputs: Option<String>,

        #[arg(short, long)]
        conditions: Option<String>,
    },

    /// Change fields of a step
    Edit {
        /// Step id (a unique prefix is enough)
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        inputs: Option<String>,

        #[arg(short, long, conflicts_with = "clear_conditions")]
        conditions: Option<String>,

        /// Remove the step's conditions
        #[arg(long)]
        clear_conditions: bool,
    },

    /// Delete a step
    Remove {
        /// Step id (a unique prefix is enough)
        id: String,
    },

    /// Move a step to a new position
    Move {
        /// Step id (a unique prefix is enough)
        id: String,

        /// 1-based target position
        position: usize,
    },
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Store an API key
    Set { key: String },
    /// Remove the stored API key
    Clear,
    /// Show whether a key is available
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Asks on the terminal, defaulting to no
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (to file, stdout is for command output)
    let _log_guard =
        procsim_core::logging::init(&config.logging).context("failed to initialize logging")?;

    // Open database
    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let store = ProcessStore::new(db, config.process.default_name.clone());
    let stored_key = store.credential().context("failed to read stored API key")?;
    let oracle =
        create_oracle_client(&config.oracle, stored_key).context("failed to create oracle client")?;
    let mut workspace = Workspace::open(store, oracle);

    run_command(args.command, &mut workspace, &config)
}

fn run_command(command: Command, ws: &mut Workspace, config: &Config) -> Result<()> {
    let provider = config.oracle.provider;

    match command {
        Command::Status => {
            render::print_status(ws.snapshot(), ws.has_credential());
            println!(
                "{:<15} {}",
                "Log file",
                procsim_core::logging::log_file_path(&config.logging).display()
            );
        }
        Command::Rename { name } => {
            ws.rename(&name)?;
            println!("Renamed process to \"{}\"", ws.snapshot().process_name);
        }
        Command::Step(command) => run_step_command(command, ws)?,
        Command::Import { text, file } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("provide a description or --file"),
            };
            let count = with_spinner("Importing process description...", || {
                ws.import_description(&text)
            })
            .map_err(|e| oracle_error(e, provider))?;
            println!("Imported {count} step(s):");
            render::print_steps(&ws.snapshot().steps);
        }
        Command::Simulate { optimized } => {
            let run_type = run_type(optimized);
            let result = with_spinner(&format!("Running {run_type} simulation..."), || {
                ws.run_simulation(run_type)
            })
            .map_err(|e| oracle_error(e, provider))?;
            render::print_result(&result);
        }
        Command::Results { optimized, format } => {
            let run_type = run_type(optimized);
            let Some(result) = ws.snapshot().result(run_type) else {
                let flag = if optimized { " --optimized" } else { "" };
                println!("No {run_type} run yet. Run 'procsim simulate{flag}' first.");
                return Ok(());
            };
            match format {
                OutputFormat::Text => render::print_result(result),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
            }
        }
        Command::Compare { format } => {
            let snapshot = ws.snapshot();
            let (Some(baseline), Some(optimized)) =
                (&snapshot.baseline_result, &snapshot.optimized_result)
            else {
                println!("Comparison needs both a BASELINE and an OPTIMIZED run.");
                return Ok(());
            };
            let rows = procsim_core::compare::compare(baseline, optimized);
            match format {
                OutputFormat::Text => render::print_comparison(&rows),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
        Command::Chat { message } => {
            let reply = with_spinner("Thinking...", || ws.send_chat(&message))
                .map_err(|e| oracle_error(e, provider))?;
            render::print_message(&reply);
            if reply.is_optimization_proposal {
                println!("\nRun 'procsim apply' to replace your steps with this proposal.");
            }
        }
        Command::History => {
            let history = &ws.snapshot().chat_history;
            if history.is_empty() {
                println!("No messages yet.");
            }
            for message in history {
                render::print_message(message);
                println!();
            }
        }
        Command::Apply => {
            let count = ws.apply_latest_proposal()?;
            println!("Applied proposal ({count} steps):");
            render::print_steps(&ws.snapshot().steps);
        }
        Command::Reset { yes } => {
            let confirmed = if yes {
                ws.reset(&|_: &str| true)?
            } else {
                ws.reset(&StdinConfirm)?
            };
            if confirmed {
                println!("Process reset.");
            } else {
                println!("Reset cancelled.");
            }
        }
        Command::Key(command) => run_key_command(&command, ws.store(), config)?,
    }

    Ok(())
}

fn run_step_command(command: StepCommand, ws: &mut Workspace) -> Result<()> {
    match command {
        StepCommand::Add {
            name,
            description,
            inputs,
            conditions,
        } => {
            let mut step = ProcessStep::new(name, description);
            if let Some(inputs) = inputs {
                step = step.with_inputs(inputs);
            }
            if let Some(conditions) = conditions {
                step = step.with_conditions(conditions);
            }
            let id = ws.add_step(step)?;
            println!("Added step {id}");
        }
        StepCommand::Edit {
            id,
            name,
            description,
            inputs,
            conditions,
            clear_conditions,
        } => {
            let id = resolve_step_id(ws, &id)?;
            let patch = StepPatch {
                name,
                description,
                inputs,
                conditions: if clear_conditions {
                    Some(None)
                } else {
                    conditions.map(Some)
                },
            };
            if patch.is_empty() {
                anyhow::bail!("nothing to change; pass at least one field");
            }
            ws.update_step(&id, patch)?;
            println!("Updated step {id}");
        }
        StepCommand::Remove { id } => {
            let id = resolve_step_id(ws, &id)?;
            let removed = ws.delete_step(&id)?;
            println!("Removed step \"{}\"", removed.name);
        }
        StepCommand::Move { id, position } => {
            let id = resolve_step_id(ws, &id)?;
            let placed = ws.move_step(&id, position.saturating_sub(1))?;
            println!("Moved step to position {}", placed + 1);
        }
    }
    Ok(())
}

fn run_key_command(command: &KeyCommand, store: &ProcessStore, config: &Config) -> Result<()> {
    match command {
        KeyCommand::Set { key } => {
            store.set_credential(key)?;
            println!("API key stored.");
        }
        KeyCommand::Clear => {
            if store.clear_credential()? {
                println!("Stored API key removed.");
            } else {
                println!("No stored API key.");
            }
        }
        KeyCommand::Status => {
            let env = config.oracle.provider.api_key_env();
            if config.oracle.configured_api_key().is_some() {
                println!("API key: configured (config file or {env})");
            } else if store.credential()?.is_some() {
                println!("API key: stored");
            } else {
                println!("API key: not set");
            }
        }
    }
    Ok(())
}

/// Resolve a full id or a unique id prefix to a step id.
fn resolve_step_id(ws: &Workspace, key: &str) -> Result<String> {
    let steps = &ws.snapshot().steps;
    if steps.iter().any(|s| s.id == key) {
        return Ok(key.to_string());
    }

    let matches: Vec<_> = steps.iter().filter(|s| s.id.starts_with(key)).collect();
    match matches.as_slice() {
        [step] => Ok(step.id.clone()),
        [] => Err(Error::StepNotFound(key.to_string()).into()),
        _ => anyhow::bail!("step id '{}' is ambiguous ({} matches)", key, matches.len()),
    }
}

fn run_type(optimized: bool) -> RunType {
    if optimized {
        RunType::Optimized
    } else {
        RunType::Baseline
    }
}

/// Run a blocking oracle call behind a spinner.
fn with_spinner<T>(
    message: &str,
    f: impl FnOnce() -> procsim_core::Result<T>,
) -> procsim_core::Result<T> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = f();

    pb.finish_and_clear();
    result
}

/// Turn oracle failures into actionable messages.
fn oracle_error(error: Error, provider: OracleProvider) -> anyhow::Error {
    match error {
        Error::OracleUnavailable => anyhow::anyhow!(
            "no API key configured. Run 'procsim key set <KEY>' or set {}",
            provider.api_key_env()
        ),
        Error::MalformedResponse(reason) => anyhow::anyhow!(
            "the model returned an unusable response ({reason}). Please try again."
        ),
        Error::Transport(reason) => {
            anyhow::anyhow!("could not reach the model: {reason}")
        }
        other => other.into(),
    }
}
