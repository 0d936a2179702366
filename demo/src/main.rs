//! Concord demo CLI.
//!
//! Runs one or all of the scripted negotiation scenarios. Each scenario uses
//! real Concord components (environment, schema validation, permissions,
//! journal, orchestrator) wired to the deterministic scripted gateway.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- episode
//!   cargo run -p demo -- corruption
//!   cargo run -p demo -- permissions
//!   cargo run -p demo -- evolution

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod scenarios;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Concord — self-evolving negotiation simulation demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Concord negotiation engine demo",
    long_about = "Runs scripted Concord scenarios showing the execution loop,\n\
                  schema enforcement, permission scopes, and the generation loop.\n\n\
                  Scenarios:\n\
                  1. Episode     — agreement via consecutive resolutions, journaled + persisted\n\
                  2. Corruption  — exhausted schema retries end the episode\n\
                  3. Permissions — a created agent violates its path scope\n\
                  4. Evolution   — epochs, plateau, and a gated provisioning attempt"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four scenarios in sequence.
    RunAll,
    /// Scenario 1: a full episode ending in agreement.
    Episode,
    /// Scenario 2: schema-validation corruption.
    Corruption,
    /// Scenario 3: created-agent permission violation.
    Permissions,
    /// Scenario 4: the generation loop with a provisioning attempt.
    Evolution,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Structured logging; set RUST_LOG=debug for the full step-by-step trace.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::Episode => scenarios::run_episode().await,
        Command::Corruption => scenarios::run_corruption().await,
        Command::Permissions => scenarios::run_permissions().await,
        Command::Evolution => scenarios::run_evolution().await,
    };

    match result {
        Ok(()) => println!("All selected scenarios completed."),
        Err(e) => {
            eprintln!("Demo error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_all() -> concord_contracts::error::ConcordResult<()> {
    scenarios::run_episode().await?;
    scenarios::run_corruption().await?;
    scenarios::run_permissions().await?;
    scenarios::run_evolution().await?;
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Concord — Self-Evolving Negotiation Engine");
    println!("==========================================");
    println!();
    println!("Execution pipeline per turn:");
    println!("  [1] Modular turn order resolves the speaker");
    println!("  [2] Capitalizer hint, redacted against private monologues");
    println!("  [3] Actor proposal — schema-validated, retried on failure");
    println!("  [4] Permission scope check before any mutation applies");
    println!("  [5] Consecutive-agreement / abort / budget termination");
    println!("  [6] Hash-chained journal entry + event emission");
    println!();
}
