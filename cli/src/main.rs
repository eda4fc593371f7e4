//! Command-line surface for the AI cash management optimization core.
//!
//! Four subcommands: `run` drives a `GameOrchestrator` to completion,
//! `list`/`info` render a persisted session through the same
//! `StateProvider` rendering path a live run uses, and `validate` checks a
//! config's seed policies without constructing an orchestrator at all.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cashsim_core::config::GameConfig;
use cashsim_core::constraints::ConstraintValidator;
use cashsim_core::orchestrator::GameOrchestrator;
use cashsim_core::persistence::GameSessionRepository;
use cashsim_core::records::GameEvent;
use cashsim_core::state_provider::{DatabaseStateProvider, StateProvider};
use clap::{ArgAction, Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cashsim", version, about = "AI-driven cash management policy optimization")]
struct Cli {
    /// Repeat for more verbosity: `-v` info, `-vv` debug, `-vvv` trace.
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    verbose: u8,

    /// DuckDB file backing persistence, used when a game config doesn't
    /// set its own `output_config.db_path`.
    #[arg(long = "db", global = true, default_value = "./cashsim.duckdb")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an optimization game to completion.
    Run {
        /// Path to the game config YAML.
        config: PathBuf,
    },
    /// List every persisted session in the database.
    List,
    /// Show a persisted session's latest per-agent state.
    Info {
        /// Session UUID, as printed by `list` or by `run`'s summary.
        session_id: String,
    },
    /// Check a config's seed policies against its constraints, without
    /// running anything.
    Validate {
        /// Path to the game config YAML.
        config: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run { config } => run(config, cli.db, cli.verbose).await,
        Command::List => list(cli.db),
        Command::Info { session_id } => info(cli.db, session_id, cli.verbose),
        Command::Validate { config } => validate(config),
    }
}

async fn run(config_path: PathBuf, default_db: PathBuf, verbose: u8) -> Result<()> {
    let mut config = GameConfig::load(&config_path)
        .with_context(|| format!("loading game config from {}", config_path.display()))?;
    if config.output_config.db_path.is_none() {
        config.output_config.db_path = Some(default_db.to_string_lossy().into_owned());
    }

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<GameEvent>();
    let renderer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            render_event(verbose, &event);
        }
    });

    let mut orchestrator = GameOrchestrator::new(config)
        .context("starting orchestrator")?
        .with_event_sink(event_tx);
    let outcome = orchestrator.run().await.context("running optimization loop")?;
    drop(orchestrator);
    let _ = renderer.await;

    println!("iterations run:       {}", outcome.iterations_run);
    println!("converged:             {}", outcome.converged);
    println!(
        "convergence reason:    {}",
        outcome.convergence_reason.as_deref().unwrap_or("n/a")
    );
    println!(
        "best joint mean cost:  {}",
        outcome
            .best_cost
            .map(|c| c.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("final policies:");
    for (agent_id, policy) in &outcome.final_policies {
        println!("  {agent_id}: {}", policy.policy_id);
    }

    Ok(())
}

/// Print one event line, gated by `-v` count: 0 is silent, `-v` shows the
/// acceptance-relevant taxonomy, `-vv` adds per-iteration progress, `-vvv`
/// adds every LLM round trip.
fn render_event(verbose: u8, event: &GameEvent) {
    let tier = match event.event_type.as_str() {
        "experiment_start" | "policy_change" | "policy_rejected" | "experiment_end" => 1,
        "iteration_start" | "bootstrap_evaluation" => 2,
        "llm_call" => 3,
        _ => 1,
    };
    if verbose < tier {
        return;
    }

    let iteration = event
        .iteration_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("[{:>4}] {:<20} {}", iteration, event.event_type, event.detail_json);
}

fn list(db: PathBuf) -> Result<()> {
    let repository = GameSessionRepository::open(&db)
        .with_context(|| format!("opening database at {}", db.display()))?;
    let sessions = repository.list_sessions().context("listing sessions")?;

    if sessions.is_empty() {
        println!("no sessions recorded");
        return Ok(());
    }

    println!("{:<36}  {:<20}  {:<10}  {:<9}  iterations", "session_id", "game_id", "mode", "status");
    for session in sessions {
        println!(
            "{:<36}  {:<20}  {:<10}  {:<9}  {}",
            session.game_session_id,
            session.game_id,
            mode_label(session.mode),
            status_label(session.status),
            session.total_iterations,
        );
    }
    Ok(())
}

fn info(db: PathBuf, session_id: String, verbose: u8) -> Result<()> {
    let session_id = Uuid::parse_str(&session_id).context("parsing session id")?;
    let repository = GameSessionRepository::open(&db)
        .with_context(|| format!("opening database at {}", db.display()))?;
    let provider = DatabaseStateProvider::new(&repository, session_id);

    let session = provider.session().context("loading session")?;
    println!("game_id:    {}", session.game_id);
    println!("mode:       {}", mode_label(session.mode));
    println!("status:     {}", status_label(session.status));
    println!("iterations: {}", session.total_iterations);
    println!("accepted:   {}", session.accepted_count);
    println!("rejected:   {}", session.rejected_count);
    if let Some(reason) = &session.final_convergence_reason {
        println!("reason:     {reason}");
    }

    let snapshots = provider.latest_agent_snapshots().context("loading agent snapshots")?;
    println!("agents:");
    let mut agent_ids: Vec<&String> = snapshots.keys().collect();
    agent_ids.sort();
    for agent_id in agent_ids {
        let snapshot = &snapshots[agent_id];
        println!(
            "  {agent_id}: cost={} accepted={} policy_id={}",
            snapshot.mean_cost, snapshot.was_accepted, snapshot.policy_id
        );
    }

    if verbose > 0 {
        let events = repository.list_events(session_id).context("loading events")?;
        println!("events:");
        for event in &events {
            render_event(verbose, event);
        }
    }

    Ok(())
}

fn validate(config_path: PathBuf) -> Result<()> {
    let config = GameConfig::load(&config_path)
        .with_context(|| format!("loading game config from {}", config_path.display()))?;
    let constraints = config.policy_constraints.clone().unwrap_or_default();
    let validator = ConstraintValidator::new(&constraints);

    let mut all_valid = true;
    for agent_id in &config.optimized_agents {
        let policy = &config.seed_policies[agent_id];
        match validator.validate(policy) {
            Ok(()) => println!("{agent_id}: OK"),
            Err(err) => {
                all_valid = false;
                println!("{agent_id}: FAILED — {err}");
            }
        }
    }

    if all_valid {
        Ok(())
    } else {
        anyhow::bail!("one or more seed policies failed validation")
    }
}

fn mode_label(mode: cashsim_core::config::GameMode) -> &'static str {
    match mode {
        cashsim_core::config::GameMode::RlOptimization => "rl_optimization",
        cashsim_core::config::GameMode::CampaignLearning => "campaign_learning",
    }
}

fn status_label(status: cashsim_core::records::SessionStatus) -> &'static str {
    use cashsim_core::records::SessionStatus;
    match status {
        SessionStatus::Running => "running",
        SessionStatus::Completed => "completed",
        SessionStatus::Converged => "converged",
        SessionStatus::Failed => "failed",
    }
}
