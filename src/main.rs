mod cli;
mod core;
mod execution;
mod persistence;
mod runner;

use anyhow::{Context, Result};
use cli::commands::{HistoryCommand, LaunchCommand, SetupCommand, ValidateCommand};
use cli::output::*;
use cli::terminal_output::ServiceLogPrinter;
use cli::{Cli, Command};
use crate::core::config::RecipeConfig;
use crate::core::host::HostContext;
use crate::core::pipeline::{Pipeline, PipelineKind};
use crate::core::state::RunStatus;
use crate::core::RunContext;
use execution::{ExecutionEngine, ExecutionEvent};
use persistence::{create_summary, InMemoryPersistence, PersistenceBackend, RunSummary};
#[cfg(feature = "sqlite")]
use persistence::SqliteRunStore;
use runner::ShellRunner;
use std::sync::Arc;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Setup(cmd) => run_setup(cmd, cli.clone()).await?,
        Command::Launch(cmd) => run_launch(cmd, cli.clone()).await?,
        Command::Validate(cmd) => validate_recipe(cmd)?,
        Command::History(cmd) => show_history(cmd, cli.verbose).await?,
    }

    Ok(())
}

/// Pick the history store for a run
async fn open_store(no_history: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if no_history {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        Ok(Arc::new(SqliteRunStore::with_default_path().await?))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        warn!("Built without sqlite support, run history will not be kept");
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

/// Save the run and tell the user where it went
async fn save_run(
    store: &dyn PersistenceBackend,
    pipeline: &Pipeline,
    ctx: &RunContext,
    no_history: bool,
) -> Result<()> {
    let summary = create_summary(pipeline, ctx);
    store.save_run(&summary).await?;

    if !no_history {
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    Ok(())
}

async fn run_setup(cmd: &SetupCommand, cli: Cli) -> Result<()> {
    // Load recipe
    let recipe = RecipeConfig::from_file(&cmd.file).context("Failed to load recipe")?;

    println!("{} Loaded recipe: {}", INFO, style(&recipe.name).bold());

    // Detect the host, unless the user pinned a vendor
    let host = match &cmd.gpu {
        Some(label) => HostContext::with_override(label),
        None => HostContext::detect(),
    };
    println!("{} GPU vendor: {}", INFO, style(&host.gpu).cyan());

    let mut pipeline = Pipeline::setup(&recipe, &host);
    let mut ctx = RunContext::new(&recipe);

    // Set up persistence
    let store = open_store(cmd.no_history).await?;

    // Carry forward work from the last setup run
    if cmd.resume {
        if let Some(last) = store.latest_run(&recipe.name, PipelineKind::Setup).await? {
            let adopted = pipeline.adopt_completed(&last.completed_step_ids());
            if adopted > 0 {
                println!(
                    "{} Skipping {} step(s) completed by run {}",
                    INFO,
                    style(adopted).cyan(),
                    style(&last.run_id.to_string()[..8]).dim()
                );
            }
        }
    }

    // Create execution engine
    let mut engine = ExecutionEngine::new(
        ShellRunner::new(),
        host,
        recipe.compile_ready_pattern()?,
        recipe.ready_timeout_secs,
    );

    // Set up event handler for console output
    let remaining = pipeline.steps.iter().filter(|s| !s.is_terminal()).count();
    let progress = create_progress_bar(remaining);
    let bar = progress.clone();
    let stream = cli.stream;
    engine.add_event_handler(move |event| match &event {
        ExecutionEvent::StepStarted { step_id } => {
            bar.set_message(step_id.clone());
            bar.println(format_execution_event(&event));
        }
        ExecutionEvent::StepCompleted { .. }
        | ExecutionEvent::StepSkipped { .. }
        | ExecutionEvent::StepFailed { .. } => {
            bar.inc(1);
            bar.println(format_execution_event(&event));
        }
        ExecutionEvent::StepOutput { .. } => {
            if stream {
                bar.println(format_execution_event(&event));
            }
        }
        _ => bar.println(format_execution_event(&event)),
    });

    // Execute pipeline
    println!();
    engine.execute(&mut pipeline, &mut ctx).await;
    progress.finish_and_clear();

    // Save to history
    save_run(store.as_ref(), &pipeline, &ctx, cmd.no_history).await?;

    // Print final status
    if pipeline.has_failed() {
        println!(
            "\n{} {} setup {}",
            CROSS,
            style(&recipe.name).bold(),
            style("failed").red()
        );
        std::process::exit(1);
    }

    println!(
        "\n{} {} setup completed {}",
        CHECK,
        style(&recipe.name).bold(),
        style("successfully").green()
    );

    Ok(())
}

async fn run_launch(cmd: &LaunchCommand, cli: Cli) -> Result<()> {
    // Load recipe
    let mut recipe = RecipeConfig::from_file(&cmd.file).context("Failed to load recipe")?;
    if cmd.no_browser {
        recipe.open_browser = false;
    }

    println!("{} Loaded recipe: {}", INFO, style(&recipe.name).bold());

    // Refuse to launch what setup never installed
    let workdir = recipe.workdir_path();
    let env_dir = recipe.env_dir();
    if !workdir.is_dir() || !env_dir.is_dir() {
        anyhow::bail!(
            "{} is not installed yet, run `greenroom setup -f {}` first",
            recipe.name,
            cmd.file
        );
    }

    let mut ctx = RunContext::new(&recipe);

    // Credential injection: the flag wins, then the configured env var
    if let Some(var) = recipe.credential_env.clone() {
        let token = cmd.token.clone().or_else(|| std::env::var(&var).ok());
        match token {
            Some(token) => ctx.inject_env(var, token),
            None => warn!("No {} provided, gated model downloads may fail", var),
        }
    }
    for (key, value) in &cmd.env {
        ctx.inject_env(key.clone(), value.clone());
        println!(
            "{} Environment override: {}",
            INFO,
            style(key).cyan()
        );
    }

    let host = HostContext::detect();
    let mut pipeline = Pipeline::launch(&recipe);

    // Set up persistence
    let store = open_store(cmd.no_history).await?;

    // Create execution engine
    let mut engine = ExecutionEngine::new(
        ShellRunner::new(),
        host,
        recipe.compile_ready_pattern()?,
        recipe.ready_timeout_secs,
    );

    // Set up event handler for console output
    let printer = ServiceLogPrinter::new(cli.stream);
    engine.add_event_handler(move |event| match &event {
        ExecutionEvent::ServiceLine { line } => printer.print_line(line),
        ExecutionEvent::ServiceReady { url } => printer.print_banner(url),
        ExecutionEvent::StepOutput { .. } => {}
        _ => println!("{}", format_execution_event(&event)),
    });

    // Execute pipeline
    println!();
    let service = engine.execute(&mut pipeline, &mut ctx).await;

    // Save to history
    save_run(store.as_ref(), &pipeline, &ctx, cmd.no_history).await?;

    let Some(mut service) = service else {
        println!(
            "\n{} {} launch {}",
            CROSS,
            style(&recipe.name).bold(),
            style("failed").red()
        );
        std::process::exit(1);
    };

    // Supervise the app until it exits or we get interrupted
    let tail = ServiceLogPrinter::new(cli.stream);
    let exit = tokio::select! {
        exit = service.wait_exit(|line| tail.print_line(line)) => Some(exit),
        _ = tokio::signal::ctrl_c() => None,
    };

    match exit {
        Some(exit) if exit.success() => {
            pipeline.state.complete();
            println!("\n{} {} exited cleanly", CHECK, style(&recipe.name).bold());
        }
        Some(exit) => {
            pipeline.state.fail();
            println!(
                "\n{} {} stopped: {}",
                CROSS,
                style(&recipe.name).bold(),
                style(exit.describe()).red()
            );
        }
        None => {
            println!(
                "\n{} Interrupt received, stopping {}",
                WARN,
                style(&recipe.name).bold()
            );
            service.terminate().await;
            pipeline.state.cancel();
        }
    }

    // Record how the supervised run ended
    save_run(store.as_ref(), &pipeline, &ctx, cmd.no_history).await?;

    if pipeline.state.status == RunStatus::Failed {
        std::process::exit(1);
    }

    Ok(())
}

fn validate_recipe(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating recipe...", INFO);

    let result = RecipeConfig::from_file(&cmd.file);

    match result {
        Ok(recipe) => {
            println!("{} Recipe is valid!", CHECK);
            println!("  Name: {}", style(&recipe.name).bold());
            println!("  Repo: {}", style(&recipe.repo).cyan());
            println!("  Branch: {}", style(&recipe.branch).cyan());
            println!("  Entry: {}", style(&recipe.entry).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&recipe)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand, verbose: bool) -> Result<()> {
    let store = open_store(false).await?;

    // If a specific run is requested
    if let Some(run_id_str) = &cmd.run {
        let run_id = uuid::Uuid::parse_str(run_id_str).context("Invalid run ID format")?;
        let summary = store.load_run(run_id).await?;

        match summary {
            Some(summary) => {
                print_run_details(&summary, verbose)?;
            }
            None => {
                println!("{} Run not found", WARN);
            }
        }
        return Ok(());
    }

    let runs = store.list_runs(cmd.recipe.as_deref(), cmd.limit).await?;

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Recipe: {}", style(&summary.recipe).bold());
    println!("  Kind: {}", style(summary.kind.label()).cyan());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    if let Some(url) = &summary.service_url {
        println!("  URL: {}", style(url).green());
    }
    println!("  Steps: {}/{}", summary.completed_steps, summary.total_steps);

    for step in &summary.steps {
        println!("    {} {}", format_step_label(&step.status), style(&step.id).bold());
        if verbose && !step.detail.is_empty() {
            for line in step.detail.lines() {
                println!("      {}", style(line).dim());
            }
        }
    }

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
