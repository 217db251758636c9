//! Bulksend - resumable bulk message dispatcher
//!
//! CLI entry point wiring the contact source, ledgers, transport, and the
//! dispatch engine together.

use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use bulksend::cli::{Cli, Command, OptoutCommand, ProgressCommand};
use bulksend::config::Config;
use bulksend::dispatch::{DispatchEngine, DispatchSummary, ShutdownKind, shutdown_channel};
use bulksend::ledger::{LoadOptions, StatusLedger};
use bulksend::optout::OptOutRegistry;
use bulksend::phone::normalize;
use bulksend::progress::ProgressTracker;
use bulksend::store::JsonlStore;
use bulksend::template::MessageTemplate;
use bulksend::transport::create_client;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > INFO default
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Send {
            source,
            delay_ms,
            template_file,
            force_revalidate,
            dry_run,
        } => {
            cmd_send(
                &config,
                &source,
                delay_ms,
                template_file.as_deref(),
                force_revalidate,
                dry_run,
            )
            .await
        }
        Command::Check { number } => cmd_check(&config, &number),
        Command::Optout { command } => match command {
            OptoutCommand::Add { numbers } => cmd_optout_add(&config, &numbers),
            OptoutCommand::List => cmd_optout_list(&config),
        },
        Command::Progress { command } => match command {
            ProgressCommand::Show { source } => cmd_progress_show(&config, &source),
            ProgressCommand::Clear { source } => cmd_progress_clear(&config, &source),
        },
    }
}

async fn cmd_send(
    config: &Config,
    source: &std::path::Path,
    delay_ms: Option<u64>,
    template_file: Option<&std::path::Path>,
    force_revalidate: bool,
    dry_run: bool,
) -> Result<()> {
    info!(source = %source.display(), dry_run, "loading contacts");

    // The one fatal error of a run: an unreadable source
    let store = JsonlStore::open(source).context("Failed to load contact source")?;
    let optout = OptOutRegistry::load(&config.optout_path, &config.country)?;

    let opts = LoadOptions {
        force_revalidate: force_revalidate || config.force_revalidate,
        retry_failed: config.retry_failed,
    };

    let mut ledger = StatusLedger::new(Box::new(store));
    let contacts = ledger.load_contacts(&config.country, &optout, opts);

    if contacts.is_empty() {
        // Rejections found during the load are still written back
        ledger.flush().context("Failed to persist status annotations")?;
        warn!("no dispatchable contacts in source");
        println!("{} No dispatchable contacts found", "!".yellow());
        return Ok(());
    }
    println!("Dispatchable contacts: {}", contacts.len().to_string().cyan());

    let progress = ProgressTracker::for_source(&config.progress_path, ledger.source_path());
    if progress.completed_count() > 0 {
        info!(completed = progress.completed_count(), "resuming a previous run");
    }

    let client = create_client(&config.transport, dry_run).context("Failed to create messaging client")?;

    let template = match template_file.or(config.template_file.as_deref()) {
        Some(path) => MessageTemplate::from_file(path)?,
        None => MessageTemplate::new(&config.template)?,
    };

    // Signal handlers feed an explicit shutdown channel; the engine flushes
    // ledgers before stopping
    let (handle, signal) = shutdown_channel();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGINT handler");
                    return;
                }
            };
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = sigint.recv() => {
                    warn!("SIGINT received");
                    handle.trigger(ShutdownKind::Interrupt);
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received");
                    handle.trigger(ShutdownKind::Terminate);
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received");
                handle.trigger(ShutdownKind::Interrupt);
            }
        }
    });

    let engine = DispatchEngine::new(
        client,
        ledger,
        progress,
        config.window,
        template,
        signal,
    )
    .with_message_delay(Duration::from_millis(delay_ms.unwrap_or(config.message_delay_ms)))
    .with_validation_delay(Duration::from_millis(config.validation_delay_ms));

    let summary = engine.run(contacts).await;
    print_summary(&summary);

    if let Some(kind) = summary.interrupted {
        std::process::exit(kind.exit_code());
    }
    Ok(())
}

fn print_summary(summary: &DispatchSummary) {
    println!();
    println!("  Sent:           {}", summary.sent.to_string().green());
    println!("  Failed:         {}", summary.failed);
    println!("  Not registered: {}", summary.not_registered);
    println!("  Skipped:        {}", summary.skipped);
    if summary.pending_validation > 0 {
        println!("  Left pending:   {}", summary.pending_validation);
    }
    println!();

    if let Some(kind) = summary.interrupted {
        println!("{} Interrupted by {}; progress was saved", "!".yellow(), kind);
    } else if summary.completed_with_errors() {
        println!(
            "{} Completed with errors: {} send(s) failed",
            "!".yellow(),
            summary.failed
        );
    } else {
        println!("{} All messages sent", "✓".green());
    }
}

fn cmd_check(config: &Config, number: &str) -> Result<()> {
    match normalize(number, &config.country) {
        Ok(n) => {
            println!("{} {} -> {}", "✓".green(), number, n.display.cyan());
            println!("  canonical id: {}", n.canonical_id);
        }
        Err(reason) => {
            println!("{} {}: {}", "✗".red(), number, reason);
        }
    }
    Ok(())
}

fn cmd_optout_add(config: &Config, numbers: &[String]) -> Result<()> {
    let mut registry = OptOutRegistry::load(&config.optout_path, &config.country)?;
    let changed = registry.apply_updates(numbers, &config.country)?;
    if changed {
        println!("{} Registry now has {} number(s)", "✓".green(), registry.len());
    } else {
        println!("No new numbers added");
    }
    Ok(())
}

fn cmd_optout_list(config: &Config) -> Result<()> {
    let registry = OptOutRegistry::load(&config.optout_path, &config.country)?;
    if registry.is_empty() {
        println!("Opt-out registry is empty");
    } else {
        for number in registry.numbers() {
            println!("{}", number);
        }
    }
    Ok(())
}

fn cmd_progress_show(config: &Config, source: &std::path::Path) -> Result<()> {
    let tracker = ProgressTracker::for_source(&config.progress_path, source);
    if tracker.completed_count() == 0 {
        println!("No completed rows for {}", source.display());
    } else {
        println!(
            "Completed rows for {}: {}",
            source.display(),
            tracker.completed_count().to_string().cyan()
        );
        for row in tracker.completed() {
            println!("  row {}", row);
        }
    }
    Ok(())
}

fn cmd_progress_clear(config: &Config, source: &std::path::Path) -> Result<()> {
    let mut tracker = ProgressTracker::for_source(&config.progress_path, source);
    tracker.clear()?;
    println!("{} Cleared progress for {}", "✓".green(), source.display());
    Ok(())
}
