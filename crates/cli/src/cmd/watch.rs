//! Run the save watcher in the foreground

use super::GlobalOptions;
use alarm::{AlarmSink, SoundSink};
use anyhow::{Context, Result};
use cli_lib::locks::InstanceLock;
use cli_lib::{logging, util, Monitor, MonitorStatus};
use keeper_core::config::executable_dir;
use keeper_core::{Config, WatchTarget};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info, warn};

pub async fn run(options: &GlobalOptions, log_file: Option<&Path>) -> Result<()> {
    let config_path = util::config_path(options.config.as_deref());
    let created = !config_path.exists();
    let (config, mut warnings) = Config::load_or_create(&config_path);
    let (settings, resolve_warnings) = config.resolve(&executable_dir());
    warnings.extend(resolve_warnings);

    let verbose = options.verbose || settings.verbose_logging;
    let _log_guard = logging::init(verbose, log_file)?;

    if created && config_path.exists() {
        info!("Created default config file: {}", config_path.display());
    }
    info!("Using config file: {}", config_path.display());
    for warning in &warnings {
        warn!("{}", warning);
    }
    for line in settings.summary() {
        info!("{}", line);
    }

    let requested = util::resolve_target(options.saves_dir.as_deref(), options.target.as_deref())?;
    let parent = std::fs::canonicalize(requested.parent()).with_context(|| {
        format!("Saves folder does not exist: {}", requested.parent().display())
    })?;
    let target = WatchTarget::new(parent, requested.name());

    info!("Watching folder: {}", target.parent().display());
    info!("Backups folder: {}", target.backups_dir().display());
    log_save_folders(target.parent());

    let lock = InstanceLock::acquire(&target.backups_dir())?;
    debug!("Holding instance lock: {}", lock.path().display());

    let sink: Arc<dyn AlarmSink> = Arc::new(SoundSink::from(&settings.alarm_sound));
    let (monitor, handle) = Monitor::start(target, &settings, sink)?;
    let mut task = tokio::spawn(monitor.run());

    info!("Monitoring started. Press Ctrl+C to exit.");

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let status = tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
            None
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down...");
            None
        }
        result = &mut task => Some(result.context("Monitor task failed")?),
    };

    let status = match status {
        Some(status) => status,
        None => {
            handle.shutdown();
            task.await.context("Monitor task failed")?
        }
    };

    log_summary(&status);
    Ok(())
}

fn log_save_folders(saves_dir: &Path) {
    match util::list_save_folders(saves_dir) {
        Ok(names) if names.is_empty() => info!("Current save folders: (none)"),
        Ok(names) => {
            info!("Current save folders:");
            for name in names {
                info!("  - {}", name);
            }
        }
        Err(e) => warn!("{:#}", e),
    }
}

fn log_summary(status: &MonitorStatus) {
    info!(
        "Stopped. {} backup(s) created, {} failed, {} alarm(s) fired.",
        status.backups_created, status.backup_failures, status.alarms_fired
    );
    if let Some(record) = &status.last_backup {
        info!("Last backup: {}", record.destination.display());
    }
}
