// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command implementations: config and credential resolution, preflight,
//! lock file, signal handling, and the orchestrator run.

use anyhow::{bail, Context};
use ap_adapters::{ClaudeSdk, GitHubClient, LinearClient};
use ap_core::{Config, SystemClock};
use ap_engine::preflight::{self, PreflightCheck};
use ap_engine::{Orchestrator, OrchestratorDeps};
use ap_storage::Store;
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const CONFIG_RELATIVE: &str = ".autopilot/config.toml";
const DB_RELATIVE: &str = ".autopilot/autopilot.db";
const LOCK_RELATIVE: &str = ".autopilot/autopilot.lock";
const LOG_DIR_RELATIVE: &str = ".autopilot/logs";

/// `ap validate`: print every preflight check; non-zero exit on a blocking
/// failure.
pub async fn validate(project_path: &Path) -> anyhow::Result<ExitCode> {
    init_tracing(None);
    let config = load_config(project_path)?;
    let store = open_store(&config, project_path).ok().flatten();

    let tracker = match linear_credentials(store.as_deref()) {
        Some(header) => LinearClient::connect(&config.linear, header).await.ok(),
        None => None,
    };
    let codehost = github_credentials(store.as_deref()).map(GitHubClient::new);

    let checks =
        preflight::run_preflight(&config, project_path, tracker.as_ref(), codehost.as_ref()).await;
    print_checks(&checks);

    if preflight::has_blocking_failure(&checks) {
        Ok(ExitCode::FAILURE)
    } else {
        println!("\nproject is ready for `ap start`");
        Ok(ExitCode::SUCCESS)
    }
}

/// `ap start`: preflight, lock, wire the collaborators, run until a signal.
pub async fn start(project_path: &Path) -> anyhow::Result<ExitCode> {
    let state_dir = project_path.join(".autopilot");
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("cannot create {}", state_dir.display()))?;
    init_tracing(Some(&project_path.join(LOG_DIR_RELATIVE)));

    let config = load_config(project_path)?;

    // One orchestrator per project. The lock file holds the PID.
    let lock_path = project_path.join(LOCK_RELATIVE);
    let _lock = acquire_lock(&lock_path)?;

    let store = open_store(&config, project_path)?;

    let Some(linear_header) = linear_credentials(store.as_deref()) else {
        bail!("no Linear credentials: set LINEAR_API_KEY or store an OAuth token");
    };
    let tracker = LinearClient::connect(&config.linear, linear_header)
        .await
        .context("connecting to Linear")?;
    let codehost = github_credentials(store.as_deref()).map(GitHubClient::new);

    let checks =
        preflight::run_preflight(&config, project_path, Some(&tracker), codehost.as_ref()).await;
    print_checks(&checks);
    if preflight::has_blocking_failure(&checks) {
        bail!("preflight failed; fix the blocking checks above");
    }

    let repo_slug = preflight::project_repo_slug(&config, project_path).await;
    let orchestrator = Orchestrator::new(
        config,
        project_path.to_path_buf(),
        repo_slug,
        OrchestratorDeps {
            tracker: Arc::new(tracker),
            codehost: codehost.map(Arc::new),
            sdk: Arc::new(ClaudeSdk::new()),
            clock: SystemClock,
        },
        store,
    );

    let root = CancellationToken::new();
    install_signal_handlers(root.clone());
    orchestrator.run(root).await;
    Ok(ExitCode::SUCCESS)
}

fn load_config(project_path: &Path) -> anyhow::Result<Config> {
    let path = project_path.join(CONFIG_RELATIVE);
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    Config::load(&path).with_context(|| format!("loading {}", path.display()))
}

fn open_store(config: &Config, project_path: &Path) -> anyhow::Result<Option<Arc<Store>>> {
    if !config.persistence.enabled {
        return Ok(None);
    }
    let path = config
        .persistence
        .db_path
        .clone()
        .unwrap_or_else(|| project_path.join(DB_RELATIVE));
    let store = Store::open(&path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Some(Arc::new(store)))
}

/// Linear auth header: raw API key from the environment, or a stored OAuth
/// bearer token.
fn linear_credentials(store: Option<&Store>) -> Option<String> {
    if let Ok(key) = std::env::var("LINEAR_API_KEY") {
        if !key.is_empty() {
            return Some(key);
        }
    }
    let token = store?.oauth_token("linear").ok().flatten()?;
    Some(format!("Bearer {}", token.access_token))
}

fn github_credentials(store: Option<&Store>) -> Option<String> {
    for key in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(key) {
            if !token.is_empty() {
                return Some(token);
            }
        }
    }
    let token = store?.oauth_token("github").ok().flatten()?;
    Some(token.access_token)
}

fn acquire_lock(path: &Path) -> anyhow::Result<File> {
    // Open without truncating: the file may belong to a running instance.
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("opening lock file {}", path.display()))?;
    file.try_lock_exclusive()
        .with_context(|| format!("another orchestrator holds {}", path.display()))?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

fn install_signal_handlers(root: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    tracing::error!(error = %err, "cannot install SIGTERM handler");
                    let _ = ctrl_c.await;
                    root.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT received"),
                _ = sigterm.recv() => tracing::info!("SIGTERM received"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("SIGINT received");
        }
        root.cancel();
    });
}

fn init_tracing(log_dir: Option<&PathBuf>) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("AP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "autopilot.log");
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(appender)
                .with_ansi(false)
                .finish();
            if tracing::subscriber::set_global_default(subscriber).is_err() {
                tracing::debug!("tracing already initialized");
            }
        }
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            if tracing::subscriber::set_global_default(subscriber).is_err() {
                tracing::debug!("tracing already initialized");
            }
        }
    }
}

fn print_checks(checks: &[PreflightCheck]) {
    println!("preflight:");
    for check in checks {
        let mark = if check.ok {
            "  ok "
        } else if check.blocking {
            " FAIL"
        } else {
            " warn"
        };
        println!("{mark}  {:<14} {}", check.name, check.detail);
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
