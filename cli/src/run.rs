//! Command bodies: drive a [`SessionStore`] until the engine has answered.

use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use modelsmith_session::{
    ConnectionState, DiagnosticSet, GenerateError, GenerationHandle, GenerationStatus,
    SessionStore,
};
use modelsmith_types::Revision;

pub async fn check(store: &mut SessionStore, file: &Path, wait: Duration) -> Result<ExitCode> {
    submit_and_wait(store, file, wait).await?;
    print_report(file, store.diagnostics());
    Ok(if store.error_count() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

pub async fn generate(store: &mut SessionStore, file: &Path, wait: Duration) -> Result<ExitCode> {
    submit_and_wait(store, file, wait).await?;
    print_report(file, store.diagnostics());

    let handle = match store.generate().await {
        Ok(handle) => handle,
        Err(GenerateError::BlockedByErrors { errors }) => {
            eprintln!("Generation blocked: fix {errors} error(s) first");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("failed to request generation"),
    };
    tracing::info!(id = %handle.id(), revision = %handle.revision(), "Waiting for generation");

    match wait_for_outcome(store, &handle).await {
        GenerationStatus::Succeeded(artifact) => {
            println!("{}", artifact.reference);
            if let Some(summary) = artifact.summary {
                println!("{summary}");
            }
            Ok(ExitCode::SUCCESS)
        }
        GenerationStatus::Failed(failure) => {
            eprintln!("{failure}");
            Ok(ExitCode::FAILURE)
        }
        other => {
            eprintln!("Generation {other}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn submit_and_wait(store: &mut SessionStore, file: &Path, wait: Duration) -> Result<Revision> {
    let document = fs::read_to_string(file)
        .with_context(|| format!("failed to read model file {}", file.display()))?;

    store.open()?;
    let (revision, _) = store.edit(document).await?;
    wait_for_diagnostics(store, revision, wait).await?;
    Ok(revision)
}

/// Process session events until diagnostics for `revision` are installed.
pub async fn wait_for_diagnostics(
    store: &mut SessionStore,
    revision: Revision,
    wait: Duration,
) -> Result<()> {
    let waiting = async {
        while store.diagnostics().revision() < revision {
            if !store.process_next_event().await {
                bail!("session stopped before diagnostics arrived");
            }
            if store.state() == ConnectionState::Disconnected {
                return Err(match store.last_connection_error() {
                    Some(e) => anyhow!(e.clone()),
                    None => anyhow!("session disconnected"),
                });
            }
        }
        Ok(())
    };

    tokio::time::timeout(wait, waiting)
        .await
        .with_context(|| format!("no diagnostics for {revision} within {}s", wait.as_secs()))?
}

/// Process session events until `handle` reaches a terminal status.
pub async fn wait_for_outcome(store: &mut SessionStore, handle: &GenerationHandle) -> GenerationStatus {
    loop {
        let status = handle.status();
        if status.is_terminal() {
            return status;
        }
        if !store.process_next_event().await {
            return handle.outcome().await;
        }
    }
}

fn print_report(file: &Path, diagnostics: &DiagnosticSet) {
    for line in report_lines(file, diagnostics) {
        println!("{line}");
    }
}

fn report_lines(file: &Path, diagnostics: &DiagnosticSet) -> Vec<String> {
    let mut lines: Vec<String> = diagnostics
        .iter()
        .map(|d| format!("{}:{}", file.display(), d.display_line()))
        .collect();
    let summary = diagnostics.counts().summary();
    lines.push(if summary.is_empty() {
        "No problems found".to_string()
    } else {
        summary
    });
    lines
}
