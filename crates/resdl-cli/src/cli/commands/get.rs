//! `resdl get` – download or resume files, printing progress until done or Ctrl-C.

use anyhow::{Context, Result};
use resdl_core::chunk_store::SqliteChunkStore;
use resdl_core::config::ResdlConfig;
use resdl_core::progress::ProgressSnapshot;
use resdl_core::{DirectoryDelivery, DownloadEngine, EngineConfig, TransferEvent, TransferState};
use std::path::PathBuf;
use std::sync::Arc;

use super::format_bytes;

fn progress_line(file: &str, snap: &ProgressSnapshot) -> String {
    let pct = snap
        .percentage
        .map(|p| format!("{p:5.1}%"))
        .unwrap_or_else(|| "  ?  ".to_string());
    let total = snap
        .total
        .map(format_bytes)
        .unwrap_or_else(|| "?".to_string());
    let eta = snap
        .eta_secs
        .map(|s| format!("{s:.0}s"))
        .unwrap_or_else(|| "?".to_string());
    format!(
        "{file}: {pct}  {} / {total}  {}/s  ETA {eta}",
        format_bytes(snap.downloaded),
        format_bytes(snap.bytes_per_sec as u64),
    )
}

pub async fn run_get(
    cfg: &ResdlConfig,
    store: SqliteChunkStore,
    names: &[String],
    server: Option<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut cfg = cfg.clone();
    if let Some(server) = server {
        cfg.server_url = server;
    }
    let engine_cfg = EngineConfig::from_config(&cfg)?;
    let out_dir = match out.or(cfg.download_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("current directory")?,
    };
    let engine = DownloadEngine::new(
        engine_cfg,
        Arc::new(store),
        Arc::new(DirectoryDelivery::new(&out_dir)),
    )?;

    let restored = engine.restore().await?;
    for name in names.iter().filter(|n| restored.contains(*n)) {
        if let Some(snap) = engine.progress(name) {
            println!("resuming {}", progress_line(name, &snap));
        }
    }

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TransferEvent::Progress { file, snapshot }) => {
                    println!("{}", progress_line(&file, &snapshot));
                }
                Ok(TransferEvent::Failed { file, error }) => eprintln!("{file}: {error}"),
                Ok(TransferEvent::StateChanged { .. }) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    for name in names {
        engine.start(name);
    }

    let finished = async {
        let mut states = Vec::with_capacity(names.len());
        for name in names {
            states.push((name, engine.wait(name).await));
        }
        states
    };

    let states = tokio::select! {
        states = finished => states,
        _ = tokio::signal::ctrl_c() => {
            let mut states = Vec::with_capacity(names.len());
            for name in names {
                states.push((name, engine.pause(name).await));
            }
            states
        }
    };
    printer.abort();

    let mut failed = 0usize;
    for (name, state) in states {
        match state {
            TransferState::Completed => println!("{name}: saved to {}", out_dir.display()),
            TransferState::Paused => {
                println!("{name}: paused; run `resdl get {name}` again to resume")
            }
            TransferState::Error => {
                failed += 1;
                let error = engine.last_error(name).unwrap_or_default();
                println!("{name}: failed: {error}");
            }
            other => println!("{name}: {other}"),
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} transfer(s) failed", failed, names.len());
    }
    Ok(())
}
