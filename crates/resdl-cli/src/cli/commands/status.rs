//! `resdl status` – list partially downloaded files.

use anyhow::Result;
use resdl_core::chunk_store::{ChunkStore, StoredTransfer};

use super::format_bytes;

/// Extra column text for transfers that need no more downloading.
fn note(t: &StoredTransfer) -> &'static str {
    if t.is_complete() {
        "  (downloaded; `resdl get` finalizes)"
    } else {
        ""
    }
}

pub async fn run_status(store: &dyn ChunkStore) -> Result<()> {
    let names = store.list_files().await?;
    if names.is_empty() {
        println!("No stored transfers.");
        return Ok(());
    }
    println!("{:<32} {:>12} {:>12} {:>7}", "FILE", "STORED", "TOTAL", "DONE");
    for name in names {
        let Some(t) = store.stored_transfer(&name).await? else {
            continue;
        };
        let total = t
            .total_size
            .map(format_bytes)
            .unwrap_or_else(|| "-".to_string());
        let pct = t
            .percentage()
            .map(|p| format!("{p:.1}%"))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:<32} {:>12} {:>12} {:>7}{}",
            t.file_name,
            format_bytes(t.downloaded),
            total,
            pct,
            note(&t)
        );
    }
    Ok(())
}
