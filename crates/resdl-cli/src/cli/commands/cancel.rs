//! `resdl cancel` – discard stored chunks and metadata.

use anyhow::Result;
use resdl_core::chunk_store::ChunkStore;

pub async fn run_cancel(store: &dyn ChunkStore, names: &[String]) -> Result<()> {
    for name in names {
        let had_data = store.stored_transfer(name).await?.is_some();
        store.purge(name).await?;
        if had_data {
            println!("{name}: stored data discarded");
        } else {
            println!("{name}: nothing stored");
        }
    }
    Ok(())
}
