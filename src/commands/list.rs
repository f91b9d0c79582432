//! List command handlers.
//!
//! Print open records from a JSON store directory as pretty JSON on stdout.
//! Safe to run next to a live engine: nothing is written.

use std::path::Path;

use crate::store::{Filter, JsonFileStore, Record, Store};
use crate::orders::ManagedOrder;
use crate::positions::ManagedPosition;

/// Print open managed orders.
pub async fn run_list_orders(store_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let json = open_records_json::<ManagedOrder>(store_dir).await?;
    println!("{}", json);
    Ok(())
}

/// Print open managed positions.
pub async fn run_list_positions(store_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let json = open_records_json::<ManagedPosition>(store_dir).await?;
    println!("{}", json);
    Ok(())
}

async fn open_records_json<R: Record>(store_dir: &Path) -> Result<String, Box<dyn std::error::Error>> {
    if !store_dir.is_dir() {
        return Err(format!("store directory {} does not exist", store_dir.display()).into());
    }
    let store = JsonFileStore::<R>::open(store_dir).await?;
    let records = store.list(&Filter::open()).await?;
    Ok(serde_json::to_string_pretty(&records)?)
}
