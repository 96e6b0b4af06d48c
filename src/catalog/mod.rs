//! Shop data collaborator: order and inventory counts for the dashboard intent.

pub mod local;
pub mod traits;

pub use local::{LastKnownCounts, LocalJsonCatalog, StaticCounts};
pub use traits::{CountsSource, ShopCounts};

use crate::config::Config;

/// Factory: create the configured counts source, wrapped so that failures
/// fall back to the last known counts.
pub fn create_counts_source(config: &Config) -> anyhow::Result<LastKnownCounts> {
    let catalog = &config.catalog;
    let inner: Box<dyn CountsSource> = match catalog.source.trim().to_ascii_lowercase().as_str() {
        "local" => Box::new(LocalJsonCatalog::new(
            config.resolve_workspace_path(&catalog.data_dir),
        )),
        "static" => Box::new(StaticCounts(ShopCounts {
            orders: catalog.static_orders,
            inventory_items: catalog.static_inventory_items,
        })),
        other => anyhow::bail!("Unknown catalog.source '{other}'. Supported values: local, static"),
    };
    Ok(LastKnownCounts::new(inner))
}
