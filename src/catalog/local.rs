//! Counts sources backed by local JSON data files.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use super::traits::{CountsSource, ShopCounts};

pub const ORDERS_FILE: &str = "orders.json";
pub const INVENTORY_FILE: &str = "inventory.json";

/// Counts the records in `orders.json` and `inventory.json` under a data
/// directory. A missing file or a non-array document counts as zero.
pub struct LocalJsonCatalog {
    data_dir: PathBuf,
}

impl LocalJsonCatalog {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}

async fn count_records(path: &Path) -> Result<u64> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    Ok(value.as_array().map_or(0, |items| items.len() as u64))
}

#[async_trait]
impl CountsSource for LocalJsonCatalog {
    async fn counts(&self) -> Result<ShopCounts> {
        let orders_path = self.data_dir.join(ORDERS_FILE);
        let inventory_path = self.data_dir.join(INVENTORY_FILE);
        let (orders, inventory_items) = tokio::try_join!(
            count_records(&orders_path),
            count_records(&inventory_path),
        )?;
        Ok(ShopCounts {
            orders,
            inventory_items,
        })
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Fixed counts, independent of any data store.
pub struct StaticCounts(pub ShopCounts);

#[async_trait]
impl CountsSource for StaticCounts {
    async fn counts(&self) -> Result<ShopCounts> {
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Remembers the last successful reading of an inner source and serves it
/// (or zeros, before any success) when the source fails.
pub struct LastKnownCounts {
    inner: Box<dyn CountsSource>,
    last: Mutex<ShopCounts>,
}

impl LastKnownCounts {
    pub fn new(inner: Box<dyn CountsSource>) -> Self {
        Self {
            inner,
            last: Mutex::new(ShopCounts::default()),
        }
    }

    /// Never fails: a source error falls back to the last known counts.
    pub async fn current(&self) -> ShopCounts {
        match self.inner.counts().await {
            Ok(counts) => {
                *self.last.lock() = counts;
                counts
            }
            Err(error) => {
                let last = *self.last.lock();
                tracing::warn!(
                    source = self.inner.name(),
                    orders = last.orders,
                    inventory_items = last.inventory_items,
                    "Counts source failed, using last known counts: {error:#}"
                );
                last
            }
        }
    }
}

#[async_trait]
impl CountsSource for LastKnownCounts {
    async fn counts(&self) -> Result<ShopCounts> {
        Ok(self.current().await)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
