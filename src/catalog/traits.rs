use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Order and inventory totals reported by the dashboard intent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShopCounts {
    pub orders: u64,
    pub inventory_items: u64,
}

/// Supplies current shop counts to the fulfillment handler.
#[async_trait]
pub trait CountsSource: Send + Sync {
    async fn counts(&self) -> Result<ShopCounts>;
    fn name(&self) -> &str;
}
