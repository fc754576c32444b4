//! Order fixtures: a JSON document `{"orders": [...]}` used to seed a store.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use ssx_schemas::Order;

use crate::store::{OrderStore, StoreResult};

#[derive(Deserialize)]
struct OrdersDoc {
    #[serde(default)]
    orders: Vec<Order>,
}

pub fn load_orders_fixture(path: &Path) -> Result<Vec<Order>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read orders fixture: {}", path.display()))?;
    let doc: OrdersDoc = serde_json::from_str(&raw)
        .with_context(|| format!("parse orders fixture: {}", path.display()))?;
    Ok(doc.orders)
}

/// Upsert every order. Returns how many were written.
pub async fn seed_orders(store: &dyn OrderStore, orders: &[Order]) -> StoreResult<usize> {
    for order in orders {
        store.save_order(order).await?;
    }
    Ok(orders.len())
}
