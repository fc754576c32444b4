use chrono::{DateTime, Utc};
use ssx_schemas::ShipmentRecord;
use tracing::warn;

/// Records whose `last_updated` is at or after `since` (inclusive).
///
/// Naive timestamps compare as UTC. A stored record with a missing or
/// unparsable timestamp can never satisfy the bound; it is logged and left
/// out rather than failing the whole query.
pub fn filter_since(records: &[ShipmentRecord], since: Option<DateTime<Utc>>) -> Vec<ShipmentRecord> {
    let Some(since) = since else {
        return Vec::new();
    };

    records
        .iter()
        .filter(|rec| match rec.last_updated() {
            Some(Ok(ts)) => ts >= since,
            Some(Err(e)) => {
                warn!(shipment_id = rec.id().as_deref().unwrap_or("<none>"), error = %e, "skipping stored shipment");
                false
            }
            None => {
                warn!(shipment_id = rec.id().as_deref().unwrap_or("<none>"), "stored shipment has no last_updated");
                false
            }
        })
        .cloned()
        .collect()
}
