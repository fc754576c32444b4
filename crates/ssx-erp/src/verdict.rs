//! The merge decision, separated from IO.

use ssx_schemas::{Order, OrderStatus, Shipment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeVerdict {
    /// Newer than the stored snapshot (or nothing stored yet).
    Advance,
    /// Not newer, but carries a different status. Applied as-is.
    StaleStatusChange,
    /// Not newer and same status: a replay. Order is flagged corrupted.
    FlagCorrupted,
}

impl MergeVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeVerdict::Advance => "ADVANCE",
            MergeVerdict::StaleStatusChange => "STALE_STATUS_CHANGE",
            MergeVerdict::FlagCorrupted => "FLAG_CORRUPTED",
        }
    }
}

pub fn judge(order: &Order, incoming: &Shipment) -> MergeVerdict {
    let Some(stored_ts) = order.shipment_last_updated() else {
        return MergeVerdict::Advance;
    };
    if incoming.last_updated > stored_ts {
        return MergeVerdict::Advance;
    }
    if order.status.matches(incoming.status.as_deref()) {
        MergeVerdict::FlagCorrupted
    } else {
        MergeVerdict::StaleStatusChange
    }
}

/// Status the order ends up with under `verdict`.
pub fn next_status(verdict: MergeVerdict, incoming: &Shipment) -> OrderStatus {
    match verdict {
        MergeVerdict::FlagCorrupted => OrderStatus::Corrupted,
        MergeVerdict::Advance | MergeVerdict::StaleStatusChange => {
            OrderStatus::from_shipment_status(incoming.status.as_deref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::Map;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn shipment(status: &str, ts: DateTime<Utc>) -> Shipment {
        Shipment {
            id: "SHP-1".into(),
            status: Some(status.into()),
            last_updated: ts,
            order_id: Some("ORD-1".into()),
            fields: Map::new(),
        }
    }

    fn stored(status: &str, ts: DateTime<Utc>) -> Order {
        let mut o = Order::new("ORD-1");
        o.status = OrderStatus::Tracking(status.into());
        o.shipment = Some(shipment(status, ts));
        o
    }

    #[test]
    fn same_status_older_snapshot_is_flagged() {
        let o = stored("SHIPPED", t());
        let s = shipment("SHIPPED", t() - Duration::milliseconds(1));
        assert_eq!(judge(&o, &s), MergeVerdict::FlagCorrupted);
        assert_eq!(next_status(judge(&o, &s), &s), OrderStatus::Corrupted);
    }

    #[test]
    fn equal_timestamp_counts_as_not_newer() {
        let o = stored("SHIPPED", t());
        assert_eq!(judge(&o, &shipment("SHIPPED", t())), MergeVerdict::FlagCorrupted);
    }

    #[test]
    fn older_snapshot_with_new_status_overwrites() {
        let o = stored("SHIPPED", t());
        let s = shipment("DELIVERED", t() - Duration::seconds(1));
        assert_eq!(judge(&o, &s), MergeVerdict::StaleStatusChange);
        assert_eq!(
            next_status(judge(&o, &s), &s),
            OrderStatus::Tracking("DELIVERED".into())
        );
    }

    #[test]
    fn newer_snapshot_advances() {
        let o = stored("SHIPPED", t());
        let s = shipment("SHIPPED", t() + Duration::seconds(1));
        assert_eq!(judge(&o, &s), MergeVerdict::Advance);
    }

    #[test]
    fn order_without_snapshot_always_advances() {
        let o = Order::new("ORD-1");
        assert_eq!(judge(&o, &shipment("PENDING", t())), MergeVerdict::Advance);
    }

    #[test]
    fn corrupted_order_replay_compares_as_strings() {
        let mut o = stored("SHIPPED", t());
        o.status = OrderStatus::Corrupted;
        let s = shipment("SHIPPED", t() - Duration::seconds(5));
        assert_eq!(judge(&o, &s), MergeVerdict::StaleStatusChange);
    }
}
