//! Read-only boundary over the historical records store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{SubjectId, TenantId};

/// Lifecycle status of a historical order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Confirmed,
    Completed,
    Shipped,
    Delivered,
}

impl OrderStatus {
    /// Consumption-relevant: the goods actually moved.
    pub fn is_fulfilled(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }

    /// Replenishment-relevant: still in flight.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Confirmed
        )
    }
}

/// One historical order line for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub quantity: i64,
    pub ordered_at: DateTime<Utc>,
    pub status: OrderStatus,
}

/// Basic subject information, as known to the records store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_id: SubjectId,
    pub name: String,
    pub available_quantity: i64,
}

/// Read-only access to order/consumption history, queryable by subject,
/// tenant and date range. Implementations must be tolerant of subjects with
/// no history at all.
pub trait HistoryStore: Send + Sync {
    fn subject(&self, tenant_id: TenantId, subject_id: SubjectId) -> Option<SubjectRecord>;

    /// Fulfilled (completed/shipped/delivered) orders with
    /// `from <= ordered_at < to`.
    fn fulfilled_orders(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<OrderRecord>;

    /// All orders still in flight (pending/processing/confirmed).
    fn open_orders(&self, tenant_id: TenantId, subject_id: SubjectId) -> Vec<OrderRecord>;
}

impl<S> HistoryStore for Arc<S>
where
    S: HistoryStore + ?Sized,
{
    fn subject(&self, tenant_id: TenantId, subject_id: SubjectId) -> Option<SubjectRecord> {
        (**self).subject(tenant_id, subject_id)
    }

    fn fulfilled_orders(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<OrderRecord> {
        (**self).fulfilled_orders(tenant_id, subject_id, from, to)
    }

    fn open_orders(&self, tenant_id: TenantId, subject_id: SubjectId) -> Vec<OrderRecord> {
        (**self).open_orders(tenant_id, subject_id)
    }
}

/// In-memory history store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    subjects: RwLock<HashMap<(TenantId, SubjectId), SubjectRecord>>,
    orders: RwLock<HashMap<(TenantId, SubjectId), Vec<OrderRecord>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn put_subject(&self, tenant_id: TenantId, record: SubjectRecord) {
        if let Ok(mut map) = self.subjects.write() {
            map.insert((tenant_id, record.subject_id), record);
        }
    }

    pub fn record_order(&self, tenant_id: TenantId, subject_id: SubjectId, order: OrderRecord) {
        if let Ok(mut map) = self.orders.write() {
            map.entry((tenant_id, subject_id)).or_default().push(order);
        }
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn subject(&self, tenant_id: TenantId, subject_id: SubjectId) -> Option<SubjectRecord> {
        self.subjects
            .read()
            .ok()?
            .get(&(tenant_id, subject_id))
            .cloned()
    }

    fn fulfilled_orders(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<OrderRecord> {
        let map = match self.orders.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        map.get(&(tenant_id, subject_id))
            .map(|orders| {
                orders
                    .iter()
                    .filter(|o| o.status.is_fulfilled() && o.ordered_at >= from && o.ordered_at < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn open_orders(&self, tenant_id: TenantId, subject_id: SubjectId) -> Vec<OrderRecord> {
        let map = match self.orders.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        map.get(&(tenant_id, subject_id))
            .map(|orders| {
                orders
                    .iter()
                    .filter(|o| o.status.is_open())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fulfilled_query_honors_range_and_status() {
        let store = InMemoryHistoryStore::new();
        let tenant = TenantId::new();
        let subject = SubjectId::new();
        let now = Utc::now();

        store.record_order(
            tenant,
            subject,
            OrderRecord {
                quantity: 10,
                ordered_at: now - Duration::days(3),
                status: OrderStatus::Delivered,
            },
        );
        store.record_order(
            tenant,
            subject,
            OrderRecord {
                quantity: 7,
                ordered_at: now - Duration::days(3),
                status: OrderStatus::Pending,
            },
        );
        store.record_order(
            tenant,
            subject,
            OrderRecord {
                quantity: 4,
                ordered_at: now - Duration::days(20),
                status: OrderStatus::Shipped,
            },
        );

        let recent = store.fulfilled_orders(tenant, subject, now - Duration::days(7), now);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].quantity, 10);

        let open = store.open_orders(tenant, subject);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].quantity, 7);
    }

    #[test]
    fn unknown_subject_yields_empty_history() {
        let store = InMemoryHistoryStore::new();
        let tenant = TenantId::new();
        let subject = SubjectId::new();
        let now = Utc::now();

        assert!(store.subject(tenant, subject).is_none());
        assert!(store
            .fulfilled_orders(tenant, subject, now - Duration::days(30), now)
            .is_empty());
        assert!(store.open_orders(tenant, subject).is_empty());
    }

    #[test]
    fn tenants_are_isolated() {
        let store = InMemoryHistoryStore::new();
        let a = TenantId::new();
        let b = TenantId::new();
        let subject = SubjectId::new();

        store.put_subject(
            a,
            SubjectRecord {
                subject_id: subject,
                name: "rebar".to_string(),
                available_quantity: 3,
            },
        );

        assert!(store.subject(b, subject).is_none());
    }
}
