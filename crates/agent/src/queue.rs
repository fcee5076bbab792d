//! Explicit work queue between the trigger path and the pipeline worker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use stockpilot_core::{AlertId, TenantId};

/// One alert waiting for pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedAlert {
    pub tenant_id: TenantId,
    pub alert_id: AlertId,
}

/// FIFO queue of alerts awaiting execution.
///
/// Enqueue/dequeue are deliberately visible operations (not a detached
/// thread's side effect), so tests and operators can observe the backlog.
#[derive(Debug, Default)]
pub struct AlertQueue {
    inner: Mutex<VecDeque<QueuedAlert>>,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn enqueue(&self, item: QueuedAlert) {
        if let Ok(mut q) = self.inner.lock() {
            q.push_back(item);
        }
    }

    pub fn dequeue(&self) -> Option<QueuedAlert> {
        self.inner.lock().ok()?.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let queue = AlertQueue::new();
        let first = QueuedAlert {
            tenant_id: TenantId::new(),
            alert_id: AlertId::new(),
        };
        let second = QueuedAlert {
            tenant_id: TenantId::new(),
            alert_id: AlertId::new(),
        };

        queue.enqueue(first);
        queue.enqueue(second);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue(), Some(first));
        assert_eq!(queue.dequeue(), Some(second));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
    }
}
