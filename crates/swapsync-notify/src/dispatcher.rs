//! # SMS Dispatcher
//!
//! Moves engine notifications off the request path and onto a pool of
//! worker tasks.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Dispatch Flow                                    │
//! │                                                                         │
//! │  Repository commit                                                      │
//! │       │ publish(Notification)          (never blocks, never fails)      │
//! │       ▼                                                                 │
//! │  DispatcherHandle ── try_send ──► bounded queue ── full? ─► warn, drop  │
//! │                                        │                                │
//! │                        ┌───────────────┼───────────────┐                │
//! │                        ▼               ▼               ▼                │
//! │                    worker 0        worker 1   …    worker N-1           │
//! │                        │                                                │
//! │                        ├─► templates::render                            │
//! │                        ├─► SmsGateway::send (Arkesel → Hubtel)          │
//! │                        └─► ok: mark sms_sent on the originating record  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery failures are logged and the job is dropped. The business
//! record that produced the event is already committed and stays valid.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use swapsync_core::{Notification, NotificationSink};
use swapsync_db::NotificationRepository;

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::gateway::SmsGateway;
use crate::templates;

/// One queued SMS.
#[derive(Debug, Clone)]
pub struct SmsJob {
    /// Correlates the enqueue and delivery log lines.
    pub id: Uuid,
    pub notification: Notification,
}

impl SmsJob {
    pub fn new(notification: Notification) -> Self {
        SmsJob {
            id: Uuid::new_v4(),
            notification,
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Publishing side of the queue. Cheap to clone; install it on the
/// [`Database`](swapsync_db::Database) as the notification sink.
#[derive(Clone)]
pub struct DispatcherHandle {
    queue: mpsc::Sender<SmsJob>,
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("capacity", &self.queue.capacity())
            .finish()
    }
}

impl DispatcherHandle {
    /// Queues a job, failing if the queue is full or closed.
    pub fn enqueue(&self, notification: Notification) -> Result<Uuid, NotifyError> {
        let job = SmsJob::new(notification);
        let id = job.id;
        self.queue.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(job) => {
                warn!(job_id = %job.id, origin = ?job.notification.origin(), "SMS queue full, dropping job");
                NotifyError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => NotifyError::QueueClosed,
        })?;
        debug!(job_id = %id, "SMS job queued");
        Ok(id)
    }
}

impl NotificationSink for DispatcherHandle {
    fn publish(&self, notification: Notification) {
        if let Err(err) = self.enqueue(notification) {
            debug!(error = %err, "Notification not queued");
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Owns the worker tasks. Dropping it without [`shutdown`](Self::shutdown)
/// also stops the workers.
#[derive(Debug)]
pub struct SmsDispatcher {
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SmsDispatcher {
    /// Spawns the workers and returns the dispatcher with its handle.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(
        gateway: Arc<SmsGateway>,
        notifications: NotificationRepository,
        config: &NotifyConfig,
    ) -> (Self, DispatcherHandle) {
        let config = config.clone().normalized();
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let workers = (0..config.workers)
            .map(|index| {
                let worker = Worker {
                    index,
                    queue: Arc::clone(&queue_rx),
                    gateway: Arc::clone(&gateway),
                    notifications: notifications.clone(),
                    shutdown_rx: shutdown_rx.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(workers = config.workers, capacity = config.queue_capacity, "SMS dispatcher started");

        (
            SmsDispatcher { workers, shutdown_tx },
            DispatcherHandle { queue: queue_tx },
        )
    }

    /// Stops the workers and waits for them. Jobs still queued are dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "SMS worker ended abnormally");
            }
        }
        info!("SMS dispatcher stopped");
    }
}

struct Worker {
    index: usize,
    queue: Arc<Mutex<mpsc::Receiver<SmsJob>>>,
    gateway: Arc<SmsGateway>,
    notifications: NotificationRepository,
    shutdown_rx: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        debug!(worker = self.index, "SMS worker starting");

        loop {
            let job = tokio::select! {
                job = next_job(&self.queue) => job,
                _ = self.shutdown_rx.changed() => break,
            };
            let Some(job) = job else {
                break;
            };
            self.process(job).await;
        }

        debug!(worker = self.index, "SMS worker stopped");
    }

    async fn process(&self, job: SmsJob) {
        let notification = &job.notification;
        let body = templates::render(notification);

        match self
            .gateway
            .send(notification.phone_number(), &body, notification.sender())
            .await
        {
            Ok(delivery) => {
                info!(job_id = %job.id, provider = delivery.provider, "SMS sent");
                if let Err(err) = self.notifications.mark_sms_sent(notification.origin()).await {
                    warn!(job_id = %job.id, error = %err, "Failed to flag record as texted");
                }
            }
            Err(NotifyError::SmsDisabled) => {
                debug!(job_id = %job.id, "SMS disabled, job dropped");
            }
            Err(err) => {
                warn!(job_id = %job.id, origin = ?notification.origin(), error = %err, "SMS not delivered");
            }
        }
    }
}

async fn next_job(queue: &Mutex<mpsc::Receiver<SmsJob>>) -> Option<SmsJob> {
    queue.lock().await.recv().await
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use swapsync_core::money::Money;
    use swapsync_core::{Actor, PaymentMethod};
    use swapsync_db::{Database, DbConfig, NewPosItem, NewPosSale, NewProduct};

    use crate::provider::fakes::FakeProvider;
    use crate::provider::SmsProvider;

    async fn wait_for<F: Fn() -> bool>(done: F) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_receipt_sent_and_flagged() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let provider = Arc::new(FakeProvider::ok("arkesel"));
        let gateway = Arc::new(SmsGateway::with_providers(vec![provider.clone() as Arc<dyn SmsProvider>]));
        let (dispatcher, handle) = SmsDispatcher::start(gateway, db.notifications(), &NotifyConfig::default());
        let db = db.with_notifier(Arc::new(handle));

        let admin = db.users().bootstrap_super_admin("admin", "changeme123", "Admin").await.unwrap();
        let actor = Actor::new(admin.id, admin.role, None);
        let category = db.catalog().find_or_create_category("Chargers").await.unwrap();
        let product = db
            .products()
            .create_product(
                &actor,
                NewProduct {
                    name: "USB-C Charger".into(),
                    description: None,
                    sku: None,
                    barcode: None,
                    category_id: category.id,
                    brand: None,
                    cost_price: Money::from_major(30),
                    selling_price: Money::from_major(60),
                    quantity: 5,
                    min_stock_level: 1,
                },
            )
            .await
            .unwrap();

        let sale = db
            .pos_sales()
            .create_pos_sale(
                &actor,
                NewPosSale {
                    customer_name: Some("Ama".into()),
                    customer_phone: Some("0241234567".into()),
                    items: vec![NewPosItem {
                        product_id: product.id,
                        quantity: 1,
                        unit_price: Money::from_major(60),
                        discount_amount: Money::ZERO,
                    }],
                    payment_method: PaymentMethod::Cash,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        wait_for(|| provider.calls() == 1).await;
        assert_eq!(provider.sent()[0].phone_number, "233241234567");
        assert!(provider.sent()[0].body.contains(&sale.sale.transaction_id));

        dispatcher.shutdown().await;

        let flagged: bool = sqlx::query_scalar("SELECT sms_sent FROM pos_sales WHERE id = ?")
            .bind(sale.sale.id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(flagged);
    }

    #[tokio::test]
    async fn test_failed_delivery_leaves_flag_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let provider = Arc::new(FakeProvider::failing("arkesel"));
        let gateway = Arc::new(SmsGateway::with_providers(vec![provider.clone() as Arc<dyn SmsProvider>]));
        let (dispatcher, handle) = SmsDispatcher::start(gateway, db.notifications(), &NotifyConfig::default());

        handle.publish(Notification::RepairCompleted {
            repair_id: 1,
            tracking_code: "REP-20240115-AB12".into(),
            phone_number: "0241234567".into(),
            customer_name: "Kofi".into(),
            sender: "SwapSync".into(),
            company_name: "SwapSync".into(),
            phone_description: "Tecno Spark 10".into(),
            cost: Money::from_major(80),
        });

        wait_for(|| provider.calls() == 1).await;
        assert_eq!(provider.calls(), 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let (queue, mut rx) = mpsc::channel(1);
        let handle = DispatcherHandle { queue };
        let event = || Notification::RepairCompleted {
            repair_id: 1,
            tracking_code: "REP-20240115-AB12".into(),
            phone_number: "0241234567".into(),
            customer_name: "Kofi".into(),
            sender: "SwapSync".into(),
            company_name: "SwapSync".into(),
            phone_description: "Tecno Spark 10".into(),
            cost: Money::from_major(80),
        };

        assert!(handle.enqueue(event()).is_ok());
        assert!(matches!(handle.enqueue(event()), Err(NotifyError::QueueFull)));
        // publish swallows the error
        handle.publish(event());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_workers() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gateway = Arc::new(SmsGateway::with_providers(Vec::new()));
        let config = NotifyConfig {
            workers: 3,
            ..Default::default()
        };
        let (dispatcher, _handle) = SmsDispatcher::start(gateway, db.notifications(), &config);
        tokio::time::timeout(Duration::from_secs(2), dispatcher.shutdown())
            .await
            .unwrap();
    }
}
