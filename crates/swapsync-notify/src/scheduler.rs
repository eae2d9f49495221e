//! # Scheduler
//!
//! Periodic jobs, in the same processor/handle shape as the dispatcher.
//!
//! ```text
//! every tick ──► notify_due_repairs(now)          in-app notices, once each
//!     │
//!     └─ first tick at/after broadcast_hour each local day
//!          ├─ 1st of month   ─► "welcome to <Month>" to every active manager
//!          └─ public holiday ─► "happy <Holiday>"   to every active manager
//! ```
//!
//! The broadcast date is remembered in memory only; a restart after the
//! broadcast hour sends that day's greetings again.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use swapsync_core::calendar::{ghana_holiday, is_month_start};
use swapsync_core::DEFAULT_SMS_SENDER;
use swapsync_db::{RepairRepository, UserRepository};

use crate::config::NotifyConfig;
use crate::error::{NotifyError, NotifyResult};
use crate::gateway::SmsGateway;
use crate::templates;

/// A greeting due today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broadcast {
    /// Month name, e.g. `March`.
    NewMonth(String),
    Holiday(&'static str),
}

impl Broadcast {
    fn body(&self, manager_name: &str) -> String {
        match self {
            Broadcast::NewMonth(month) => templates::new_month_message(manager_name, month),
            Broadcast::Holiday(holiday) => templates::holiday_message(manager_name, holiday),
        }
    }
}

/// Greetings to send at `now`, or `None` when the daily job should not
/// run yet (before `hour`, or already ran for this date).
///
/// `Some(vec![])` still marks the date as handled.
pub fn broadcasts_due(last: Option<NaiveDate>, now: NaiveDateTime, hour: u32) -> Option<Vec<Broadcast>> {
    let today = now.date();
    if now.hour() < hour || last == Some(today) {
        return None;
    }

    let mut due = Vec::new();
    if is_month_start(today) {
        due.push(Broadcast::NewMonth(today.format("%B").to_string()));
    }
    if let Some(holiday) = ghana_holiday(today) {
        due.push(Broadcast::Holiday(holiday));
    }
    Some(due)
}

/// Handle for stopping the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Scheduler already stopped");
        }
    }
}

/// Due-repair reminders and manager broadcasts.
#[derive(Debug)]
pub struct Scheduler {
    repairs: RepairRepository,
    users: UserRepository,
    gateway: Arc<SmsGateway>,
    config: NotifyConfig,
    last_broadcast: Option<NaiveDate>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Scheduler {
    /// Creates a scheduler and returns a handle.
    pub fn new(
        repairs: RepairRepository,
        users: UserRepository,
        gateway: Arc<SmsGateway>,
        config: &NotifyConfig,
    ) -> (Self, SchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let scheduler = Scheduler {
            repairs,
            users,
            gateway,
            config: config.clone().normalized(),
            last_broadcast: None,
            shutdown_rx,
        };
        (scheduler, SchedulerHandle { shutdown_tx })
    }

    /// Runs the scheduler loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(tick = ?self.config.scheduler_tick, "Scheduler starting");

        let mut interval = tokio::time::interval(self.config.scheduler_tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now(), Local::now().naive_local()).await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Scheduler shutting down");
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// One pass of every job. `local` is the shop's wall-clock time.
    pub async fn tick(&mut self, now: DateTime<Utc>, local: NaiveDateTime) {
        match self.repairs.notify_due_repairs(now).await {
            Ok(0) => {}
            Ok(count) => info!(count, "Due-repair reminders created"),
            Err(e) => error!(?e, "Due-repair check failed"),
        }

        if let Some(due) = broadcasts_due(self.last_broadcast, local, self.config.broadcast_hour) {
            // The date is only recorded once the manager list was read, so a
            // failed lookup retries on the next tick.
            match self.broadcast(&due).await {
                Ok(()) => self.last_broadcast = Some(local.date()),
                Err(e) => error!(?e, "Manager broadcast failed, retrying next tick"),
            }
        }
    }

    async fn broadcast(&self, due: &[Broadcast]) -> NotifyResult<()> {
        if due.is_empty() {
            return Ok(());
        }
        let managers = self.users.active_managers_with_phone().await?;
        info!(broadcasts = due.len(), managers = managers.len(), "Sending manager broadcasts");

        for manager in &managers {
            let Some(phone) = manager.phone_number.as_deref() else {
                continue;
            };
            for broadcast in due {
                let body = broadcast.body(&manager.full_name);
                match self.gateway.send(phone, &body, DEFAULT_SMS_SENDER).await {
                    Ok(delivery) => {
                        info!(manager = manager.id, provider = delivery.provider, ?broadcast, "Broadcast sent")
                    }
                    Err(NotifyError::SmsDisabled) => {
                        debug!("SMS disabled, skipping broadcasts");
                        return Ok(());
                    }
                    Err(err) => warn!(manager = manager.id, error = %err, "Broadcast not delivered"),
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use swapsync_core::{Actor, Role};
    use swapsync_db::{Database, DbConfig, NewUser};

    use crate::provider::fakes::FakeProvider;
    use crate::provider::SmsProvider;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_broadcasts_due() {
        // Before the hour
        assert_eq!(broadcasts_due(None, at(2024, 3, 6, 7), 8), None);

        assert_eq!(
            broadcasts_due(None, at(2024, 3, 6, 8), 8),
            Some(vec![Broadcast::Holiday("Independence Day")])
        );
        assert_eq!(
            broadcasts_due(None, at(2024, 4, 1, 9), 8),
            Some(vec![Broadcast::NewMonth("April".into())])
        );
        assert_eq!(broadcasts_due(None, at(2024, 4, 2, 9), 8), Some(vec![]));

        // Already handled today
        let today = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        assert_eq!(broadcasts_due(Some(today), at(2024, 3, 6, 12), 8), None);
    }

    #[test]
    fn test_new_year_sends_both() {
        let due = broadcasts_due(None, at(2025, 1, 1, 8), 8).unwrap();
        assert_eq!(
            due,
            vec![
                Broadcast::NewMonth("January".into()),
                Broadcast::Holiday("New Year's Day")
            ]
        );
    }

    #[tokio::test]
    async fn test_tick_broadcasts_once_per_day() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let admin = db.users().bootstrap_super_admin("admin", "changeme123", "Admin").await.unwrap();
        let admin = Actor::new(admin.id, Role::SuperAdmin, None);
        db.users()
            .create_user(
                &admin,
                NewUser {
                    username: "kofi".into(),
                    password: "changeme123".into(),
                    full_name: "Kofi Mensah".into(),
                    email: None,
                    phone_number: Some("0241234567".into()),
                    role: Role::Manager,
                    company_name: Some("Kofi Phones".into()),
                    use_company_sms_branding: false,
                },
            )
            .await
            .unwrap();

        let provider = Arc::new(FakeProvider::ok("arkesel"));
        let gateway = Arc::new(SmsGateway::with_providers(vec![provider.clone() as Arc<dyn SmsProvider>]));
        let (mut scheduler, _handle) =
            Scheduler::new(db.repairs(), db.users(), gateway, &NotifyConfig::default());

        let local = at(2024, 3, 6, 9);
        let now = local.and_utc();
        scheduler.tick(now, local).await;
        scheduler.tick(now, at(2024, 3, 6, 10)).await;

        assert_eq!(provider.calls(), 1);
        let sent = provider.sent();
        assert_eq!(sent[0].phone_number, "233241234567");
        assert_eq!(sent[0].sender_id, DEFAULT_SMS_SENDER);
        assert!(sent[0].body.contains("Independence Day"));
        assert!(sent[0].body.contains("Kofi Mensah"));
    }

    #[tokio::test]
    async fn test_failed_manager_lookup_retries_next_tick() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let provider = Arc::new(FakeProvider::ok("arkesel"));
        let gateway = Arc::new(SmsGateway::with_providers(vec![provider.clone() as Arc<dyn SmsProvider>]));
        let (mut scheduler, _handle) =
            Scheduler::new(db.repairs(), db.users(), gateway, &NotifyConfig::default());

        // Lookup fails while the users table is gone.
        sqlx::query("ALTER TABLE users RENAME TO users_away")
            .execute(db.pool())
            .await
            .unwrap();
        let local = at(2024, 3, 6, 9);
        scheduler.tick(local.and_utc(), local).await;
        assert_eq!(scheduler.last_broadcast, None);

        sqlx::query("ALTER TABLE users_away RENAME TO users")
            .execute(db.pool())
            .await
            .unwrap();
        let admin = db.users().bootstrap_super_admin("admin", "changeme123", "Admin").await.unwrap();
        let admin = Actor::new(admin.id, Role::SuperAdmin, None);
        db.users()
            .create_user(
                &admin,
                NewUser {
                    username: "ama".into(),
                    password: "changeme123".into(),
                    full_name: "Ama Owusu".into(),
                    email: None,
                    phone_number: Some("0201112222".into()),
                    role: Role::Manager,
                    company_name: Some("Ama Mobile".into()),
                    use_company_sms_branding: false,
                },
            )
            .await
            .unwrap();

        let later = at(2024, 3, 6, 10);
        scheduler.tick(later.and_utc(), later).await;
        assert_eq!(scheduler.last_broadcast, NaiveDate::from_ymd_opt(2024, 3, 6));
        assert_eq!(provider.calls(), 1);
        assert!(provider.sent()[0].body.contains("Ama Owusu"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gateway = Arc::new(SmsGateway::with_providers(Vec::new()));
        let (scheduler, handle) = Scheduler::new(db.repairs(), db.users(), gateway, &NotifyConfig::default());

        let task = tokio::spawn(scheduler.run());
        handle.shutdown().await;
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
