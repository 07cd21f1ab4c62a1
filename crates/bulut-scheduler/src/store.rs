//! Subscription storage backends.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use bulut_db::queries::subscriptions as q;
use bulut_types::subscription::{Subscription, SubscriptionStatus};
use bulut_types::Address;
use rusqlite::Connection;

use crate::{Result, SubscriptionError};

/// Storage for subscriptions.
pub trait SubscriptionStore: Send + Sync {
    /// Insert unless the id exists. Returns whether a row was inserted.
    fn insert(&self, sub: &Subscription) -> Result<bool>;

    fn get(&self, id: &str) -> Result<Option<Subscription>>;

    fn list_by_subscriber(&self, subscriber: &Address, active_only: bool)
        -> Result<Vec<Subscription>>;

    fn list_active(&self) -> Result<Vec<Subscription>>;

    /// Set the status to `to` only if it is currently `from`, atomically.
    /// Returns whether the change was applied.
    fn swap_status(&self, id: &str, from: SubscriptionStatus, to: SubscriptionStatus)
        -> Result<bool>;

    /// Move the last payment date forward to `confirmed_at` (never back) and
    /// reset the failure counter.
    fn record_payment(&self, id: &str, confirmed_at: u64) -> Result<()>;

    fn record_failure(&self, id: &str) -> Result<()>;
}

/// Mutex-guarded in-memory store.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    subs: Mutex<HashMap<String, Subscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Subscription>>> {
        self.subs
            .lock()
            .map_err(|_| SubscriptionError::Store("subscription store lock poisoned".into()))
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Subscription)) -> Result<()> {
        let mut subs = self.lock()?;
        let sub = subs
            .get_mut(id)
            .ok_or_else(|| SubscriptionError::NotFound(id.to_string()))?;
        f(sub);
        Ok(())
    }
}

fn sorted(mut subs: Vec<Subscription>) -> Vec<Subscription> {
    subs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    subs
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn insert(&self, sub: &Subscription) -> Result<bool> {
        let mut subs = self.lock()?;
        if subs.contains_key(&sub.id) {
            return Ok(false);
        }
        subs.insert(sub.id.clone(), sub.clone());
        Ok(true)
    }

    fn get(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn list_by_subscriber(
        &self,
        subscriber: &Address,
        active_only: bool,
    ) -> Result<Vec<Subscription>> {
        let subs = self.lock()?;
        Ok(sorted(
            subs.values()
                .filter(|s| s.subscriber == *subscriber)
                .filter(|s| !active_only || s.status == SubscriptionStatus::Active)
                .cloned()
                .collect(),
        ))
    }

    fn list_active(&self) -> Result<Vec<Subscription>> {
        let subs = self.lock()?;
        Ok(sorted(
            subs.values()
                .filter(|s| s.status == SubscriptionStatus::Active)
                .cloned()
                .collect(),
        ))
    }

    fn swap_status(
        &self,
        id: &str,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<bool> {
        let mut applied = false;
        self.update(id, |s| {
            if s.status == from {
                s.status = to;
                applied = true;
            }
        })?;
        Ok(applied)
    }

    fn record_payment(&self, id: &str, confirmed_at: u64) -> Result<()> {
        self.update(id, |s| {
            s.last_payment_date = Some(s.last_payment_date.map_or(confirmed_at, |d| d.max(confirmed_at)));
            s.failed_attempts = 0;
        })
    }

    fn record_failure(&self, id: &str) -> Result<()> {
        self.update(id, |s| s.failed_attempts += 1)
    }
}

/// SQLite-backed store over the `subscriptions` table.
pub struct SqliteSubscriptionStore {
    conn: Mutex<Connection>,
}

impl SqliteSubscriptionStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SubscriptionError::Store("subscription store lock poisoned".into()))
    }
}

impl SubscriptionStore for SqliteSubscriptionStore {
    fn insert(&self, sub: &Subscription) -> Result<bool> {
        Ok(q::insert(&*self.lock()?, sub)?)
    }

    fn get(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(q::get(&*self.lock()?, id)?)
    }

    fn list_by_subscriber(
        &self,
        subscriber: &Address,
        active_only: bool,
    ) -> Result<Vec<Subscription>> {
        Ok(q::list_by_subscriber(&*self.lock()?, &subscriber.to_string(), active_only)?)
    }

    fn list_active(&self) -> Result<Vec<Subscription>> {
        Ok(q::list_by_status(&*self.lock()?, SubscriptionStatus::Active)?)
    }

    fn swap_status(
        &self,
        id: &str,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<bool> {
        Ok(q::swap_status(&*self.lock()?, id, from, to)?)
    }

    fn record_payment(&self, id: &str, confirmed_at: u64) -> Result<()> {
        Ok(q::record_payment(&*self.lock()?, id, confirmed_at)?)
    }

    fn record_failure(&self, id: &str) -> Result<()> {
        Ok(q::record_failure(&*self.lock()?, id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulut_types::subscription::Frequency;
    use bulut_types::{Amount, Currency};

    fn sub(id: &str, subscriber: u8, created_at: u64) -> Subscription {
        Subscription {
            id: id.into(),
            subscriber: Address([subscriber; 20]),
            recipient: Address([9; 20]),
            amount: Amount(999),
            currency: Currency::Usd,
            frequency: Frequency::Monthly,
            start_date: 1_000,
            status: SubscriptionStatus::Active,
            last_payment_date: None,
            failed_attempts: 0,
            memo: None,
            created_at,
        }
    }

    fn exercise(store: &dyn SubscriptionStore) {
        assert!(store.insert(&sub("sub_a", 1, 10)).expect("insert"));
        assert!(!store.insert(&sub("sub_a", 1, 10)).expect("insert again"));
        assert!(store.insert(&sub("sub_b", 1, 5)).expect("insert"));
        assert!(store.insert(&sub("sub_c", 2, 1)).expect("insert"));

        let mine: Vec<String> = store
            .list_by_subscriber(&Address([1; 20]), false)
            .expect("list")
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(mine, vec!["sub_b", "sub_a"]);

        assert!(store
            .swap_status("sub_b", SubscriptionStatus::Active, SubscriptionStatus::Paused)
            .expect("pause"));
        assert!(!store
            .swap_status("sub_b", SubscriptionStatus::Active, SubscriptionStatus::Cancelled)
            .expect("stale cancel"));
        assert_eq!(store.list_by_subscriber(&Address([1; 20]), true).expect("list").len(), 1);
        assert_eq!(store.list_active().expect("active").len(), 2);

        store.record_failure("sub_a").expect("fail");
        store.record_failure("sub_a").expect("fail");
        assert_eq!(store.get("sub_a").expect("get").expect("present").failed_attempts, 2);

        store.record_payment("sub_a", 5_000).expect("pay");
        store.record_payment("sub_a", 4_000).expect("pay older");
        let a = store.get("sub_a").expect("get").expect("present");
        assert_eq!(a.last_payment_date, Some(5_000));
        assert_eq!(a.failed_attempts, 0);

        assert!(matches!(
            store.record_failure("sub_missing"),
            Err(SubscriptionError::NotFound(_))
        ));
        assert!(store.get("sub_missing").expect("get").is_none());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemorySubscriptionStore::new());
    }

    #[test]
    fn test_sqlite_store() {
        exercise(&SqliteSubscriptionStore::new(
            bulut_db::open_memory().expect("open db"),
        ));
    }
}
