//! Alias storage backends.
//!
//! [`AliasStore::bind`] is the only write path for new bindings. Each
//! backend performs the handle check, the address check and the insert
//! inside one critical section.

use std::collections::HashMap;
use std::sync::Mutex;

use bulut_db::queries::aliases as q;
pub use bulut_db::queries::aliases::BindOutcome;
use bulut_types::{Address, Alias, Handle};
use rusqlite::Connection;

use crate::{AliasError, Result};

/// Storage for alias bindings.
pub trait AliasStore: Send + Sync {
    /// Atomically bind `handle` to `address` unless either side is taken.
    fn bind(&self, handle: &Handle, address: &Address, now: u64) -> Result<BindOutcome>;

    fn by_handle(&self, handle: &Handle) -> Result<Option<Alias>>;

    fn by_address(&self, address: &Address) -> Result<Option<Alias>>;

    /// Record a successful lookup.
    fn touch(&self, handle: &Handle, now: u64) -> Result<()>;

    /// Remove a binding, returning whether one existed.
    fn remove(&self, handle: &Handle) -> Result<bool>;

    fn list(&self) -> Result<Vec<Alias>>;
}

fn poisoned<T>(_: T) -> AliasError {
    AliasError::Store("alias store lock poisoned".into())
}

#[derive(Default)]
struct Maps {
    by_handle: HashMap<Handle, Alias>,
    by_address: HashMap<Address, Handle>,
}

/// Mutex-guarded in-memory store.
#[derive(Default)]
pub struct MemoryAliasStore {
    inner: Mutex<Maps>,
}

impl MemoryAliasStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AliasStore for MemoryAliasStore {
    fn bind(&self, handle: &Handle, address: &Address, now: u64) -> Result<BindOutcome> {
        let mut maps = self.inner.lock().map_err(poisoned)?;

        if let Some(existing) = maps.by_handle.get(handle) {
            return Ok(if existing.address == *address {
                BindOutcome::Unchanged
            } else {
                BindOutcome::HandleTaken(existing.address)
            });
        }
        if let Some(other) = maps.by_address.get(address) {
            return Ok(BindOutcome::AddressTaken(other.clone()));
        }

        maps.by_handle.insert(
            handle.clone(),
            Alias {
                handle: handle.clone(),
                address: *address,
                registered_at: now,
                last_used_at: None,
            },
        );
        maps.by_address.insert(*address, handle.clone());
        Ok(BindOutcome::Inserted)
    }

    fn by_handle(&self, handle: &Handle) -> Result<Option<Alias>> {
        let maps = self.inner.lock().map_err(poisoned)?;
        Ok(maps.by_handle.get(handle).cloned())
    }

    fn by_address(&self, address: &Address) -> Result<Option<Alias>> {
        let maps = self.inner.lock().map_err(poisoned)?;
        Ok(maps
            .by_address
            .get(address)
            .and_then(|h| maps.by_handle.get(h))
            .cloned())
    }

    fn touch(&self, handle: &Handle, now: u64) -> Result<()> {
        let mut maps = self.inner.lock().map_err(poisoned)?;
        match maps.by_handle.get_mut(handle) {
            Some(alias) => {
                alias.last_used_at = Some(now);
                Ok(())
            }
            None => Err(AliasError::NotFound(handle.to_string())),
        }
    }

    fn remove(&self, handle: &Handle) -> Result<bool> {
        let mut maps = self.inner.lock().map_err(poisoned)?;
        match maps.by_handle.remove(handle) {
            Some(alias) => {
                maps.by_address.remove(&alias.address);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list(&self) -> Result<Vec<Alias>> {
        let maps = self.inner.lock().map_err(poisoned)?;
        let mut all: Vec<Alias> = maps.by_handle.values().cloned().collect();
        all.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(all)
    }
}

/// SQLite-backed store over the `aliases` table.
pub struct SqliteAliasStore {
    conn: Mutex<Connection>,
}

impl SqliteAliasStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl AliasStore for SqliteAliasStore {
    fn bind(&self, handle: &Handle, address: &Address, now: u64) -> Result<BindOutcome> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Ok(q::bind(&conn, handle, address, now)?)
    }

    fn by_handle(&self, handle: &Handle) -> Result<Option<Alias>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Ok(q::find_by_handle(&conn, handle)?)
    }

    fn by_address(&self, address: &Address) -> Result<Option<Alias>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Ok(q::find_by_address(&conn, address)?)
    }

    fn touch(&self, handle: &Handle, now: u64) -> Result<()> {
        let conn = self.conn.lock().map_err(poisoned)?;
        q::touch(&conn, handle, now).map_err(|e| match e {
            bulut_db::DbError::NotFound(_) => AliasError::NotFound(handle.to_string()),
            other => other.into(),
        })
    }

    fn remove(&self, handle: &Handle) -> Result<bool> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Ok(q::remove(&conn, handle)?)
    }

    fn list(&self) -> Result<Vec<Alias>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Ok(q::list(&conn)?)
    }
}
