//! SQLite-backed ledger.

use std::sync::{Mutex, MutexGuard};

use bulut_db::queries::executions as q;
use bulut_types::execution::{Execution, ExecutionStatus, HistoryEntry};
use bulut_types::intent::ValidatedIntent;
use bulut_types::Address;
use rusqlite::Connection;

use super::{ExecutionStore, Transition};
use crate::{ExecutionError, Result};

/// Ledger over the `intents`, `executions`, `execution_legs` and
/// `history_entries` tables.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ExecutionError::Store("ledger lock poisoned".into()))
    }
}

fn append(conn: &Connection, execution_id: &str, t: &Transition) -> Result<()> {
    let seq = q::next_seq(conn, execution_id)?;
    q::append_history(
        conn,
        &HistoryEntry {
            execution_id: execution_id.to_string(),
            seq,
            from_state: t.from,
            to_state: t.to,
            timestamp: t.at,
            detail: t.detail.clone(),
        },
    )?;
    Ok(())
}

fn map_sqlite(e: rusqlite::Error) -> ExecutionError {
    ExecutionError::Store(e.to_string())
}

impl ExecutionStore for SqliteLedger {
    fn create(
        &self,
        intent: &ValidatedIntent,
        fingerprint: &str,
        execution: &Execution,
        initial: &Transition,
    ) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqlite)?;
        q::insert_intent(&tx, intent, fingerprint)?;
        q::insert_execution(&tx, execution)?;
        append(&tx, &execution.id, initial)?;
        tx.commit().map_err(map_sqlite)?;
        Ok(())
    }

    fn save(&self, execution: &Execution, transition: Option<&Transition>) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqlite)?;
        match q::update_execution(&tx, execution) {
            Err(bulut_db::DbError::NotFound(_)) => {
                return Err(ExecutionError::NotFound(execution.id.clone()))
            }
            other => other?,
        }
        if let Some(t) = transition {
            append(&tx, &execution.id, t)?;
        }
        tx.commit().map_err(map_sqlite)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Execution>> {
        Ok(q::get_execution(&*self.lock()?, id)?)
    }

    fn find_by_intent(&self, intent_id: &str) -> Result<Option<Execution>> {
        Ok(q::find_by_intent(&*self.lock()?, intent_id)?)
    }

    fn history_for(
        &self,
        address: &Address,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Execution>> {
        Ok(q::list_for_address(&*self.lock()?, address, limit, offset)?)
    }

    fn audit_trail(&self, execution_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(q::history(&*self.lock()?, execution_id)?)
    }

    fn list_unfinished(&self) -> Result<Vec<Execution>> {
        Ok(q::list_unfinished(&*self.lock()?)?)
    }

    fn count_by_status(&self) -> Result<Vec<(ExecutionStatus, u64)>> {
        let rows = q::count_by_status(&*self.lock()?)?;
        rows.into_iter()
            .map(|(status, n)| {
                status
                    .parse::<ExecutionStatus>()
                    .map(|s| (s, n))
                    .map_err(|e| ExecutionError::Store(e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> SqliteLedger {
        SqliteLedger::new(bulut_db::open_memory().expect("open db"))
    }

    #[test]
    fn test_sqlite_ledger() {
        super::super::tests::exercise(&ledger());
    }

    #[test]
    fn test_duplicate_intent_rejected() {
        let ledger = ledger();
        let intent = super::super::tests::intent("int_dup", 1, 2, 0);
        let initial = Transition {
            from: None,
            to: ExecutionStatus::Pending,
            at: 0,
            detail: "created".into(),
        };
        ledger
            .create(&intent, "fp", &super::super::tests::execution("exe_1", &intent), &initial)
            .expect("first");
        let second =
            ledger.create(&intent, "fp", &super::super::tests::execution("exe_2", &intent), &initial);
        assert!(matches!(second, Err(ExecutionError::Store(_))));
        assert!(ledger.get("exe_2").expect("get").is_none());
    }
}
