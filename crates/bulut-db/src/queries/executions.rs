//! Intent, execution, transfer-leg and history query functions.

use bulut_types::execution::{Execution, HistoryEntry, TransferLeg};
use bulut_types::intent::ValidatedIntent;
use bulut_types::Address;
use rusqlite::{Connection, OptionalExtension};

use crate::{parse_col, Result};

const EXECUTION_COLUMNS: &str = "id, intent_id, origin, sender, currency, amount, status, failure, \
     attempt_count, external_tx_ref, fingerprint, memo, created_at, updated_at, confirmed_at";

/// Persist the validated intent an execution was created from.
///
/// Returns `false` if an intent with this id is already stored.
pub fn insert_intent(conn: &Connection, intent: &ValidatedIntent, fingerprint: &str) -> Result<bool> {
    let payload = serde_json::to_string(intent)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO intents (id, kind, sender, payload, fingerprint, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            intent.id,
            intent.kind.as_str(),
            intent.sender.to_string(),
            payload,
            fingerprint,
            intent.created_at as i64,
        ],
    )?;
    Ok(inserted > 0)
}

/// Load a stored intent.
pub fn get_intent(conn: &Connection, id: &str) -> Result<Option<ValidatedIntent>> {
    let payload: Option<String> = conn
        .query_row("SELECT payload FROM intents WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    match payload {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Insert a new execution with its legs.
pub fn insert_execution(conn: &Connection, exec: &Execution) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO executions ({EXECUTION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        rusqlite::params![
            exec.id,
            exec.intent_id,
            serde_json::to_string(&exec.origin)?,
            exec.sender.to_string(),
            exec.currency.code(),
            exec.amount.to_string(),
            exec.status.as_str(),
            exec.failure.map(|f| f.as_str()),
            exec.attempt_count as i64,
            exec.external_tx_ref,
            exec.fingerprint,
            exec.memo,
            exec.created_at as i64,
            exec.updated_at as i64,
            exec.confirmed_at.map(|t| t as i64),
        ],
    )?;
    for leg in &exec.legs {
        upsert_leg(conn, &exec.id, leg)?;
    }
    Ok(())
}

/// Write back the mutable columns of an execution and all of its legs.
pub fn update_execution(conn: &Connection, exec: &Execution) -> Result<()> {
    let updated = conn.execute(
        "UPDATE executions
         SET status = ?1, failure = ?2, attempt_count = ?3, external_tx_ref = ?4,
             updated_at = ?5, confirmed_at = ?6
         WHERE id = ?7",
        rusqlite::params![
            exec.status.as_str(),
            exec.failure.map(|f| f.as_str()),
            exec.attempt_count as i64,
            exec.external_tx_ref,
            exec.updated_at as i64,
            exec.confirmed_at.map(|t| t as i64),
            exec.id,
        ],
    )?;
    if updated == 0 {
        return Err(crate::DbError::NotFound(format!("execution {}", exec.id)));
    }
    for leg in &exec.legs {
        upsert_leg(conn, &exec.id, leg)?;
    }
    Ok(())
}

fn upsert_leg(conn: &Connection, execution_id: &str, leg: &TransferLeg) -> Result<()> {
    conn.execute(
        "INSERT INTO execution_legs
            (execution_id, leg_index, recipient, amount, status, correlation_id,
             gateway_ref, submissions, last_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (execution_id, leg_index) DO UPDATE SET
            status = excluded.status,
            correlation_id = excluded.correlation_id,
            gateway_ref = excluded.gateway_ref,
            submissions = excluded.submissions,
            last_error = excluded.last_error",
        rusqlite::params![
            execution_id,
            leg.index as i64,
            leg.recipient.to_string(),
            leg.amount.to_string(),
            leg.status.as_str(),
            leg.correlation_id,
            leg.gateway_ref,
            leg.submissions as i64,
            leg.last_error,
        ],
    )?;
    Ok(())
}

struct ExecutionRow {
    id: String,
    intent_id: String,
    origin: String,
    sender: String,
    currency: String,
    amount: String,
    status: String,
    failure: Option<String>,
    attempt_count: i64,
    external_tx_ref: Option<String>,
    fingerprint: String,
    memo: Option<String>,
    created_at: i64,
    updated_at: i64,
    confirmed_at: Option<i64>,
}

fn read_execution_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRow> {
    Ok(ExecutionRow {
        id: row.get(0)?,
        intent_id: row.get(1)?,
        origin: row.get(2)?,
        sender: row.get(3)?,
        currency: row.get(4)?,
        amount: row.get(5)?,
        status: row.get(6)?,
        failure: row.get(7)?,
        attempt_count: row.get(8)?,
        external_tx_ref: row.get(9)?,
        fingerprint: row.get(10)?,
        memo: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        confirmed_at: row.get(14)?,
    })
}

fn load_legs(conn: &Connection, execution_id: &str) -> Result<Vec<TransferLeg>> {
    type LegRow = (i64, String, String, String, Option<String>, Option<String>, i64, Option<String>);

    let mut stmt = conn.prepare(
        "SELECT leg_index, recipient, amount, status, correlation_id, gateway_ref,
                submissions, last_error
         FROM execution_legs WHERE execution_id = ?1 ORDER BY leg_index",
    )?;
    let rows: Vec<LegRow> = stmt
        .query_map([execution_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(index, recipient, amount, status, correlation_id, gateway_ref, submissions, last_error)| {
            Ok(TransferLeg {
                index: index as u32,
                recipient: parse_col(recipient)?,
                amount: parse_col(amount)?,
                status: parse_col(status)?,
                correlation_id,
                gateway_ref,
                submissions: submissions as u32,
                last_error,
            })
        })
        .collect()
}

fn to_execution(conn: &Connection, row: ExecutionRow) -> Result<Execution> {
    let legs = load_legs(conn, &row.id)?;
    Ok(Execution {
        origin: serde_json::from_str(&row.origin)?,
        sender: parse_col(row.sender)?,
        currency: parse_col(row.currency)?,
        amount: parse_col(row.amount)?,
        status: parse_col(row.status)?,
        failure: row.failure.map(parse_col).transpose()?,
        legs,
        attempt_count: row.attempt_count as u32,
        external_tx_ref: row.external_tx_ref,
        fingerprint: row.fingerprint,
        memo: row.memo,
        created_at: row.created_at as u64,
        updated_at: row.updated_at as u64,
        confirmed_at: row.confirmed_at.map(|t| t as u64),
        id: row.id,
        intent_id: row.intent_id,
    })
}

/// Fetch an execution by id.
pub fn get_execution(conn: &Connection, id: &str) -> Result<Option<Execution>> {
    let row = conn
        .query_row(
            &format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?1"),
            [id],
            read_execution_row,
        )
        .optional()?;
    row.map(|r| to_execution(conn, r)).transpose()
}

/// Fetch the execution created for an intent id.
pub fn find_by_intent(conn: &Connection, intent_id: &str) -> Result<Option<Execution>> {
    let row = conn
        .query_row(
            &format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE intent_id = ?1"),
            [intent_id],
            read_execution_row,
        )
        .optional()?;
    row.map(|r| to_execution(conn, r)).transpose()
}

/// Executions where `address` is the sender or a leg recipient, newest
/// first, ties broken by id.
pub fn list_for_address(
    conn: &Connection,
    address: &Address,
    limit: usize,
    offset: usize,
) -> Result<Vec<Execution>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions
         WHERE sender = ?1
            OR id IN (SELECT execution_id FROM execution_legs WHERE recipient = ?1)
         ORDER BY created_at DESC, id ASC
         LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt
        .query_map(
            rusqlite::params![address.to_string(), limit as i64, offset as i64],
            read_execution_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(|r| to_execution(conn, r)).collect()
}

/// Executions that have not reached a terminal state.
pub fn list_unfinished(conn: &Connection) -> Result<Vec<Execution>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions
         WHERE status IN ('pending', 'submitted') OR (status = 'failed' AND failure IS NULL)
         ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map([], read_execution_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(|r| to_execution(conn, r)).collect()
}

/// Next history sequence number for an execution (starting at 1).
pub fn next_seq(conn: &Connection, execution_id: &str) -> Result<u32> {
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) FROM history_entries WHERE execution_id = ?1",
        [execution_id],
        |row| row.get(0),
    )?;
    Ok(max as u32 + 1)
}

/// Append a history entry.
pub fn append_history(conn: &Connection, entry: &HistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO history_entries (execution_id, seq, from_state, to_state, timestamp, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            entry.execution_id,
            entry.seq as i64,
            entry.from_state.map(|s| s.as_str()),
            entry.to_state.as_str(),
            entry.timestamp as i64,
            entry.detail,
        ],
    )?;
    Ok(())
}

/// Full audit trail of an execution in sequence order.
pub fn history(conn: &Connection, execution_id: &str) -> Result<Vec<HistoryEntry>> {
    type HistoryRow = (String, i64, Option<String>, String, i64, String);

    let mut stmt = conn.prepare(
        "SELECT execution_id, seq, from_state, to_state, timestamp, detail
         FROM history_entries WHERE execution_id = ?1 ORDER BY seq",
    )?;
    let rows: Vec<HistoryRow> = stmt
        .query_map([execution_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(execution_id, seq, from_state, to_state, timestamp, detail)| {
            Ok(HistoryEntry {
                execution_id,
                seq: seq as u32,
                from_state: from_state.map(parse_col).transpose()?,
                to_state: parse_col(to_state)?,
                timestamp: timestamp as u64,
                detail,
            })
        })
        .collect()
}

/// Number of executions, by status text.
pub fn count_by_status(conn: &Connection) -> Result<Vec<(String, u64)>> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM executions GROUP BY status ORDER BY status")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulut_types::execution::{ExecutionStatus, FailureKind, LegStatus};
    use bulut_types::intent::{IntentKind, IntentOrigin, ResolvedRecipient};
    use bulut_types::{Amount, Currency};

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn intent(id: &str, sender: u8, recipients: &[u8], created_at: u64) -> ValidatedIntent {
        ValidatedIntent {
            id: id.into(),
            kind: if recipients.len() > 1 {
                IntentKind::Split
            } else {
                IntentKind::Single
            },
            amount: Amount(10_000),
            currency: Currency::Usd,
            sender: Address([sender; 20]),
            recipients: recipients
                .iter()
                .map(|r| ResolvedRecipient {
                    address: Address([*r; 20]),
                    handle: None,
                    basis_points: 10_000 / recipients.len() as u32,
                })
                .collect(),
            memo: None,
            schedule: None,
            origin: IntentOrigin::Direct,
            created_at,
        }
    }

    fn execution(id: &str, intent: &ValidatedIntent) -> Execution {
        let share = Amount(intent.amount.0 / intent.recipients.len() as u128);
        Execution {
            id: id.into(),
            intent_id: intent.id.clone(),
            origin: intent.origin.clone(),
            sender: intent.sender,
            currency: intent.currency,
            amount: intent.amount,
            status: ExecutionStatus::Pending,
            failure: None,
            legs: intent
                .recipients
                .iter()
                .enumerate()
                .map(|(i, r)| TransferLeg::new(i as u32, r.address, share))
                .collect(),
            attempt_count: 1,
            external_tx_ref: None,
            fingerprint: "fp".into(),
            memo: None,
            created_at: intent.created_at,
            updated_at: intent.created_at,
            confirmed_at: None,
        }
    }

    fn store(conn: &Connection, exec_id: &str, intent: &ValidatedIntent) -> Execution {
        insert_intent(conn, intent, "fp").expect("insert intent");
        let exec = execution(exec_id, intent);
        insert_execution(conn, &exec).expect("insert execution");
        exec
    }

    #[test]
    fn test_insert_and_load_roundtrip() {
        let conn = test_db();
        let i = intent("int_1", 1, &[2, 3], 100);
        let exec = store(&conn, "exe_1", &i);

        assert_eq!(get_execution(&conn, "exe_1").expect("get"), Some(exec.clone()));
        assert_eq!(find_by_intent(&conn, "int_1").expect("find"), Some(exec));
        assert_eq!(get_intent(&conn, "int_1").expect("intent"), Some(i));
        assert!(get_execution(&conn, "exe_missing").expect("get").is_none());
    }

    #[test]
    fn test_update_persists_legs() {
        let conn = test_db();
        let i = intent("int_1", 1, &[2], 100);
        let mut exec = store(&conn, "exe_1", &i);

        exec.status = ExecutionStatus::Failed;
        exec.failure = Some(FailureKind::Permanent);
        exec.legs[0].status = LegStatus::Failed;
        exec.legs[0].submissions = 1;
        exec.legs[0].correlation_id = Some("exe_1/0/1".into());
        exec.legs[0].last_error = Some("invalid address".into());
        exec.updated_at = 200;
        update_execution(&conn, &exec).expect("update");

        assert_eq!(get_execution(&conn, "exe_1").expect("get"), Some(exec));
    }

    #[test]
    fn test_intent_id_unique() {
        let conn = test_db();
        let i = intent("int_1", 1, &[2], 100);
        store(&conn, "exe_1", &i);
        assert!(!insert_intent(&conn, &i, "fp").expect("second insert ignored"));
        assert!(insert_execution(&conn, &execution("exe_2", &i)).is_err());
    }

    #[test]
    fn test_list_for_address() {
        let conn = test_db();
        store(&conn, "exe_a", &intent("int_a", 1, &[2], 100));
        store(&conn, "exe_b", &intent("int_b", 3, &[1, 4], 300));
        store(&conn, "exe_c", &intent("int_c", 5, &[6], 200));
        store(&conn, "exe_d", &intent("int_d", 1, &[6], 300));

        let addr = Address([1; 20]);
        let ids: Vec<String> = list_for_address(&conn, &addr, 10, 0)
            .expect("list")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["exe_b", "exe_d", "exe_a"]);

        let page: Vec<String> = list_for_address(&conn, &addr, 1, 1)
            .expect("list")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(page, vec!["exe_d"]);
    }

    #[test]
    fn test_history_append_only() {
        let conn = test_db();
        store(&conn, "exe_1", &intent("int_1", 1, &[2], 100));

        assert_eq!(next_seq(&conn, "exe_1").expect("seq"), 1);
        let entry = HistoryEntry {
            execution_id: "exe_1".into(),
            seq: 1,
            from_state: None,
            to_state: ExecutionStatus::Pending,
            timestamp: 100,
            detail: "created".into(),
        };
        append_history(&conn, &entry).expect("append");
        assert_eq!(next_seq(&conn, "exe_1").expect("seq"), 2);
        assert_eq!(history(&conn, "exe_1").expect("history"), vec![entry]);

        assert!(conn
            .execute("UPDATE history_entries SET detail = 'x'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM history_entries", []).is_err());
    }

    #[test]
    fn test_unfinished_and_counts() {
        let conn = test_db();
        let mut done = store(&conn, "exe_1", &intent("int_1", 1, &[2], 100));
        store(&conn, "exe_2", &intent("int_2", 1, &[2], 100));
        done.status = ExecutionStatus::Confirmed;
        update_execution(&conn, &done).expect("update");

        let unfinished = list_unfinished(&conn).expect("unfinished");
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, "exe_2");

        let counts = count_by_status(&conn).expect("counts");
        assert_eq!(
            counts,
            vec![("confirmed".to_string(), 1), ("pending".to_string(), 1)]
        );
    }
}
