//! Subscription query functions.
//!
//! Rows are never deleted; status changes and payment bookkeeping are the
//! only mutations.

use bulut_types::subscription::{Subscription, SubscriptionStatus};
use rusqlite::{Connection, OptionalExtension};

use crate::{parse_col, DbError, Result};

const COLUMNS: &str = "id, subscriber, recipient, amount, currency, frequency, start_date, \
                       status, last_payment_date, failed_attempts, memo, created_at";

struct SubscriptionRow {
    id: String,
    subscriber: String,
    recipient: String,
    amount: String,
    currency: String,
    frequency: String,
    start_date: i64,
    status: String,
    last_payment_date: Option<i64>,
    failed_attempts: i64,
    memo: Option<String>,
    created_at: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        subscriber: row.get(1)?,
        recipient: row.get(2)?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        frequency: row.get(5)?,
        start_date: row.get(6)?,
        status: row.get(7)?,
        last_payment_date: row.get(8)?,
        failed_attempts: row.get(9)?,
        memo: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn to_subscription(row: SubscriptionRow) -> Result<Subscription> {
    Ok(Subscription {
        id: row.id,
        subscriber: parse_col(row.subscriber)?,
        recipient: parse_col(row.recipient)?,
        amount: parse_col(row.amount)?,
        currency: parse_col(row.currency)?,
        frequency: parse_col(row.frequency)?,
        start_date: row.start_date as u64,
        status: parse_col(row.status)?,
        last_payment_date: row.last_payment_date.map(|t| t as u64),
        failed_attempts: row.failed_attempts as u32,
        memo: row.memo,
        created_at: row.created_at as u64,
    })
}

/// Insert a subscription. Returns `false` if the id already exists.
pub fn insert(conn: &Connection, sub: &Subscription) -> Result<bool> {
    let inserted = conn.execute(
        &format!("INSERT OR IGNORE INTO subscriptions ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
        rusqlite::params![
            sub.id,
            sub.subscriber.to_string(),
            sub.recipient.to_string(),
            sub.amount.to_string(),
            sub.currency.code(),
            sub.frequency.as_str(),
            sub.start_date as i64,
            sub.status.as_str(),
            sub.last_payment_date.map(|t| t as i64),
            sub.failed_attempts as i64,
            sub.memo,
            sub.created_at as i64,
        ],
    )?;
    Ok(inserted > 0)
}

/// Fetch one subscription.
pub fn get(conn: &Connection, id: &str) -> Result<Option<Subscription>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM subscriptions WHERE id = ?1"),
        [id],
        read_row,
    )
    .optional()?
    .map(to_subscription)
    .transpose()
}

/// Subscriptions of one subscriber, oldest first.
pub fn list_by_subscriber(
    conn: &Connection,
    subscriber: &str,
    active_only: bool,
) -> Result<Vec<Subscription>> {
    let sql = if active_only {
        format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE subscriber = ?1 AND status = 'active' \
             ORDER BY created_at, id"
        )
    } else {
        format!("SELECT {COLUMNS} FROM subscriptions WHERE subscriber = ?1 ORDER BY created_at, id")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([subscriber], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(to_subscription).collect()
}

/// All subscriptions with the given status.
pub fn list_by_status(conn: &Connection, status: SubscriptionStatus) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM subscriptions WHERE status = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map([status.as_str()], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(to_subscription).collect()
}

/// Move a subscription from status `from` to `to` in one statement.
///
/// Returns `false` without writing if the stored status is not `from`.
pub fn swap_status(
    conn: &Connection,
    id: &str,
    from: SubscriptionStatus,
    to: SubscriptionStatus,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE subscriptions SET status = ?1 WHERE id = ?2 AND status = ?3",
        rusqlite::params![to.as_str(), id, from.as_str()],
    )?;
    if updated == 1 {
        return Ok(true);
    }
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(DbError::NotFound(format!("subscription {id}")));
    }
    Ok(false)
}

/// Record a confirmed payment: the payment date only moves forward and the
/// failure counter resets.
pub fn record_payment(conn: &Connection, id: &str, confirmed_at: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE subscriptions
         SET last_payment_date = MAX(COALESCE(last_payment_date, 0), ?1),
             failed_attempts = 0
         WHERE id = ?2",
        rusqlite::params![confirmed_at as i64, id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("subscription {id}")));
    }
    Ok(())
}

/// Record a terminally failed payment attempt.
pub fn record_failure(conn: &Connection, id: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE subscriptions SET failed_attempts = failed_attempts + 1 WHERE id = ?1",
        [id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("subscription {id}")));
    }
    Ok(())
}
