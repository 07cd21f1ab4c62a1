//! Alias directory query functions.

use bulut_types::{Address, Alias, Handle};
use rusqlite::{Connection, OptionalExtension};

use crate::{parse_col, DbError, Result};

/// Outcome of an atomic bind attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// A new binding was inserted.
    Inserted,
    /// The exact binding already existed.
    Unchanged,
    /// The handle is bound to another address.
    HandleTaken(Address),
    /// The address is bound to another handle.
    AddressTaken(Handle),
}

type AliasRow = (String, String, i64, Option<i64>);

fn to_alias(row: AliasRow) -> Result<Alias> {
    Ok(Alias {
        handle: parse_col(row.0)?,
        address: parse_col(row.1)?,
        registered_at: row.2 as u64,
        last_used_at: row.3.map(|t| t as u64),
    })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AliasRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Look up a binding by handle.
pub fn find_by_handle(conn: &Connection, handle: &Handle) -> Result<Option<Alias>> {
    conn.query_row(
        "SELECT handle, address, registered_at, last_used_at FROM aliases WHERE handle = ?1",
        [handle.as_str()],
        read_row,
    )
    .optional()?
    .map(to_alias)
    .transpose()
}

/// Look up a binding by address.
pub fn find_by_address(conn: &Connection, address: &Address) -> Result<Option<Alias>> {
    conn.query_row(
        "SELECT handle, address, registered_at, last_used_at FROM aliases WHERE address = ?1",
        [address.to_string()],
        read_row,
    )
    .optional()?
    .map(to_alias)
    .transpose()
}

/// Check both uniqueness constraints and insert in one transaction.
pub fn bind(conn: &Connection, handle: &Handle, address: &Address, now: u64) -> Result<BindOutcome> {
    let tx = conn.unchecked_transaction()?;

    if let Some(existing) = find_by_handle(&tx, handle)? {
        return Ok(if existing.address == *address {
            BindOutcome::Unchanged
        } else {
            BindOutcome::HandleTaken(existing.address)
        });
    }
    if let Some(existing) = find_by_address(&tx, address)? {
        return Ok(BindOutcome::AddressTaken(existing.handle));
    }

    tx.execute(
        "INSERT INTO aliases (handle, address, registered_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![handle.as_str(), address.to_string(), now as i64],
    )?;
    tx.commit()?;
    Ok(BindOutcome::Inserted)
}

/// Remove a binding. Returns `false` if the handle was not bound.
pub fn remove(conn: &Connection, handle: &Handle) -> Result<bool> {
    let removed = conn.execute("DELETE FROM aliases WHERE handle = ?1", [handle.as_str()])?;
    Ok(removed > 0)
}

/// Record a lookup of `handle`.
pub fn touch(conn: &Connection, handle: &Handle, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE aliases SET last_used_at = ?1 WHERE handle = ?2",
        rusqlite::params![now as i64, handle.as_str()],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("alias {handle}")));
    }
    Ok(())
}

/// All bindings ordered by handle.
pub fn list(conn: &Connection) -> Result<Vec<Alias>> {
    let mut stmt = conn.prepare(
        "SELECT handle, address, registered_at, last_used_at FROM aliases ORDER BY handle",
    )?;
    let rows = stmt
        .query_map([], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(to_alias).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn handle(s: &str) -> Handle {
        s.parse().expect("valid handle")
    }

    #[test]
    fn test_bind_and_find() {
        let conn = test_db();
        let addr = Address([0xaa; 20]);
        assert_eq!(
            bind(&conn, &handle("@alice"), &addr, 100).expect("bind"),
            BindOutcome::Inserted
        );

        let alias = find_by_handle(&conn, &handle("@alice"))
            .expect("find")
            .expect("present");
        assert_eq!(alias.address, addr);
        assert_eq!(alias.registered_at, 100);
        assert_eq!(alias.last_used_at, None);

        let reverse = find_by_address(&conn, &addr).expect("find").expect("present");
        assert_eq!(reverse.handle, handle("@alice"));
    }

    #[test]
    fn test_bind_conflicts() {
        let conn = test_db();
        let a = Address([0xaa; 20]);
        let b = Address([0xbb; 20]);
        bind(&conn, &handle("@alice"), &a, 1).expect("bind");

        assert_eq!(
            bind(&conn, &handle("@alice"), &a, 2).expect("bind"),
            BindOutcome::Unchanged
        );
        assert_eq!(
            bind(&conn, &handle("@alice"), &b, 2).expect("bind"),
            BindOutcome::HandleTaken(a)
        );
        assert_eq!(
            bind(&conn, &handle("@other"), &a, 2).expect("bind"),
            BindOutcome::AddressTaken(handle("@alice"))
        );
        assert_eq!(list(&conn).expect("list").len(), 1);
    }

    #[test]
    fn test_touch_and_remove() {
        let conn = test_db();
        let a = Address([0xaa; 20]);
        bind(&conn, &handle("@alice"), &a, 1).expect("bind");
        touch(&conn, &handle("@alice"), 50).expect("touch");
        let alias = find_by_handle(&conn, &handle("@alice"))
            .expect("find")
            .expect("present");
        assert_eq!(alias.last_used_at, Some(50));

        assert!(remove(&conn, &handle("@alice")).expect("remove"));
        assert!(!remove(&conn, &handle("@alice")).expect("remove again"));
        assert!(touch(&conn, &handle("@alice"), 60).is_err());
    }
}
