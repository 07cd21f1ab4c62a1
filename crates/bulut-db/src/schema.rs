//! SQL schema definitions.

/// Complete schema for Bulut v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Alias directory
-- ============================================================

CREATE TABLE IF NOT EXISTS aliases (
    handle TEXT PRIMARY KEY,
    address TEXT NOT NULL UNIQUE,
    registered_at INTEGER NOT NULL,
    last_used_at INTEGER
);

-- ============================================================
-- Intents & subscriptions
-- ============================================================

CREATE TABLE IF NOT EXISTS intents (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    sender TEXT NOT NULL,
    payload TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY,
    subscriber TEXT NOT NULL,
    recipient TEXT NOT NULL,
    amount TEXT NOT NULL,
    currency TEXT NOT NULL,
    frequency TEXT NOT NULL,
    start_date INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    last_payment_date INTEGER,
    failed_attempts INTEGER NOT NULL DEFAULT 0,
    memo TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_subscriber ON subscriptions(subscriber);
CREATE INDEX IF NOT EXISTS idx_subscriptions_status ON subscriptions(status);

-- ============================================================
-- Executions & audit trail
-- ============================================================

CREATE TABLE IF NOT EXISTS executions (
    id TEXT PRIMARY KEY,
    intent_id TEXT NOT NULL UNIQUE REFERENCES intents(id),
    origin TEXT NOT NULL,
    sender TEXT NOT NULL,
    currency TEXT NOT NULL,
    amount TEXT NOT NULL,
    status TEXT NOT NULL,
    failure TEXT,
    attempt_count INTEGER NOT NULL DEFAULT 1,
    external_tx_ref TEXT,
    fingerprint TEXT NOT NULL,
    memo TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    confirmed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_executions_sender ON executions(sender);
CREATE INDEX IF NOT EXISTS idx_executions_created ON executions(created_at);

CREATE TABLE IF NOT EXISTS execution_legs (
    execution_id TEXT NOT NULL REFERENCES executions(id) ON DELETE CASCADE,
    leg_index INTEGER NOT NULL,
    recipient TEXT NOT NULL,
    amount TEXT NOT NULL,
    status TEXT NOT NULL,
    correlation_id TEXT,
    gateway_ref TEXT,
    submissions INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    PRIMARY KEY (execution_id, leg_index)
);

CREATE INDEX IF NOT EXISTS idx_execution_legs_recipient ON execution_legs(recipient);

CREATE TABLE IF NOT EXISTS history_entries (
    execution_id TEXT NOT NULL REFERENCES executions(id),
    seq INTEGER NOT NULL,
    from_state TEXT,
    to_state TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    detail TEXT NOT NULL,
    PRIMARY KEY (execution_id, seq)
);

-- History is append-only.
CREATE TRIGGER IF NOT EXISTS history_entries_no_update
BEFORE UPDATE ON history_entries
BEGIN
    SELECT RAISE(ABORT, 'history entries are append-only');
END;

CREATE TRIGGER IF NOT EXISTS history_entries_no_delete
BEFORE DELETE ON history_entries
BEGIN
    SELECT RAISE(ABORT, 'history entries are append-only');
END;
"#;
