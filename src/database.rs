/// database.rs – SQLite persistence layer using rusqlite.
///
/// Challenges, balance snapshots and payouts live in a single SQLite file
/// with WAL journaling so the tracked state survives restarts. Derived
/// challenge rows are never stored – only authored state is.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::Mutex;

use crate::models::{Challenge, Payout, PayoutStatus, Platform, Snapshot};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS challenges (
    id              TEXT PRIMARY KEY,
    account_id      TEXT NOT NULL,
    alias           TEXT NOT NULL DEFAULT '',
    owner           TEXT NOT NULL DEFAULT '',
    prop_firm       TEXT NOT NULL DEFAULT 'Unknown',
    phase           TEXT NOT NULL DEFAULT 'Phase 1',
    platform        TEXT NOT NULL DEFAULT 'Unknown',
    target_pct      REAL NOT NULL DEFAULT 0.0,
    daily_dd_pct    REAL,
    max_dd_pct      REAL,
    is_master       INTEGER NOT NULL DEFAULT 0,
    cost            REAL NOT NULL DEFAULT 0.0,
    login_number    TEXT NOT NULL DEFAULT '',
    login_server    TEXT NOT NULL DEFAULT '',
    started_at      TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    challenge_id    TEXT NOT NULL REFERENCES challenges(id) ON DELETE CASCADE,
    balance         REAL NOT NULL,
    equity          REAL NOT NULL,
    drawdown        REAL NOT NULL DEFAULT 0.0,
    unrealized_pnl  REAL NOT NULL DEFAULT 0.0,
    timestamp       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS payouts (
    id              TEXT PRIMARY KEY,
    challenge_id    TEXT NOT NULL REFERENCES challenges(id) ON DELETE CASCADE,
    amount          REAL NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',
    requested_at    TEXT NOT NULL,
    received_at     TEXT,
    notes           TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_challenge ON snapshots(challenge_id);
CREATE INDEX IF NOT EXISTS idx_payouts_challenge   ON payouts(challenge_id);
";

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the SQLite database at *path* and apply the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("opening SQLite database")?;
        conn.execute_batch(SCHEMA).context("applying schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().expect("database mutex poisoned");
        f(&conn)
    }

    // ------------------------------------------------------------------
    // Challenges
    // ------------------------------------------------------------------

    pub fn insert_challenge(&self, ch: &Challenge) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO challenges
                    (id, account_id, alias, owner, prop_firm, phase, platform,
                     target_pct, daily_dd_pct, max_dd_pct, is_master, cost,
                     login_number, login_server, started_at, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
                params![
                    ch.id,
                    ch.account_id,
                    ch.alias,
                    ch.owner,
                    ch.prop_firm,
                    ch.phase,
                    ch.platform.as_str(),
                    ch.target_pct,
                    ch.daily_dd_pct,
                    ch.max_dd_pct,
                    ch.is_master as i32,
                    ch.cost,
                    ch.login_number,
                    ch.login_server,
                    ch.started_at.map(|t| t.to_rfc3339()),
                    ch.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// All challenges, newest first.
    pub fn get_challenges(&self) -> Result<Vec<Challenge>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM challenges ORDER BY created_at DESC")?;
            let rows = stmt.query_map([], |row| Self::row_to_challenge(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(anyhow::Error::from)
        })
    }

    /// Delete a challenge; its snapshots and payouts cascade.
    pub fn delete_challenge(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM challenges WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    fn row_to_challenge(row: &rusqlite::Row<'_>) -> Result<Challenge, rusqlite::Error> {
        let platform_str: String = row.get("platform")?;
        Ok(Challenge {
            id: row.get("id")?,
            account_id: row.get("account_id")?,
            alias: row.get("alias")?,
            owner: row.get("owner")?,
            prop_firm: row.get("prop_firm")?,
            phase: row.get("phase")?,
            platform: Platform::normalize(&platform_str),
            target_pct: row.get("target_pct")?,
            daily_dd_pct: row.get("daily_dd_pct")?,
            max_dd_pct: row.get("max_dd_pct")?,
            is_master: row.get::<_, i32>("is_master")? != 0,
            cost: row.get("cost")?,
            login_number: row.get("login_number")?,
            login_server: row.get("login_server")?,
            started_at: row.get::<_, Option<String>>("started_at")?.map(parse_dt),
            created_at: parse_dt(row.get::<_, String>("created_at")?),
        })
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn insert_snapshot(
        &self,
        challenge_id: &str,
        balance: f64,
        equity: f64,
        drawdown: f64,
        unrealized_pnl: f64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO snapshots
                    (challenge_id, balance, equity, drawdown, unrealized_pnl, timestamp)
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    challenge_id,
                    balance,
                    equity,
                    drawdown,
                    unrealized_pnl,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Balance of the earliest stored snapshot for a challenge, if any.
    /// This is the challenge's starting balance.
    pub fn earliest_snapshot_balance(&self, challenge_id: &str) -> Result<Option<f64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT balance FROM snapshots
                 WHERE challenge_id = ?1
                 ORDER BY timestamp ASC LIMIT 1",
            )?;
            let mut rows = stmt.query(params![challenge_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row.get(0)?)),
                None => Ok(None),
            }
        })
    }

    pub fn get_snapshots(&self, challenge_id: &str, limit: usize) -> Result<Vec<Snapshot>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM snapshots
                 WHERE challenge_id = ?1
                 ORDER BY timestamp DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![challenge_id, limit as i64], |row| {
                Ok(Snapshot {
                    id: row.get("id")?,
                    challenge_id: row.get("challenge_id")?,
                    balance: row.get("balance")?,
                    equity: row.get("equity")?,
                    drawdown: row.get("drawdown")?,
                    unrealized_pnl: row.get("unrealized_pnl")?,
                    timestamp: parse_dt(row.get::<_, String>("timestamp")?),
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(anyhow::Error::from)
        })
    }

    // ------------------------------------------------------------------
    // Payouts
    // ------------------------------------------------------------------

    pub fn insert_payout(&self, p: &Payout) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO payouts
                    (id, challenge_id, amount, status, requested_at,
                     received_at, notes, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                params![
                    p.id,
                    p.challenge_id,
                    p.amount,
                    p.status.as_str(),
                    p.requested_at.to_rfc3339(),
                    p.received_at.map(|t| t.to_rfc3339()),
                    p.notes,
                    p.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn update_payout_status(
        &self,
        id: &str,
        status: PayoutStatus,
        received_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE payouts SET status = ?2, received_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), received_at.map(|t| t.to_rfc3339())],
            )?;
            Ok(())
        })
    }

    /// All payouts, most recently requested first.
    pub fn get_payouts(&self) -> Result<Vec<Payout>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM payouts ORDER BY requested_at DESC")?;
            let rows = stmt.query_map([], |row| Self::row_to_payout(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(anyhow::Error::from)
        })
    }

    pub fn delete_payout(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM payouts WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    /// (total received, total pending).
    pub fn payout_totals(&self) -> Result<(f64, f64)> {
        self.with_conn(|conn| {
            let received: f64 = conn.query_row(
                "SELECT COALESCE(SUM(amount),0.0) FROM payouts WHERE status='received'",
                [],
                |row| row.get(0),
            )?;
            let pending: f64 = conn.query_row(
                "SELECT COALESCE(SUM(amount),0.0) FROM payouts WHERE status='pending'",
                [],
                |row| row.get(0),
            )?;
            Ok((received, pending))
        })
    }

    fn row_to_payout(row: &rusqlite::Row<'_>) -> Result<Payout, rusqlite::Error> {
        let status_str: String = row.get("status")?;
        Ok(Payout {
            id: row.get("id")?,
            challenge_id: row.get("challenge_id")?,
            amount: row.get("amount")?,
            status: status_str.parse().unwrap_or(PayoutStatus::Pending),
            requested_at: parse_dt(row.get::<_, String>("requested_at")?),
            received_at: row.get::<_, Option<String>>("received_at")?.map(parse_dt),
            notes: row.get("notes")?,
            created_at: parse_dt(row.get::<_, String>("created_at")?),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_dt(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
