/// models.rs – Core data types shared across all tracker modules.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    MT4,
    MT5,
    CTrader,
    Unknown,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::MT4 => "MT4",
            Platform::MT5 => "MT5",
            Platform::CTrader => "cTrader",
            Platform::Unknown => "Unknown",
        }
    }

    /// Normalize whatever the external API calls the platform.
    ///
    /// Handles "mt5", "MetaTrader 5", "meta_trader_5", "cTrader", "c_trader"
    /// and similar variants; anything unrecognized degrades to `Unknown`
    /// rather than failing.
    pub fn normalize(raw: &str) -> Platform {
        let p = raw.to_lowercase();
        if p.contains("mt5") || p.contains("metatrader 5") || p.contains("meta_trader_5") {
            Platform::MT5
        } else if p.contains("mt4") || p.contains("metatrader 4") || p.contains("meta_trader_4") {
            Platform::MT4
        } else if p.contains("ctrader") || p.contains("c_trader") {
            Platform::CTrader
        } else {
            Platform::Unknown
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
    Unknown,
}

impl TradeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
            TradeSide::Unknown => "?",
        }
    }

    /// Parse the external API's side/type field ("buy", "SELL",
    /// "POSITION_TYPE_BUY", …). Unrecognized values degrade to `Unknown`.
    pub fn normalize(raw: &str) -> TradeSide {
        let s = raw.to_lowercase();
        if s.contains("buy") {
            TradeSide::Buy
        } else if s.contains("sell") {
            TradeSide::Sell
        } else {
            TradeSide::Unknown
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeStatus {
    Active,
    Passed,
    Failed,
}

impl ChallengeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeStatus::Active => "Active",
            ChallengeStatus::Passed => "Passed",
            ChallengeStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChallengeStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(ChallengeStatus::Active),
            "Passed" => Ok(ChallengeStatus::Passed),
            "Failed" => Ok(ChallengeStatus::Failed),
            _ => Err(anyhow::anyhow!("Unknown challenge status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutStatus {
    Pending,
    Received,
    Rejected,
}

impl PayoutStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Received => "received",
            PayoutStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PayoutStatus::Pending),
            "received" => Ok(PayoutStatus::Received),
            "rejected" => Ok(PayoutStatus::Rejected),
            _ => Err(anyhow::anyhow!("Unknown payout status: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Account (live snapshot from the external API)
// ---------------------------------------------------------------------------

/// One trading account as reported by the account API.
///
/// Refreshed wholesale on each poll cycle; there are no partial updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub login: String,
    pub server: String,
    pub platform: Platform,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub connected: bool,
    pub open_positions_count: u32,
    pub unrealized_pnl: f64,
}

impl Account {
    /// Disconnected, zeroed stand-in used when the per-account information
    /// fetch fails. Keeps the account visible without aborting the batch.
    pub fn placeholder(
        id: String,
        name: String,
        login: String,
        server: String,
        platform: Platform,
    ) -> Self {
        Self {
            id,
            name,
            login,
            server,
            platform,
            balance: 0.0,
            equity: 0.0,
            margin: 0.0,
            free_margin: 0.0,
            connected: false,
            open_positions_count: 0,
            unrealized_pnl: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// One position, open or closed. `close_time == None` means still open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub volume: f64,
    pub open_price: f64,
    pub close_price: Option<f64>,
    pub profit: f64,
    pub swap: f64,
    pub commission: f64,
    pub open_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.close_time.is_none()
    }
}

// ---------------------------------------------------------------------------
// Challenge (persisted)
// ---------------------------------------------------------------------------

/// A tracked enrollment of one account against one prop-firm phase.
/// Created and deleted by user action; immutable otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub account_id: String,
    pub alias: String,
    pub owner: String,
    pub prop_firm: String,
    pub phase: String,
    pub platform: Platform,
    pub target_pct: f64,
    /// Explicit per-challenge overrides; `None` falls back to the firm's
    /// phase rules.
    pub daily_dd_pct: Option<f64>,
    pub max_dd_pct: Option<f64>,
    pub is_master: bool,
    pub cost: f64,
    pub login_number: String,
    pub login_server: String,
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-firm, per-phase target and drawdown limits. Static, read-only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseRule {
    pub target_pct: f64,
    pub daily_dd_pct: f64,
    pub max_dd_pct: f64,
}

// ---------------------------------------------------------------------------
// Derived challenge row
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreakDirection {
    Win,
    Loss,
}

impl StreakDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            StreakDirection::Win => "W",
            StreakDirection::Loss => "L",
        }
    }
}

/// Consecutive same-outcome closed trades ending at the most recent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub direction: StreakDirection,
    pub count: u32,
}

/// The display row for one challenge: a pure function of the challenge, its
/// live account snapshot, its trades and the applicable phase rules. Never
/// persisted – recomputed on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRow {
    pub challenge_id: String,
    pub account_id: String,
    pub alias: String,
    pub owner: String,
    pub prop_firm: String,
    pub phase: String,
    pub platform: Platform,
    pub balance: f64,
    pub equity: f64,
    pub starting_balance: f64,
    pub target_pct: f64,
    /// Return on starting balance, percent, one decimal.
    pub progress_pct: f64,
    pub pnl: f64,
    pub daily_dd_pct: f64,
    pub max_dd_pct: f64,
    /// How far equity sits below the starting balance, percent, two decimals.
    pub current_dd_pct: f64,
    pub state: ConnectionState,
    pub status: ChallengeStatus,
    pub is_master: bool,
    pub cost: f64,
    pub open_positions: Vec<Trade>,
    pub open_pnl: f64,
    pub trades_count: u32,
    pub streak: Option<Streak>,
    pub daily_pnl: f64,
    pub login_number: String,
    pub login_server: String,
}

// ---------------------------------------------------------------------------
// Persisted snapshots and payouts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub challenge_id: String,
    pub balance: f64,
    pub equity: f64,
    pub drawdown: f64,
    pub unrealized_pnl: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    pub challenge_id: String,
    pub amount: f64,
    pub status: PayoutStatus,
    pub requested_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Trade notification
// ---------------------------------------------------------------------------

/// At-most-once notification per `(account_id, trade_id)` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeNotification {
    /// Dedup key: `{account_id}-{trade_id}`.
    pub id: String,
    pub challenge_id: String,
    pub account_alias: String,
    pub symbol: String,
    pub side: TradeSide,
    pub volume: f64,
    pub profit: f64,
    pub open_price: f64,
    pub close_price: Option<f64>,
    pub open_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    pub is_open: bool,
    pub is_master: bool,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Shared application state (for dashboard + async tasks)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub started_at: Option<DateTime<Utc>>,
    pub include_masters: bool,
    pub api_ok: bool,
    /// account id → latest account snapshot
    pub accounts: HashMap<String, Account>,
    /// account id → currently open positions
    pub open_positions: HashMap<String, Vec<Trade>>,
    /// account id → recent trade history (open + closed)
    pub trade_history: HashMap<String, Vec<Trade>>,
    pub challenges: Vec<Challenge>,
    pub rows: Vec<ChallengeRow>,
    pub notifications: VecDeque<TradeNotification>,
    pub logs: VecDeque<String>,
    pub payouts_received: f64,
    pub payouts_pending: f64,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl AppState {
    pub fn add_log(&mut self, msg: impl Into<String>) {
        let entry = format!("[{}] {}", Utc::now().format("%H:%M:%S"), msg.into());
        self.logs.push_front(entry);
        // Keep a reasonable history
        while self.logs.len() > 200 {
            self.logs.pop_back();
        }
    }

    /// Notifications from the last hour, shown as the unread badge.
    pub fn unread_count(&self, now: DateTime<Utc>) -> usize {
        let one_hour_ago = now - chrono::Duration::hours(1);
        self.notifications
            .iter()
            .filter(|n| n.timestamp > one_hour_ago)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_normalize_variants() {
        assert_eq!(Platform::normalize("mt5"), Platform::MT5);
        assert_eq!(Platform::normalize("MetaTrader 5"), Platform::MT5);
        assert_eq!(Platform::normalize("\"meta_trader_4\""), Platform::MT4);
        assert_eq!(Platform::normalize("c_trader"), Platform::CTrader);
        assert_eq!(Platform::normalize("ninjatrader"), Platform::Unknown);
        assert_eq!(Platform::normalize(""), Platform::Unknown);
    }

    #[test]
    fn side_normalize_is_tolerant() {
        assert_eq!(TradeSide::normalize("BUY"), TradeSide::Buy);
        assert_eq!(TradeSide::normalize("POSITION_TYPE_SELL"), TradeSide::Sell);
        assert_eq!(TradeSide::normalize("hold"), TradeSide::Unknown);
    }

    #[test]
    fn log_ring_is_capped() {
        let mut state = AppState::default();
        for i in 0..250 {
            state.add_log(format!("line {i}"));
        }
        assert_eq!(state.logs.len(), 200);
        assert!(state.logs.front().unwrap().contains("line 249"));
    }

    #[test]
    fn placeholder_account_is_zeroed_and_disconnected() {
        let acc = Account::placeholder(
            "a1".into(),
            "Main".into(),
            "12345".into(),
            "FTMO-Server".into(),
            Platform::MT5,
        );
        assert!(!acc.connected);
        assert_eq!(acc.balance, 0.0);
        assert_eq!(acc.equity, 0.0);
        assert_eq!(acc.open_positions_count, 0);
    }
}
