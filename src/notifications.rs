/// notifications.rs – At-most-once trade notifications.
///
/// Each poll cycle feeds freshly fetched trades per tracked challenge into
/// the `NotificationCenter`, which keys every trade by
/// `(account_id, trade_id)` and notifies it at most once for the lifetime
/// of the seen-set. The list is bounded to the most recent 200 entries;
/// evicted entries keep their seen-set keys and are never re-notified.
use std::collections::{HashSet, VecDeque};
use tracing::info;

use crate::models::{ChallengeRow, ConnectionState, Trade, TradeNotification};

/// Bound on the retained notification list.
pub const MAX_NOTIFICATIONS: usize = 200;

// ---------------------------------------------------------------------------
// Alert sink
// ---------------------------------------------------------------------------

/// External alert capability (the push-notification seam). Implementations
/// that cannot deliver alerts simply do nothing.
pub trait AlertSink {
    fn alert(&self, title: &str, body: &str, tag: &str);
}

/// Default sink: writes alerts to the log.
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn alert(&self, title: &str, body: &str, tag: &str) {
        info!("🔔 {title}: {body} [{tag}]");
    }
}

/// Silent no-op sink used when alerts are disabled or unsupported.
pub struct NullAlerts;

impl AlertSink for NullAlerts {
    fn alert(&self, _title: &str, _body: &str, _tag: &str) {}
}

// ---------------------------------------------------------------------------
// Per-cycle input
// ---------------------------------------------------------------------------

/// One challenge's freshly fetched trades for a poll cycle.
#[derive(Debug, Clone)]
pub struct ChallengeTrades {
    pub challenge_id: String,
    pub account_id: String,
    pub alias: String,
    pub is_master: bool,
    pub trades: Vec<Trade>,
}

// ---------------------------------------------------------------------------
// NotificationCenter
// ---------------------------------------------------------------------------

pub struct NotificationCenter {
    seen: HashSet<String>,
    notifications: VecDeque<TradeNotification>,
    include_masters: bool,
}

impl NotificationCenter {
    pub fn new(include_masters: bool) -> Self {
        Self {
            seen: HashSet::new(),
            notifications: VecDeque::new(),
            include_masters,
        }
    }

    pub fn notifications(&self) -> &VecDeque<TradeNotification> {
        &self.notifications
    }

    pub fn include_masters(&self) -> bool {
        self.include_masters
    }

    /// Process one completed poll cycle.
    ///
    /// Unseen trades are prepended to the list (newest first). Trades on
    /// master accounts additionally emit an alert: an open produces
    /// "Trade Opened" with the number of connected follower rows holding a
    /// matching position, a close is labeled by profit sign. The list is
    /// truncated once at the end of the cycle.
    pub fn ingest_cycle(
        &mut self,
        batches: &[ChallengeTrades],
        rows: &[ChallengeRow],
        alerts: &dyn AlertSink,
    ) {
        for batch in batches {
            if batch.is_master && !self.include_masters {
                continue;
            }
            for trade in &batch.trades {
                if trade.id.is_empty() {
                    continue;
                }
                let key = format!("{}-{}", batch.account_id, trade.id);
                if !self.seen.insert(key.clone()) {
                    continue;
                }

                let timestamp = trade
                    .close_time
                    .or(trade.open_time)
                    .unwrap_or_else(chrono::Utc::now);
                self.notifications.push_front(TradeNotification {
                    id: key.clone(),
                    challenge_id: batch.challenge_id.clone(),
                    account_alias: batch.alias.clone(),
                    symbol: trade.symbol.clone(),
                    side: trade.side,
                    volume: trade.volume,
                    profit: trade.profit,
                    open_price: trade.open_price,
                    close_price: trade.close_price,
                    open_time: trade.open_time,
                    close_time: trade.close_time,
                    is_open: trade.is_open(),
                    is_master: batch.is_master,
                    timestamp,
                });

                if batch.is_master {
                    self.alert_master_trade(&batch.alias, trade, rows, alerts, &key);
                }
            }
        }
        self.truncate();
    }

    fn alert_master_trade(
        &self,
        alias: &str,
        trade: &Trade,
        rows: &[ChallengeRow],
        alerts: &dyn AlertSink,
        tag: &str,
    ) {
        if trade.is_open() {
            let followers = matching_open_count(rows, trade);
            alerts.alert(
                "Trade Opened",
                &format!(
                    "{alias}: {} {} {:.2} lots — {followers} follower(s) in position",
                    trade.side, trade.symbol, trade.volume
                ),
                tag,
            );
        } else {
            let title = if trade.profit > 0.0 {
                "Take Profit hit"
            } else if trade.profit < 0.0 {
                "Stop Loss hit"
            } else {
                "Trade Closed"
            };
            alerts.alert(
                title,
                &format!("{alias}: {} {:+.2}", trade.symbol, trade.profit),
                tag,
            );
        }
    }

    /// Drop entries beyond the bound, oldest first. Their keys stay in the
    /// seen-set so they are never re-notified.
    fn truncate(&mut self) {
        while self.notifications.len() > MAX_NOTIFICATIONS {
            self.notifications.pop_back();
        }
    }

    /// Flip master inclusion. Turning it off retroactively removes
    /// master-originated notifications and frees their seen-set keys, so
    /// the same trades can reappear if the flag is re-enabled while they
    /// are still recent. Returns true when the flag changed (the caller
    /// triggers an immediate poll on enable).
    pub fn set_include_masters(&mut self, include: bool) -> bool {
        if self.include_masters == include {
            return false;
        }
        self.include_masters = include;
        if !include {
            let removed: Vec<String> = self
                .notifications
                .iter()
                .filter(|n| n.is_master)
                .map(|n| n.id.clone())
                .collect();
            for key in &removed {
                self.seen.remove(key);
            }
            self.notifications.retain(|n| !n.is_master);
        }
        true
    }
}

/// Connected, non-master rows holding an open position matching the
/// master's trade (same symbol, same direction).
fn matching_open_count(rows: &[ChallengeRow], trade: &Trade) -> usize {
    rows.iter()
        .filter(|r| !r.is_master && r.state == ConnectionState::Connected)
        .filter(|r| {
            r.open_positions
                .iter()
                .any(|p| p.symbol == trade.symbol && p.side == trade.side)
        })
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
