/// metrics.rs – Challenge-progress derivation.
///
/// Everything here is a pure function of (challenge, account snapshot,
/// trades, phase rules): progress percentage, current drawdown, pass/fail
/// status, win/loss streaks and daily P&L. Rows are recomputed from the
/// latest snapshot on every refresh and never cached.
use chrono::{DateTime, Local, Utc};

use crate::models::{
    Account, Challenge, ChallengeRow, ChallengeStatus, ConnectionState, Platform, Streak,
    StreakDirection, Trade,
};
use crate::rules;

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Return on the starting balance, in percent, one decimal.
///
/// The divisor floors to 1 so a zero or negative starting balance can never
/// divide by zero.
pub fn progress_pct(starting_balance: f64, equity: f64) -> f64 {
    round1((equity - starting_balance) / starting_balance.max(1.0) * 100.0)
}

/// How far equity sits below the starting balance, in percent (>= 0),
/// two decimals. Zero when the starting balance is not positive.
pub fn current_drawdown_pct(starting_balance: f64, equity: f64) -> f64 {
    if starting_balance <= 0.0 {
        return 0.0;
    }
    round2(((starting_balance - equity) / starting_balance * 100.0).max(0.0))
}

/// Pass/fail/active derivation. Master challenges are always `Active`.
pub fn challenge_status(
    is_master: bool,
    current_dd_pct: f64,
    max_dd_pct: f64,
    progress_pct: f64,
    target_pct: f64,
) -> ChallengeStatus {
    if is_master {
        return ChallengeStatus::Active;
    }
    if max_dd_pct > 0.0 && current_dd_pct >= max_dd_pct {
        ChallengeStatus::Failed
    } else if target_pct > 0.0 && progress_pct >= target_pct {
        ChallengeStatus::Passed
    } else {
        ChallengeStatus::Active
    }
}

// ---------------------------------------------------------------------------
// Streak and daily P&L
// ---------------------------------------------------------------------------

/// Contiguous run of same-sign profit over closed trades, newest first.
/// Trades with zero profit or no close time are ignored. `None` when there
/// is no closed trade to anchor the run.
pub fn streak(trades: &[Trade]) -> Option<Streak> {
    let mut closed: Vec<&Trade> = trades
        .iter()
        .filter(|t| t.close_time.is_some() && t.profit != 0.0)
        .collect();
    closed.sort_by_key(|t| std::cmp::Reverse(t.close_time));

    let first = closed.first()?;
    let winning = first.profit > 0.0;
    let count = closed
        .iter()
        .take_while(|t| (t.profit > 0.0) == winning)
        .count() as u32;

    Some(Streak {
        direction: if winning {
            StreakDirection::Win
        } else {
            StreakDirection::Loss
        },
        count,
    })
}

/// Sum of profit over trades closed at or after `since`.
pub fn daily_pnl(trades: &[Trade], since: DateTime<Utc>) -> f64 {
    trades
        .iter()
        .filter(|t| t.close_time.is_some_and(|c| c >= since))
        .map(|t| t.profit)
        .sum()
}

/// Local midnight of the current day, as a Utc instant. The daily P&L
/// window starts here.
pub fn local_midnight() -> DateTime<Utc> {
    let today = Local::now().date_naive();
    match today
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(Local).single())
    {
        Some(midnight) => midnight.with_timezone(&Utc),
        // DST edge where local midnight doesn't exist; fall back to Utc midnight.
        None => DateTime::from_naive_utc_and_offset(
            today.and_hms_opt(0, 0, 0).unwrap_or_default(),
            Utc,
        ),
    }
}

// ---------------------------------------------------------------------------
// Row derivation
// ---------------------------------------------------------------------------

/// Derive the display row for one challenge.
///
/// `starting_balance` is the earliest stored snapshot balance when one
/// exists (caller resolves it from the store); otherwise the account's
/// current balance stands in. A challenge without a matching account yields
/// a zero-valued, disconnected row rather than being omitted.
pub fn derive_row(
    challenge: &Challenge,
    account: Option<&Account>,
    starting_balance: Option<f64>,
    trades: &[Trade],
    open_positions: &[Trade],
    daily_since: DateTime<Utc>,
) -> ChallengeRow {
    let rule = rules::phase_rules(&challenge.prop_firm, &challenge.phase);
    let daily_dd_pct = challenge.daily_dd_pct.unwrap_or(rule.daily_dd_pct);
    let max_dd_pct = challenge.max_dd_pct.unwrap_or(rule.max_dd_pct);

    let balance = account.map_or(0.0, |a| a.balance);
    let equity = account.map_or(0.0, |a| a.equity);
    // No live account means a fully zero-valued row, even when a starting
    // balance is on record; a stale snapshot must not fail an offline account.
    let starting = match (account, starting_balance) {
        (None, _) => 0.0,
        (_, Some(s)) if s > 0.0 => s,
        _ => balance,
    };

    let progress = progress_pct(starting, equity);
    let current_dd = current_drawdown_pct(starting, equity);
    let status = challenge_status(
        challenge.is_master,
        current_dd,
        max_dd_pct,
        progress,
        challenge.target_pct,
    );

    // Prefer the stored platform; fall back to the live snapshot when the
    // stored value is the Unknown sentinel.
    let platform = match (challenge.platform, account) {
        (Platform::Unknown, Some(a)) => a.platform,
        (stored, _) => stored,
    };

    let alias = if challenge.alias.is_empty() {
        account
            .map(|a| a.name.clone())
            .unwrap_or_else(|| challenge.login_number.clone())
    } else {
        challenge.alias.clone()
    };

    ChallengeRow {
        challenge_id: challenge.id.clone(),
        account_id: challenge.account_id.clone(),
        alias,
        owner: challenge.owner.clone(),
        prop_firm: challenge.prop_firm.clone(),
        phase: challenge.phase.clone(),
        platform,
        balance,
        equity,
        starting_balance: starting,
        target_pct: challenge.target_pct,
        progress_pct: progress,
        pnl: round2(equity - starting),
        daily_dd_pct,
        max_dd_pct,
        current_dd_pct: current_dd,
        state: if account.is_some_and(|a| a.connected) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        },
        status,
        is_master: challenge.is_master,
        cost: challenge.cost,
        open_positions: open_positions.to_vec(),
        open_pnl: round2(open_positions.iter().map(|t| t.profit).sum()),
        trades_count: account.map_or(0, |a| a.open_positions_count),
        streak: streak(trades),
        daily_pnl: round2(daily_pnl(trades, daily_since)),
        login_number: challenge.login_number.clone(),
        login_server: challenge.login_server.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
