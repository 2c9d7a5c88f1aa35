/// main.rs – Entry point for the challenge tracker.
///
/// Orchestrates startup, the account-refresh and trade-notification poll
/// timers, challenge-row derivation, and the live ratatui dashboard.
mod config;
mod dashboard;
mod database;
mod metacopier;
mod metrics;
mod models;
mod notifications;
mod rules;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use crossterm::event::EventStream;
use futures_util::future::join_all;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use config::Settings;
use dashboard::UiAction;
use database::Database;
use metacopier::MetaCopierClient;
use models::{AppState, Challenge, Payout, PayoutStatus, Trade};
use notifications::{AlertSink, ChallengeTrades, LogAlerts, NotificationCenter, NullAlerts};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "challenge-tracker",
    about = "Prop-firm challenge tracker – progress, drawdown and trade alerts over the MetaCopier API",
    version
)]
struct Cli {
    /// Disable the interactive dashboard and print logs to stdout instead.
    #[arg(long, default_value_t = false)]
    no_dashboard: bool,

    /// Include master accounts in the trade-notification poll.
    #[arg(long, default_value_t = false)]
    include_masters: bool,

    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enroll an account into a prop-firm challenge.
    Add {
        /// Account id as reported by the account API.
        account_id: String,
        /// Display alias for the challenge.
        alias: String,
        /// Prop firm name; guessed from the broker server when omitted.
        #[arg(long)]
        firm: Option<String>,
        /// Evaluation phase.
        #[arg(long, default_value = "Phase 1")]
        phase: String,
        /// Profit target percent; taken from the firm's rules when omitted.
        #[arg(long)]
        target: Option<f64>,
        /// Owner label.
        #[arg(long, default_value = "")]
        owner: String,
        /// Challenge cost.
        #[arg(long, default_value_t = 0.0)]
        cost: f64,
        /// Mark this account as the copy-trading master.
        #[arg(long, default_value_t = false)]
        master: bool,
    },
    /// Remove a tracked challenge (snapshots and payouts go with it).
    Remove { id: String },
    /// List tracked challenges.
    List,
    /// Record a payout request for a challenge.
    Payout {
        challenge_id: String,
        amount: f64,
        /// Mark it received immediately.
        #[arg(long, default_value_t = false)]
        received: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;

    // Logging – respects LOG_LEVEL env var; falls back to config
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.tracker.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !settings.has_credentials() {
        warn!("⚠️  METACOPIER_API_KEY not set – API requests will be unauthenticated.");
    }

    let db = Arc::new(Database::open(&settings.tracker.db_path)?);
    info!("Database opened: {}", settings.tracker.db_path);

    let client = Arc::new(MetaCopierClient::new(
        settings.api.base_url.clone(),
        settings.api_key.clone(),
        settings.api.timeout_seconds,
        settings.api.history_days,
    )?);

    if let Some(command) = cli.command.take() {
        return run_command(command, &client, &db).await;
    }

    run_tracker(cli, settings, client, db).await
}

// ---------------------------------------------------------------------------
// One-shot commands
// ---------------------------------------------------------------------------

async fn run_command(command: Command, client: &MetaCopierClient, db: &Database) -> Result<()> {
    match command {
        Command::Add {
            account_id,
            alias,
            firm,
            phase,
            target,
            owner,
            cost,
            master,
        } => {
            let accounts = client.fetch_accounts().await.unwrap_or_default();
            let account = accounts.iter().find(|a| a.id == account_id);
            if account.is_none() {
                warn!("Account {account_id} not found on the API – storing challenge anyway.");
            }

            let server = account.map(|a| a.server.clone()).unwrap_or_default();
            let prop_firm = firm.unwrap_or_else(|| rules::guess_prop_firm(&server).to_string());
            let target_pct =
                target.unwrap_or_else(|| rules::phase_rules(&prop_firm, &phase).target_pct);

            let challenge = Challenge {
                id: Uuid::new_v4().to_string(),
                account_id,
                alias,
                owner,
                prop_firm,
                phase,
                platform: account.map_or(models::Platform::Unknown, |a| a.platform),
                target_pct,
                daily_dd_pct: None,
                max_dd_pct: None,
                is_master: master,
                cost,
                login_number: account.map(|a| a.login.clone()).unwrap_or_default(),
                login_server: server,
                started_at: Some(Utc::now()),
                created_at: Utc::now(),
            };
            db.insert_challenge(&challenge)?;
            info!(
                "Added challenge {} – {} {} ({}%, master={})",
                challenge.id, challenge.prop_firm, challenge.phase, challenge.target_pct, master
            );
        }
        Command::Remove { id } => {
            db.delete_challenge(&id)?;
            info!("Removed challenge {id}");
        }
        Command::List => {
            for ch in db.get_challenges()? {
                println!(
                    "{}  {:<18} {:<16} {:<8} target={:>4}%  master={}  account={}",
                    ch.id, ch.alias, ch.prop_firm, ch.phase, ch.target_pct, ch.is_master,
                    ch.account_id,
                );
            }
        }
        Command::Payout {
            challenge_id,
            amount,
            received,
        } => {
            let now = Utc::now();
            let payout = Payout {
                id: Uuid::new_v4().to_string(),
                challenge_id,
                amount,
                status: if received {
                    PayoutStatus::Received
                } else {
                    PayoutStatus::Pending
                },
                requested_at: now,
                received_at: received.then_some(now),
                notes: None,
                created_at: now,
            };
            db.insert_payout(&payout)?;
            let (total_received, pending) = db.payout_totals()?;
            info!(
                "Recorded payout {:.2} ({}) – totals: {:.2} received / {:.2} pending",
                amount, payout.status, total_received, pending
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tracker loop
// ---------------------------------------------------------------------------

async fn run_tracker(
    cli: Cli,
    settings: Settings,
    client: Arc<MetaCopierClient>,
    db: Arc<Database>,
) -> Result<()> {
    let include_masters = settings.notifications.include_masters || cli.include_masters;

    // Shared application state for the dashboard
    let state = Arc::new(RwLock::new(AppState {
        started_at: Some(Utc::now()),
        include_masters,
        ..AppState::default()
    }));

    // Seen-trade state lives with the main loop – there is exactly one
    // logical writer per poll step.
    let mut center = NotificationCenter::new(include_masters);
    let alerts: Box<dyn AlertSink> = if settings.notifications.push_alerts {
        Box::new(LogAlerts)
    } else {
        Box::new(NullAlerts)
    };

    {
        let mut st = state.write().unwrap();
        st.challenges = db.get_challenges().unwrap_or_default();
        let n = st.challenges.len();
        st.add_log(format!("Tracking {n} challenge(s)"));
        info!("Tracking {n} challenge(s)");
    }

    // Independent fixed-interval timers: account refresh and trade poll
    // are deliberately uncoordinated.
    let refresh_ms = (settings.poll.account_refresh_seconds * 1000.0) as u64;
    let mut refresh_ticker =
        tokio::time::interval(std::time::Duration::from_millis(refresh_ms));

    let poll_ms = (settings.poll.trade_poll_seconds * 1000.0) as u64;
    let mut poll_ticker = tokio::time::interval(std::time::Duration::from_millis(poll_ms));

    let mut terminal = if !cli.no_dashboard {
        Some(dashboard::setup_terminal()?)
    } else {
        None
    };

    let dash_ms = (settings.dashboard.refresh_rate * 1000.0) as u64;
    let mut dash_ticker = tokio::time::interval(std::time::Duration::from_millis(dash_ms));

    let mut event_stream = EventStream::new();

    info!("Tracker started.  Press 'q' to quit, 'm' to toggle master alerts.");

    loop {
        if let Some(ref mut term) = terminal {
            let st = state.read().unwrap().clone();
            term.draw(|f| dashboard::render(f, &st))?;
        }

        tokio::select! {
            // ── Dashboard keyboard events ──────────────────────────────────
            Some(Ok(event)) = event_stream.next() => {
                match dashboard::handle_event(&event) {
                    UiAction::Quit => break,
                    UiAction::ToggleMasters => {
                        let on = !center.include_masters();
                        center.set_include_masters(on);
                        {
                            let mut st = state.write().unwrap();
                            st.include_masters = on;
                            st.notifications = center.notifications().clone();
                            st.add_log(format!(
                                "Master notifications {}",
                                if on { "enabled" } else { "disabled" }
                            ));
                        }
                        // Enabling triggers a fresh poll right away
                        if on {
                            if let Err(e) = notify_cycle(&state, &client, &mut center, alerts.as_ref()).await {
                                error!("Notification cycle error: {e}");
                            }
                        }
                    }
                    UiAction::None => {}
                }
            }

            // ── Dashboard refresh tick (redraw only) ───────────────────────
            _ = dash_ticker.tick() => {}

            // ── Account refresh cycle ──────────────────────────────────────
            _ = refresh_ticker.tick() => {
                if let Err(e) = refresh_cycle(&state, &client, &db).await {
                    error!("Refresh cycle error: {e}");
                    let mut st = state.write().unwrap();
                    st.add_log(format!("ERROR refresh: {e}"));
                }
            }

            // ── Trade-notification poll cycle ──────────────────────────────
            _ = poll_ticker.tick() => {
                if let Err(e) = notify_cycle(&state, &client, &mut center, alerts.as_ref()).await {
                    error!("Notification cycle error: {e}");
                    let mut st = state.write().unwrap();
                    st.add_log(format!("ERROR poll: {e}"));
                }
            }
        }
    }

    if let Some(ref mut term) = terminal {
        dashboard::teardown_terminal(term)?;
    }

    let st = state.read().unwrap();
    info!(
        "Tracker stopped – {} challenge(s), {} notification(s) this session",
        st.rows.len(),
        st.notifications.len(),
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// Account refresh cycle
// ---------------------------------------------------------------------------

/// Refresh account snapshots, rederive all challenge rows and persist
/// balance snapshots for connected ones. Shared state is replaced once at
/// the end of the cycle.
async fn refresh_cycle(
    state: &Arc<RwLock<AppState>>,
    client: &Arc<MetaCopierClient>,
    db: &Arc<Database>,
) -> Result<()> {
    let challenges = db.get_challenges()?;

    // Snapshot what we need without holding the lock across awaits
    let trade_history = {
        let st = state.read().unwrap();
        st.trade_history.clone()
    };

    let accounts = match client.fetch_accounts().await {
        Ok(accounts) => accounts,
        Err(e) => {
            // Next scheduled tick is the retry mechanism
            warn!("Account fetch failed: {e}");
            let mut st = state.write().unwrap();
            st.api_ok = false;
            st.add_log(format!("Account fetch failed: {e}"));
            return Ok(());
        }
    };

    // Open positions for connected accounts, fan-out / fan-in; one failure
    // degrades that account to an empty set.
    let connected_ids: Vec<String> = accounts
        .iter()
        .filter(|a| a.connected)
        .map(|a| a.id.clone())
        .collect();
    let fetched = join_all(connected_ids.iter().map(|id| {
        let client = Arc::clone(client);
        async move {
            match client.fetch_open_positions(id).await {
                Ok(positions) => (id.clone(), positions),
                Err(e) => {
                    debug!("Open-position fetch failed for {id}: {e}");
                    (id.clone(), Vec::new())
                }
            }
        }
    }))
    .await;
    let open_positions: HashMap<String, Vec<Trade>> = fetched.into_iter().collect();

    let account_map: HashMap<String, models::Account> =
        accounts.into_iter().map(|a| (a.id.clone(), a)).collect();

    // Derive rows – every persisted challenge gets one, matched or not.
    let daily_since = metrics::local_midnight();
    let empty: Vec<Trade> = Vec::new();
    let mut rows = Vec::with_capacity(challenges.len());
    for ch in &challenges {
        let account = account_map.get(&ch.account_id);
        let starting = db.earliest_snapshot_balance(&ch.id)?;
        let trades = trade_history.get(&ch.account_id).unwrap_or(&empty);
        let open = open_positions.get(&ch.account_id).unwrap_or(&empty);
        rows.push(metrics::derive_row(
            ch,
            account,
            starting,
            trades,
            open,
            daily_since,
        ));
    }

    // Persist a balance snapshot for each connected, funded row
    for row in &rows {
        if row.state == models::ConnectionState::Connected && row.balance > 0.0 {
            if let Err(e) = db.insert_snapshot(
                &row.challenge_id,
                row.balance,
                row.equity,
                row.current_dd_pct,
                row.equity - row.balance,
            ) {
                warn!("Failed to save snapshot for {}: {e}", row.challenge_id);
            }
        }
    }

    let payout_totals = db.payout_totals().unwrap_or_else(|e| {
        warn!("Payout totals query failed: {e}");
        (0.0, 0.0)
    });

    // Single writer: swap state at the end of the completed step
    {
        let mut st = state.write().unwrap();
        st.accounts = account_map;
        st.open_positions = open_positions;
        st.challenges = challenges;
        st.rows = rows;
        st.api_ok = true;
        st.payouts_received = payout_totals.0;
        st.payouts_pending = payout_totals.1;
        st.last_refresh = Some(Utc::now());
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Trade-notification poll cycle
// ---------------------------------------------------------------------------

/// Fetch recent trades per tracked challenge (fan-out) and feed the
/// deduplicator. A single challenge's fetch failure degrades to an empty
/// batch without cancelling siblings.
async fn notify_cycle(
    state: &Arc<RwLock<AppState>>,
    client: &Arc<MetaCopierClient>,
    center: &mut NotificationCenter,
    alerts: &dyn AlertSink,
) -> Result<()> {
    let (challenges, rows) = {
        let st = state.read().unwrap();
        (st.challenges.clone(), st.rows.clone())
    };

    let batches: Vec<ChallengeTrades> = join_all(challenges.iter().map(|ch| {
        let client = Arc::clone(client);
        let alias = rows
            .iter()
            .find(|r| r.challenge_id == ch.id)
            .map(|r| r.alias.clone())
            .unwrap_or_else(|| ch.alias.clone());
        async move {
            let trades = match client.fetch_trades(&ch.account_id).await {
                Ok(trades) => trades,
                Err(e) => {
                    debug!("Trade fetch failed for {}: {e}", ch.account_id);
                    Vec::new()
                }
            };
            ChallengeTrades {
                challenge_id: ch.id.clone(),
                account_id: ch.account_id.clone(),
                alias,
                is_master: ch.is_master,
                trades,
            }
        }
    }))
    .await;

    center.ingest_cycle(&batches, &rows, alerts);

    // Keep trade history around for streak / daily P&L derivation
    {
        let mut st = state.write().unwrap();
        for batch in &batches {
            if !batch.trades.is_empty() {
                st.trade_history
                    .insert(batch.account_id.clone(), batch.trades.clone());
            }
        }
        st.notifications = center.notifications().clone();
    }

    Ok(())
}
