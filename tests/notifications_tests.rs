/// Integration tests for the trade-notification pipeline.
///
/// Drives `NotificationCenter` across multiple simulated poll cycles the
/// way the trade-poll timer does, mixing master and follower batches.
#[path = "../src/models.rs"]
mod models;

#[path = "../src/notifications.rs"]
mod notifications;

use chrono::{Duration, Utc};
use models::{Trade, TradeSide};
use notifications::{
    AlertSink, ChallengeTrades, NotificationCenter, NullAlerts, MAX_NOTIFICATIONS,
};
use std::cell::RefCell;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct RecordingSink(RefCell<Vec<String>>);

impl AlertSink for RecordingSink {
    fn alert(&self, title: &str, _body: &str, _tag: &str) {
        self.0.borrow_mut().push(title.into());
    }
}

fn trade(id: &str, profit: f64, open: bool) -> Trade {
    let now = Utc::now();
    Trade {
        id: id.into(),
        symbol: "GBPJPY".into(),
        side: TradeSide::Sell,
        volume: 1.0,
        open_price: 190.0,
        close_price: if open { None } else { Some(189.5) },
        profit,
        swap: 0.0,
        commission: -2.0,
        open_time: Some(now - Duration::minutes(30)),
        close_time: if open { None } else { Some(now) },
    }
}

fn batch(account_id: &str, is_master: bool, trades: Vec<Trade>) -> ChallengeTrades {
    ChallengeTrades {
        challenge_id: format!("ch-{account_id}"),
        account_id: account_id.into(),
        alias: account_id.to_uppercase(),
        is_master,
        trades,
    }
}

// ---------------------------------------------------------------------------
// Multi-cycle behavior
// ---------------------------------------------------------------------------

#[test]
fn repeated_poll_cycles_only_notify_new_trades() {
    let mut center = NotificationCenter::new(false);
    let sink = NullAlerts;

    // Cycle 1: history contains t1, t2
    center.ingest_cycle(
        &[batch(
            "acc1",
            false,
            vec![trade("t1", 10.0, false), trade("t2", -5.0, false)],
        )],
        &[],
        &sink,
    );
    assert_eq!(center.notifications().len(), 2);

    // Cycle 2: same history plus one new close
    center.ingest_cycle(
        &[batch(
            "acc1",
            false,
            vec![
                trade("t1", 10.0, false),
                trade("t2", -5.0, false),
                trade("t3", 2.0, false),
            ],
        )],
        &[],
        &sink,
    );
    assert_eq!(center.notifications().len(), 3);
    // Newest first
    assert_eq!(center.notifications()[0].id, "acc1-t3");
}

#[test]
fn open_then_close_of_the_same_position_is_one_notification() {
    // The history endpoint reports the position under a stable id: once the
    // open has been notified, its close does not notify again.
    let mut center = NotificationCenter::new(false);
    let sink = NullAlerts;

    center.ingest_cycle(
        &[batch("acc1", false, vec![trade("t1", 0.0, true)])],
        &[],
        &sink,
    );
    center.ingest_cycle(
        &[batch("acc1", false, vec![trade("t1", 12.0, false)])],
        &[],
        &sink,
    );
    assert_eq!(center.notifications().len(), 1);
    assert!(center.notifications()[0].is_open);
}

#[test]
fn bound_holds_across_cycles() {
    let mut center = NotificationCenter::new(false);
    let sink = NullAlerts;

    for cycle in 0..5 {
        let trades: Vec<Trade> = (0..60)
            .map(|i| trade(&format!("c{cycle}-t{i}"), 1.0, false))
            .collect();
        center.ingest_cycle(&[batch("acc1", false, trades)], &[], &sink);
    }
    assert_eq!(center.notifications().len(), MAX_NOTIFICATIONS);
    // Latest cycle survived, first cycle was evicted
    assert!(center
        .notifications()
        .iter()
        .any(|n| n.id.starts_with("acc1-c4-")));
    assert!(!center
        .notifications()
        .iter()
        .any(|n| n.id.starts_with("acc1-c0-")));
}

#[test]
fn master_toggle_round_trip_across_cycles() {
    let mut center = NotificationCenter::new(true);
    let sink = NullAlerts;

    let cycle = [
        batch("m1", true, vec![trade("mt1", 8.0, false)]),
        batch("f1", false, vec![trade("ft1", 4.0, false)]),
    ];
    center.ingest_cycle(&cycle, &[], &sink);
    assert_eq!(center.notifications().len(), 2);

    // Toggle off removes the master entry retroactively
    assert!(center.set_include_masters(false));
    assert_eq!(center.notifications().len(), 1);
    assert_eq!(center.notifications()[0].id, "f1-ft1");

    // While off, new master trades are ignored entirely
    center.ingest_cycle(
        &[batch("m1", true, vec![trade("mt2", -3.0, false)])],
        &[],
        &sink,
    );
    assert_eq!(center.notifications().len(), 1);

    // Back on: both master trades are still in the polled history window
    // and reappear; the follower entry does not duplicate
    assert!(center.set_include_masters(true));
    center.ingest_cycle(&cycle, &[], &sink);
    center.ingest_cycle(
        &[batch("m1", true, vec![trade("mt2", -3.0, false)])],
        &[],
        &sink,
    );
    assert_eq!(center.notifications().len(), 3);
}

#[test]
fn master_alert_titles_follow_trade_outcome() {
    let mut center = NotificationCenter::new(true);
    let sink = RecordingSink(RefCell::new(Vec::new()));

    center.ingest_cycle(
        &[batch(
            "m1",
            true,
            vec![
                trade("open", 0.0, true),
                trade("tp", 40.0, false),
                trade("sl", -20.0, false),
                trade("flat", 0.0, false),
            ],
        )],
        &[],
        &sink,
    );

    let titles = sink.0.borrow();
    assert_eq!(
        *titles,
        vec![
            "Trade Opened".to_string(),
            "Take Profit hit".to_string(),
            "Stop Loss hit".to_string(),
            "Trade Closed".to_string(),
        ]
    );
}

#[test]
fn follower_trades_never_alert() {
    let mut center = NotificationCenter::new(true);
    let sink = RecordingSink(RefCell::new(Vec::new()));
    center.ingest_cycle(
        &[batch("f1", false, vec![trade("t1", 50.0, false)])],
        &[],
        &sink,
    );
    assert_eq!(center.notifications().len(), 1);
    assert!(sink.0.borrow().is_empty());
}

#[test]
fn trades_without_an_id_are_skipped() {
    let mut center = NotificationCenter::new(false);
    let sink = NullAlerts;
    center.ingest_cycle(
        &[batch("acc1", false, vec![trade("", 1.0, false)])],
        &[],
        &sink,
    );
    assert!(center.notifications().is_empty());
}
