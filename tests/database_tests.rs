/// Integration tests for the SQLite persistence layer.
use chrono::{Duration, Utc};
use tempfile::NamedTempFile;

#[path = "../src/models.rs"]
mod models;

#[path = "../src/database.rs"]
mod database;

use database::Database;
use models::{Challenge, Payout, PayoutStatus, Platform};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tmp_db() -> (NamedTempFile, Database) {
    let f = NamedTempFile::new().expect("tempfile");
    let db = Database::open(f.path().to_str().unwrap()).expect("open db");
    (f, db)
}

fn sample_challenge(n: u32) -> Challenge {
    Challenge {
        id: format!("ch{n}"),
        account_id: format!("acc{n}"),
        alias: format!("Account {n}"),
        owner: "me".into(),
        prop_firm: "FTMO".into(),
        phase: "Phase 1".into(),
        platform: Platform::MT5,
        target_pct: 10.0,
        daily_dd_pct: None,
        max_dd_pct: Some(8.0),
        is_master: n == 0,
        cost: 540.0,
        login_number: format!("10{n}"),
        login_server: "FTMO-Server2".into(),
        started_at: Some(Utc::now() - Duration::days(3)),
        created_at: Utc::now() + Duration::seconds(n as i64),
    }
}

fn sample_payout(id: &str, challenge_id: &str, amount: f64, status: PayoutStatus) -> Payout {
    let now = Utc::now();
    Payout {
        id: id.into(),
        challenge_id: challenge_id.into(),
        amount,
        status,
        requested_at: now,
        received_at: matches!(status, PayoutStatus::Received).then_some(now),
        notes: None,
        created_at: now,
    }
}

// ---------------------------------------------------------------------------
// Challenges
// ---------------------------------------------------------------------------

#[test]
fn challenge_round_trip() {
    let (_f, db) = tmp_db();
    let ch = sample_challenge(1);
    db.insert_challenge(&ch).expect("insert");

    let got = db.get_challenges().expect("get");
    assert_eq!(got.len(), 1);
    let row = &got[0];
    assert_eq!(row.id, "ch1");
    assert_eq!(row.account_id, "acc1");
    assert_eq!(row.platform, Platform::MT5);
    assert_eq!(row.target_pct, 10.0);
    assert_eq!(row.daily_dd_pct, None);
    assert_eq!(row.max_dd_pct, Some(8.0));
    assert!(!row.is_master);
    assert!(row.started_at.is_some());
}

#[test]
fn challenges_come_back_newest_first() {
    let (_f, db) = tmp_db();
    for n in 0..3 {
        db.insert_challenge(&sample_challenge(n)).expect("insert");
    }
    let ids: Vec<String> = db
        .get_challenges()
        .expect("get")
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec!["ch2", "ch1", "ch0"]);
}

#[test]
fn deleting_a_challenge_cascades_to_snapshots_and_payouts() {
    let (_f, db) = tmp_db();
    db.insert_challenge(&sample_challenge(1)).expect("insert");
    db.insert_snapshot("ch1", 1000.0, 1000.0, 0.0, 0.0)
        .expect("snapshot");
    db.insert_payout(&sample_payout("p1", "ch1", 400.0, PayoutStatus::Pending))
        .expect("payout");

    db.delete_challenge("ch1").expect("delete");

    assert!(db.get_challenges().expect("get").is_empty());
    assert!(db.get_snapshots("ch1", 10).expect("snapshots").is_empty());
    assert!(db.get_payouts().expect("payouts").is_empty());
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[test]
fn earliest_snapshot_balance_is_the_first_recorded() {
    let (_f, db) = tmp_db();
    db.insert_challenge(&sample_challenge(1)).expect("insert");

    assert_eq!(db.earliest_snapshot_balance("ch1").expect("query"), None);

    db.insert_snapshot("ch1", 1000.0, 1000.0, 0.0, 0.0)
        .expect("s1");
    std::thread::sleep(std::time::Duration::from_millis(5));
    db.insert_snapshot("ch1", 1050.0, 1048.0, 0.0, -2.0)
        .expect("s2");

    assert_eq!(
        db.earliest_snapshot_balance("ch1").expect("query"),
        Some(1000.0)
    );
}

#[test]
fn snapshot_listing_respects_limit() {
    let (_f, db) = tmp_db();
    db.insert_challenge(&sample_challenge(1)).expect("insert");
    for i in 0..5 {
        db.insert_snapshot("ch1", 1000.0 + i as f64, 1000.0, 0.0, 0.0)
            .expect("snapshot");
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    let snaps = db.get_snapshots("ch1", 3).expect("snapshots");
    assert_eq!(snaps.len(), 3);
    // Newest first
    assert_eq!(snaps[0].balance, 1004.0);
}

// ---------------------------------------------------------------------------
// Payouts
// ---------------------------------------------------------------------------

#[test]
fn payout_totals_split_by_status() {
    let (_f, db) = tmp_db();
    db.insert_challenge(&sample_challenge(1)).expect("insert");
    db.insert_payout(&sample_payout("p1", "ch1", 400.0, PayoutStatus::Received))
        .expect("p1");
    db.insert_payout(&sample_payout("p2", "ch1", 250.0, PayoutStatus::Pending))
        .expect("p2");
    db.insert_payout(&sample_payout("p3", "ch1", 100.0, PayoutStatus::Rejected))
        .expect("p3");

    let (received, pending) = db.payout_totals().expect("totals");
    assert_eq!(received, 400.0);
    assert_eq!(pending, 250.0);
}

#[test]
fn payout_status_update_round_trip() {
    let (_f, db) = tmp_db();
    db.insert_challenge(&sample_challenge(1)).expect("insert");
    db.insert_payout(&sample_payout("p1", "ch1", 400.0, PayoutStatus::Pending))
        .expect("insert payout");

    let when = Utc::now();
    db.update_payout_status("p1", PayoutStatus::Received, Some(when))
        .expect("update");

    let payouts = db.get_payouts().expect("get");
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].status, PayoutStatus::Received);
    assert!(payouts[0].received_at.is_some());

    let (received, pending) = db.payout_totals().expect("totals");
    assert_eq!(received, 400.0);
    assert_eq!(pending, 0.0);
}

#[test]
fn delete_payout_removes_only_that_payout() {
    let (_f, db) = tmp_db();
    db.insert_challenge(&sample_challenge(1)).expect("insert");
    db.insert_payout(&sample_payout("p1", "ch1", 400.0, PayoutStatus::Pending))
        .expect("p1");
    db.insert_payout(&sample_payout("p2", "ch1", 250.0, PayoutStatus::Pending))
        .expect("p2");

    db.delete_payout("p1").expect("delete");

    let payouts = db.get_payouts().expect("get");
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].id, "p2");
}
