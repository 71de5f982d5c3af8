//! Full sessions driven through the supervisor: activation, wagering,
//! termination, receipt persistence and the contact summary.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use banco::engine::reporter::OutcomeReporter;
use banco::engine::session::SessionSettings;
use banco::engine::supervisor::{SessionSupervisor, StartError};
use banco::storage::{AccountStore, MemoryStore, ReceiptStore, SqliteStore};
use banco::strategy::chips::ChipLadder;
use banco::table::{Control, DriverError};
use banco::alerts::Notifier;
use banco::types::{ActivationRequest, BotStatus, OutcomeReceipt, ReceiptStatus, ReportError, Side};

use crate::mock_table::{FailingNotifier, Frame, MockTable, MockTableFactory, RecordingNotifier};

const ACCOUNT: i64 = 1;
const EMAIL: &str = "ops@example.com";

/// Loses three banker bets, then wins the player bet at stake 16.
const MARTINGALE_TO_TARGET: &[&str] = &[
    "PLACE YOUR BETS 9",
    "NO MORE BETS",
    "BANKER WINS",
    "PLACE YOUR BETS 12",
    "PLACE YOUR BETS 11",
    "NO MORE BETS",
    "PLAYER WINS",
    "PLAYER WINS",
    "PLACE YOUR BETS 12",
    "PLAYER WINS",
    "PLACE YOUR BETS 12",
    "PLAYER WINS",
    "PLACE YOUR BETS 12",
    "PLAYER WINS",
];

fn settings() -> SessionSettings {
    SessionSettings {
        poll_interval: Duration::from_millis(1),
        driver_timeout: Duration::from_millis(200),
        anchor_countdown: 12,
        chip_ladder: ChipLadder::default(),
    }
}

fn request(bet_unit: u64, profit_rate: Decimal) -> ActivationRequest {
    ActivationRequest {
        account_id: ACCOUNT,
        bet_unit,
        profit_rate,
    }
}

fn supervisor(
    table: &Arc<MockTable>,
    accounts: Arc<dyn AccountStore>,
    receipts: Arc<dyn ReceiptStore>,
    notifier: &Arc<RecordingNotifier>,
) -> SessionSupervisor {
    let notifier: Arc<dyn Notifier> = notifier.clone();
    supervisor_with(table, accounts, receipts, notifier)
}

fn supervisor_with(
    table: &Arc<MockTable>,
    accounts: Arc<dyn AccountStore>,
    receipts: Arc<dyn ReceiptStore>,
    notifier: Arc<dyn Notifier>,
) -> SessionSupervisor {
    let reporter = Arc::new(OutcomeReporter::new(receipts, accounts.clone(), notifier));
    SessionSupervisor::new(
        accounts,
        reporter,
        Arc::new(MockTableFactory(table.clone())),
        settings(),
    )
}

async fn memory_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(ACCOUNT, Some(EMAIL.into())).await;
    store
}

fn leak(frames: Vec<&'static str>) -> &'static [&'static str] {
    Box::leak(frames.into_boxed_slice())
}

/// Poll until `done` holds, failing the test after five seconds.
async fn until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never held");
}

async fn run(sup: &SessionSupervisor, req: ActivationRequest) -> OutcomeReceipt {
    let session_id = sup.start_session(req).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), sup.wait(session_id))
        .await
        .expect("session did not finish")
        .unwrap()
}

#[tokio::test]
async fn test_martingale_reaches_target() {
    let table = Arc::new(MockTable::scripted(dec!(100), MARTINGALE_TO_TARGET));
    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    let receipt = run(&sup, request(2, dec!(0.01))).await;

    assert_eq!(receipt.status, ReceiptStatus::Complete);
    assert_eq!(receipt.initial_balance, dec!(100));
    assert_eq!(receipt.balance, dec!(102));
    assert_eq!(receipt.profit, dec!(2));
    assert_eq!(receipt.number_of_consecutive_losses, 3);
    assert_eq!(receipt.rounds_played, 4);
    assert_eq!(receipt.termination, "target reached");
    assert_eq!(table.frames_left(), 0);

    use Control::{BetSpot, Chip};
    use Side::{Banker, Player};
    assert_eq!(
        table.clicks(),
        vec![
            // stake 2
            Chip(2), BetSpot(Banker),
            // stake 4
            Chip(2), BetSpot(Banker), BetSpot(Banker),
            // stake 8
            Chip(5), BetSpot(Banker), Chip(2), BetSpot(Banker), Chip(1), BetSpot(Banker),
            // stake 16
            Chip(5), BetSpot(Player), BetSpot(Player), BetSpot(Player), Chip(1), BetSpot(Player),
        ]
    );

    assert_eq!(store.get_bot_status(ACCOUNT).await.unwrap(), BotStatus::Inactive);
    assert_eq!(store.receipts().await.len(), 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, EMAIL);
    assert_eq!(sent[0].1.session_id, receipt.session_id);
}

#[tokio::test]
async fn test_receipt_persisted_in_sqlite() {
    let table = Arc::new(MockTable::scripted(dec!(100), MARTINGALE_TO_TARGET));
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    store.upsert_account(ACCOUNT, Some(EMAIL)).await.unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    let receipt = run(&sup, request(2, dec!(0.01))).await;

    let stored = store.list_for_account(ACCOUNT).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].receipt.session_id, receipt.session_id);
    assert_eq!(stored[0].receipt.balance, dec!(102));
    assert_eq!(stored[0].receipt.status, ReceiptStatus::Complete);
    assert_eq!(store.get_bot_status(ACCOUNT).await.unwrap(), BotStatus::Inactive);
}

#[tokio::test]
async fn test_cancellation_honoured_at_next_window() {
    let table = Arc::new(MockTable::scripted(
        dec!(100),
        &[
            "PLACE YOUR BETS 12",
            "PLACE YOUR BETS 11",
            "PLAYER WINS",
            "PLACE YOUR BETS 12",
            "BANKER WINS",
        ],
    ));
    let store = memory_store().await;
    // Switched off after the first round resolves, before the next window.
    table.deactivate_before_read(3, store.clone(), ACCOUNT);
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    let receipt = run(&sup, request(2, dec!(0.05))).await;

    assert_eq!(receipt.status, ReceiptStatus::Incomplete);
    assert_eq!(receipt.termination, "cancelled");
    assert_eq!(receipt.balance, dec!(98));
    assert_eq!(receipt.profit, dec!(-2));
    assert_eq!(receipt.number_of_consecutive_losses, 1);
    assert_eq!(table.clicks(), vec![Control::Chip(2), Control::BetSpot(Side::Banker)]);
    assert_eq!(table.frames_left(), 1);
}

#[tokio::test]
async fn test_disconnect_with_bet_outstanding() {
    let table = Arc::new(MockTable::new(
        dec!(100),
        vec![
            Frame::Text("PLACE YOUR BETS 12"),
            Frame::Text("PLACE YOUR BETS 11"),
            Frame::Text("NO MORE BETS"),
            Frame::Fail(DriverError::Disconnected),
            Frame::Text("BANKER WINS"),
        ],
    ));
    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    let receipt = run(&sup, request(2, dec!(0.05))).await;

    assert_eq!(receipt.status, ReceiptStatus::Incomplete);
    assert!(receipt.termination.starts_with("failed"));
    // The wager was never settled; the last balance read was the opening one.
    assert_eq!(receipt.balance, dec!(100));
    assert_eq!(receipt.rounds_played, 0);
    assert_eq!(store.receipts().await.len(), 1);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(store.get_bot_status(ACCOUNT).await.unwrap(), BotStatus::Inactive);
}

#[tokio::test]
async fn test_win_resets_stake_and_streak() {
    let table = Arc::new(MockTable::scripted(
        dec!(1000),
        &[
            "PLACE YOUR BETS 12",
            "PLACE YOUR BETS 11",
            "PLAYER WINS",
            "PLACE YOUR BETS 12",
            "BANKER WINS",
            "PLACE YOUR BETS 12",
        ],
    ));
    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    let receipt = run(&sup, request(2, dec!(0.05))).await;

    use Control::{BetSpot, Chip};
    assert_eq!(
        table.clicks(),
        vec![
            Chip(2), BetSpot(Side::Banker),
            Chip(2), BetSpot(Side::Banker), BetSpot(Side::Banker),
            Chip(2), BetSpot(Side::Banker),
        ]
    );
    assert_eq!(receipt.status, ReceiptStatus::Incomplete);
    assert_eq!(receipt.balance, dec!(1002));
    assert_eq!(receipt.number_of_consecutive_losses, 1);
    assert_eq!(receipt.rounds_played, 2);
}

#[tokio::test]
async fn test_second_activation_rejected_while_running() {
    let mut frames = vec!["PLACE YOUR BETS 12"];
    frames.extend(std::iter::repeat("NO MORE BETS").take(50));
    let frames: &'static [&'static str] = Box::leak(frames.into_boxed_slice());

    let table = Arc::new(MockTable::scripted(dec!(100), frames));
    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    let first = sup.start_session(request(2, dec!(0.05))).await.unwrap();
    let second = sup.start_session(request(5, dec!(0.10))).await;
    assert!(matches!(second, Err(StartError::AlreadyActive(ACCOUNT))));
    assert_eq!(sup.sessions().await.len(), 1);

    let receipt = tokio::time::timeout(Duration::from_secs(5), sup.wait(first))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Incomplete);
    assert!(table.clicks().is_empty());
}

#[tokio::test]
async fn test_shutdown_cancels_running_sessions() {
    let mut frames = vec!["PLACE YOUR BETS 12"];
    for _ in 0..200 {
        frames.extend(["PLACE YOUR BETS 11", "NO MORE BETS", "TIE", "PLACE YOUR BETS 12"]);
    }
    let frames: &'static [&'static str] = Box::leak(frames.into_boxed_slice());

    let table = Arc::new(MockTable::scripted(dec!(500), frames));
    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    sup.start_session(request(2, dec!(0.05))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let results = tokio::time::timeout(Duration::from_secs(5), sup.shutdown())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    let receipt = results.into_iter().next().unwrap().unwrap();
    assert_eq!(receipt.termination, "cancelled");
    // Ties push, so the balance never moves.
    assert_eq!(receipt.balance, dec!(500));
    assert!(sup.sessions().await.is_empty());
}

#[tokio::test]
async fn test_restart_refused_while_deactivated_session_finishes_round() {
    let mut frames = vec!["PLACE YOUR BETS 12", "PLACE YOUR BETS 11"];
    frames.extend(std::iter::repeat("NO MORE BETS").take(300));
    frames.extend(["BANKER WINS", "PLACE YOUR BETS 12"]);

    let table = Arc::new(MockTable::scripted(dec!(100), leak(frames)));
    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    let first = sup.start_session(request(2, dec!(0.05))).await.unwrap();
    until(|| !table.clicks().is_empty()).await;

    sup.deactivate(ACCOUNT).await.unwrap();
    let second = sup.start_session(request(2, dec!(0.05))).await;
    assert!(matches!(second, Err(StartError::AlreadyActive(ACCOUNT))));
    assert_eq!(sup.sessions().await.len(), 1);
    assert_eq!(store.get_bot_status(ACCOUNT).await.unwrap(), BotStatus::Inactive);

    let receipt = tokio::time::timeout(Duration::from_secs(5), sup.wait(first))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.termination, "cancelled");
    assert_eq!(receipt.balance, dec!(102));
    assert_eq!(table.clicks(), vec![Control::Chip(2), Control::BetSpot(Side::Banker)]);
    assert_eq!(store.receipts().await.len(), 1);
}

#[tokio::test]
async fn test_missed_result_still_honours_deactivation() {
    let mut frames = vec!["PLACE YOUR BETS 12", "PLACE YOUR BETS 11", "NO MORE BETS"];
    for _ in 0..30 {
        frames.extend(["PLACE YOUR BETS 12", "PLACE YOUR BETS 11", "NO MORE BETS"]);
    }

    let table = Arc::new(MockTable::scripted(dec!(100), leak(frames)));
    let store = memory_store().await;
    // Switched off before the second window opens; no result is ever shown.
    table.deactivate_before_read(3, store.clone(), ACCOUNT);
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    let receipt = run(&sup, request(2, dec!(0.05))).await;

    assert_eq!(receipt.termination, "cancelled");
    assert_eq!(receipt.rounds_played, 0);
    assert_eq!(receipt.balance, dec!(98));
    assert_eq!(table.clicks(), vec![Control::Chip(2), Control::BetSpot(Side::Banker)]);
    assert_eq!(table.frames_left(), 89);
}

#[tokio::test]
async fn test_notification_failure_reaches_caller_with_receipt() {
    let table = Arc::new(MockTable::scripted(
        dec!(100),
        &["PLACE YOUR BETS 12", "PLACE YOUR BETS 11", "BANKER WINS"],
    ));
    let store = memory_store().await;
    let sup = supervisor_with(&table, store.clone(), store.clone(), Arc::new(FailingNotifier));

    let session_id = sup.start_session(request(2, dec!(0.01))).await.unwrap();
    let err = tokio::time::timeout(Duration::from_secs(5), sup.wait(session_id))
        .await
        .unwrap()
        .unwrap_err();

    match err.downcast_ref::<ReportError>() {
        Some(ReportError::Notification { receipt, .. }) => {
            assert_eq!(receipt.session_id, session_id);
            assert_eq!(receipt.status, ReceiptStatus::Complete);
            assert_eq!(receipt.balance, dec!(102));
        }
        other => panic!("expected a notification error, got {other:?}"),
    }
    assert_eq!(store.receipts().await.len(), 1);
    assert_eq!(store.get_bot_status(ACCOUNT).await.unwrap(), BotStatus::Inactive);
}

#[tokio::test]
async fn test_finished_sessions_pruned_on_next_start() {
    let table = Arc::new(MockTable::scripted(
        dec!(100),
        &["PLACE YOUR BETS 12", "PLACE YOUR BETS 11", "BANKER WINS"],
    ));
    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor(&table, store.clone(), store.clone(), &notifier);

    let first = sup.start_session(request(2, dec!(0.01))).await.unwrap();
    until(|| notifier.sent().len() == 1).await;
    until_idle(&sup).await;

    // The script is spent, so the second session ends on a disconnect.
    let second = sup.start_session(request(2, dec!(0.01))).await.unwrap();
    assert!(sup.wait(first).await.is_err());

    let receipt = tokio::time::timeout(Duration::from_secs(5), sup.wait(second))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Incomplete);
    assert_eq!(store.receipts().await.len(), 2);
}

async fn until_idle(sup: &SessionSupervisor) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !sup.sessions().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("sessions never finished");
}
