//! Session state machine for the poll → classify → act loop.
//!
//! One `SessionStateMachine` owns one `Session` for its whole life. Each
//! tick performs exactly one cycle with every driver call awaited in
//! sequence, so no two calls ever hit the same page at once.
//!
//! ```text
//! Initializing → AwaitingFirstWindow → Observing ⇄ BetPlaced → Terminated
//! ```

use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::bankroll::BankrollTracker;
use super::cancellation::CancellationWatcher;
use super::status::{self, TableStatus};
use crate::strategy::chips::ChipLadder;
use crate::strategy::{self as staking, pattern};
use crate::table::{parse_balance, Control, DriverError, Field, GameDriver};
use crate::types::{
    AccountId, ActivationRequest, BetOutcome, RoundResult, SessionError, Side, TerminationReason,
};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Timing and table constants shared by every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    /// Upper bound on a single driver call.
    pub driver_timeout: Duration,
    /// Countdown value shown when a betting window has just opened.
    pub anchor_countdown: u32,
    pub chip_ladder: ChipLadder,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            driver_timeout: Duration::from_secs(5),
            anchor_countdown: 12,
            chip_ladder: ChipLadder::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    AwaitingFirstWindow,
    Observing,
    BetPlaced,
    Terminated,
}

/// The wager placed in the current round, awaiting its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingBet {
    side: Side,
    stake: u64,
    /// Countdown shown when the wager went down.
    countdown: Option<u32>,
    /// A non-betting banner has been seen since the wager went down.
    window_closed: bool,
}

impl PendingBet {
    /// Whether a betting banner belongs to a later window than the wager's.
    fn is_later_window(&self, countdown: Option<u32>) -> bool {
        if self.window_closed {
            return true;
        }
        matches!((self.countdown, countdown), (Some(placed), Some(now)) if now > placed)
    }
}

/// Mutable per-activation state. Never shared between sessions.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub account_id: AccountId,
    pub profit_rate: Decimal,
    pub bet_unit: u64,
    phase: Phase,
    bankroll: BankrollTracker,
    bet_position: Option<usize>,
    current_stake: u64,
    last_outcome: BetOutcome,
    pending: Option<PendingBet>,
    bets_placed: u32,
}

impl Session {
    pub fn new(request: &ActivationRequest) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            account_id: request.account_id,
            profit_rate: request.profit_rate,
            bet_unit: request.bet_unit,
            phase: Phase::Initializing,
            bankroll: BankrollTracker::new(Decimal::ZERO, request.profit_rate),
            bet_position: None,
            current_stake: request.bet_unit,
            last_outcome: BetOutcome::Unknown,
            pending: None,
            bets_placed: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn bankroll(&self) -> &BankrollTracker {
        &self.bankroll
    }

    pub fn bet_position(&self) -> Option<usize> {
        self.bet_position
    }

    pub fn current_stake(&self) -> u64 {
        self.current_stake
    }

    pub fn last_outcome(&self) -> BetOutcome {
        self.last_outcome
    }

    pub fn bets_placed(&self) -> u32 {
        self.bets_placed
    }
}

/// Everything the reporter needs once a session has ended.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub account_id: AccountId,
    pub profit_rate: Decimal,
    pub initial_balance: Decimal,
    /// Last balance successfully read from the table.
    pub final_balance: Decimal,
    pub peak_loss_streak: u32,
    pub rounds_played: u32,
    pub bets_placed: u32,
    pub termination: TerminationReason,
}

impl SessionOutcome {
    pub fn profit(&self) -> Decimal {
        self.final_balance - self.initial_balance
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub struct SessionStateMachine {
    driver: Arc<dyn GameDriver>,
    watcher: CancellationWatcher,
    settings: SessionSettings,
    session: Session,
}

impl SessionStateMachine {
    pub fn new(
        request: &ActivationRequest,
        driver: Arc<dyn GameDriver>,
        watcher: CancellationWatcher,
        settings: SessionSettings,
    ) -> Self {
        Self {
            driver,
            watcher,
            settings,
            session: Session::new(request),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Drive the session to completion. Never fails: every error becomes
    /// a termination reason on the returned outcome.
    pub async fn run(mut self) -> SessionOutcome {
        if let Err(e) = self.initialize().await {
            error!(account_id = self.session.account_id, error = %e, "Session failed to initialise");
            return self.finish(TerminationReason::Failed(e));
        }

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match self.step().await {
                Ok(None) => {}
                Ok(Some(reason)) => return self.finish(reason),
                Err(e) => {
                    error!(
                        account_id = self.session.account_id,
                        phase = ?self.session.phase,
                        error = %e,
                        "Polling cycle failed"
                    );
                    return self.finish(TerminationReason::Failed(e));
                }
            }
        }
    }

    /// Capture the opening balance and start waiting for a fresh window.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        let balance = self.read_balance().await?;
        let session = &mut self.session;
        session.bankroll = BankrollTracker::new(balance, session.profit_rate);
        session.bet_position = None;
        session.current_stake = session.bet_unit;
        session.phase = Phase::AwaitingFirstWindow;

        info!(
            account_id = session.account_id,
            session_id = %session.session_id,
            initial_balance = %balance,
            target_balance = %session.bankroll.target_balance(),
            bet_unit = session.bet_unit,
            "Session initialised"
        );
        Ok(())
    }

    /// One poll-classify-act cycle. `Some` means the session is over.
    pub async fn step(&mut self) -> Result<Option<TerminationReason>, SessionError> {
        let text = self.read_status().await?;
        let status = status::classify(&text);
        let phase = self.session.phase;

        match phase {
            Phase::AwaitingFirstWindow => {
                if status.is_fresh_window(self.settings.anchor_countdown) {
                    info!(account_id = self.session.account_id, "First betting window anchored");
                    self.session.phase = Phase::Observing;
                }
                Ok(None)
            }
            Phase::Observing | Phase::BetPlaced => match status {
                TableStatus::Resolved(result) => self.settle(result).await,
                TableStatus::BettingOpen { countdown } => {
                    if phase == Phase::BetPlaced {
                        let later = self
                            .session
                            .pending
                            .map_or(true, |bet| bet.is_later_window(countdown));
                        if !later {
                            return Ok(None);
                        }
                        self.abandon_pending().await?;
                    }
                    self.open_window(countdown).await
                }
                TableStatus::Other => {
                    if let Some(bet) = self.session.pending.as_mut() {
                        bet.window_closed = true;
                    }
                    Ok(None)
                }
            },
            Phase::Initializing | Phase::Terminated => Ok(None),
        }
    }

    /// Resolve the outstanding wager, if any.
    ///
    /// The result banner stays up for several ticks; only the first one
    /// settles the wager.
    async fn settle(&mut self, result: RoundResult) -> Result<Option<TerminationReason>, SessionError> {
        let Some(bet) = self.session.pending.take() else {
            return Ok(None);
        };

        let outcome = BetOutcome::settle(bet.side, result);
        self.session.last_outcome = outcome;
        self.session.phase = Phase::Observing;
        self.session
            .bankroll
            .record_round_result(outcome == BetOutcome::Win, outcome == BetOutcome::Tie);

        let balance = self.read_balance().await?;
        self.session.bankroll.observe_balance(balance);

        let bankroll = &self.session.bankroll;
        info!(
            account_id = self.session.account_id,
            result = %result,
            side = %bet.side,
            stake = bet.stake,
            outcome = %outcome,
            balance = %balance,
            streak = bankroll.consecutive_losses(),
            peak_streak = bankroll.peak_loss_streak(),
            "Round settled"
        );

        if outcome == BetOutcome::Win && bankroll.target_reached() {
            info!(
                account_id = self.session.account_id,
                balance = %balance,
                target = %bankroll.target_balance(),
                "Profit target reached"
            );
            return Ok(Some(TerminationReason::TargetReached));
        }
        Ok(None)
    }

    /// A new window opened while a wager was outstanding: its result
    /// banner was never seen. The round is not counted and the stake falls
    /// back to the unit, as for an unknown outcome.
    async fn abandon_pending(&mut self) -> Result<(), SessionError> {
        let Some(bet) = self.session.pending.take() else {
            return Ok(());
        };
        self.session.last_outcome = BetOutcome::Unknown;
        self.session.phase = Phase::Observing;

        let balance = self.read_balance().await?;
        self.session.bankroll.observe_balance(balance);
        warn!(
            account_id = self.session.account_id,
            side = %bet.side,
            stake = bet.stake,
            balance = %balance,
            "Result banner missed, wager outcome unknown"
        );
        Ok(())
    }

    /// Betting-window decision point: cancellation check, then the wager.
    async fn open_window(
        &mut self,
        countdown: Option<u32>,
    ) -> Result<Option<TerminationReason>, SessionError> {
        let account_id = self.session.account_id;
        let stop = self
            .watcher
            .should_stop(account_id)
            .await
            .map_err(|e| SessionError::AccountStore(e.to_string()))?;
        if stop {
            return Ok(Some(TerminationReason::Cancelled));
        }

        let (position, side) = pattern::next(self.session.bet_position);
        let stake = staking::next_stake(
            self.session.last_outcome,
            self.session.current_stake,
            self.session.bet_unit,
        );
        let balance = self.session.bankroll.current_balance();
        if Decimal::from(stake) > balance {
            return Err(SessionError::StakeExceedsBalance { stake, balance });
        }
        let placements = self.settings.chip_ladder.decompose(stake)?;

        self.session.bet_position = Some(position);
        self.session.current_stake = stake;

        for placement in &placements {
            self.click(Control::Chip(placement.denomination)).await?;
            for _ in 0..placement.count {
                self.click(Control::BetSpot(side)).await?;
            }
        }

        self.session.pending = Some(PendingBet {
            side,
            stake,
            countdown,
            window_closed: false,
        });
        self.session.phase = Phase::BetPlaced;
        self.session.bets_placed += 1;

        info!(
            account_id,
            position,
            side = %side,
            stake,
            chips = placements.len(),
            "Bet placed"
        );
        Ok(None)
    }

    fn finish(&mut self, termination: TerminationReason) -> SessionOutcome {
        self.session.phase = Phase::Terminated;
        let bankroll = &self.session.bankroll;

        info!(
            account_id = self.session.account_id,
            session_id = %self.session.session_id,
            reason = %termination,
            balance = %bankroll.current_balance(),
            profit = %bankroll.current_profit(),
            bets = self.session.bets_placed,
            "Session terminated"
        );

        SessionOutcome {
            session_id: self.session.session_id,
            account_id: self.session.account_id,
            profit_rate: self.session.profit_rate,
            initial_balance: bankroll.initial_balance(),
            final_balance: bankroll.current_balance(),
            peak_loss_streak: bankroll.peak_loss_streak(),
            rounds_played: bankroll.rounds_played(),
            bets_placed: self.session.bets_placed,
            termination,
        }
    }

    // -- Driver access ---------------------------------------------------

    /// Bound a driver call by the configured timeout.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, DriverError>>,
    ) -> Result<T, DriverError> {
        tokio::time::timeout(self.settings.driver_timeout, call)
            .await
            .unwrap_or(Err(DriverError::Timeout))
    }

    async fn connected(&self) -> bool {
        tokio::time::timeout(self.settings.driver_timeout, self.driver.is_connected())
            .await
            .unwrap_or(false)
    }

    /// Map a read that failed twice onto the error taxonomy.
    async fn read_failure(
        &self,
        error: DriverError,
        unavailable: fn(String) -> SessionError,
    ) -> SessionError {
        if error == DriverError::Disconnected || !self.connected().await {
            SessionError::DriverDisconnected
        } else {
            unavailable(error.to_string())
        }
    }

    async fn try_read_status(&self) -> Result<String, DriverError> {
        let text = self.guarded(self.driver.read_text(Field::Status)).await?;
        if text.trim().is_empty() {
            return Err(DriverError::FieldMissing(Field::Status));
        }
        Ok(text)
    }

    async fn try_read_balance(&self) -> Result<Decimal, DriverError> {
        let raw = self.guarded(self.driver.read_balance()).await?;
        parse_balance(&raw)
    }

    /// Status text with one immediate retry.
    async fn read_status(&self) -> Result<String, SessionError> {
        let first = match self.try_read_status().await {
            Ok(text) => return Ok(text),
            Err(DriverError::Disconnected) => return Err(SessionError::DriverDisconnected),
            Err(e) => e,
        };
        warn!(account_id = self.session.account_id, error = %first, "Status read failed, retrying");

        match self.try_read_status().await {
            Ok(text) => Ok(text),
            Err(e) => Err(self.read_failure(e, SessionError::StatusUnavailable).await),
        }
    }

    /// Balance with one immediate retry.
    async fn read_balance(&self) -> Result<Decimal, SessionError> {
        let first = match self.try_read_balance().await {
            Ok(balance) => return Ok(balance),
            Err(DriverError::Disconnected) => return Err(SessionError::DriverDisconnected),
            Err(e) => e,
        };
        warn!(account_id = self.session.account_id, error = %first, "Balance read failed, retrying");

        match self.try_read_balance().await {
            Ok(balance) => Ok(balance),
            Err(e) => Err(self.read_failure(e, SessionError::BalanceUnavailable).await),
        }
    }

    async fn click(&self, control: Control) -> Result<(), SessionError> {
        debug!(account_id = self.session.account_id, control = %control, "Click");
        match self.guarded(self.driver.click(&control)).await {
            Ok(()) => Ok(()),
            Err(DriverError::Disconnected) => Err(SessionError::DriverDisconnected),
            Err(e) => Err(SessionError::PlacementFailed(format!("{control}: {e}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
