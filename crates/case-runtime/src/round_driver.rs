//! Round Driver - 20Hz crash game loop
//!
//! Owns the crash round. Bets and cash-outs are queued on a bounded channel
//! and applied at the start of the next tick, before the multiplier moves, so
//! every command sees one consistent round state. A bet that lands after the
//! crash was recorded is rejected and costs nothing.

use crate::{
    crash::{CrashRound, RoundEvent, RoundSnapshot, RoundTimings},
    error::GameError,
    rng::RandomSource,
    session::SessionStore,
    MAX_PENDING_COMMANDS,
};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, oneshot},
    time::Instant,
};

/// Accepted bet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetReceipt {
    pub round_id: u64,
    pub amount: u64,
    pub balance: u64,
}

/// Result of a cash-out request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashOutReceipt {
    pub cashed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub multiplier: Option<f64>,
    pub balance: u64,
}

/// Command queued for the driver
enum RoundCommand {
    PlaceBet {
        wallet: String,
        amount: u64,
        reply: oneshot::Sender<Result<BetReceipt, GameError>>,
    },
    CashOut {
        wallet: String,
        reply: oneshot::Sender<Result<CashOutReceipt, GameError>>,
    },
}

/// Cloneable handle for talking to a running driver
#[derive(Clone)]
pub struct RoundHandle {
    sender: Sender<RoundCommand>,
    snapshot: Arc<RwLock<RoundSnapshot>>,
    updates: broadcast::Sender<RoundSnapshot>,
}

impl RoundHandle {
    fn submit(&self, command: RoundCommand) -> Result<(), GameError> {
        self.sender.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => GameError::Busy,
            TrySendError::Disconnected(_) => GameError::DriverStopped,
        })
    }

    /// Place a bet on the running round
    pub async fn place_bet(&self, wallet: &str, amount: u64) -> Result<BetReceipt, GameError> {
        let wallet = SessionStore::normalize_wallet(wallet)?.to_string();
        let (reply, response) = oneshot::channel();
        self.submit(RoundCommand::PlaceBet {
            wallet,
            amount,
            reply,
        })?;
        response.await.map_err(|_| GameError::DriverStopped)?
    }

    /// Cash out the wallet's active bet, a no-op when there is none
    pub async fn cash_out(&self, wallet: &str) -> Result<CashOutReceipt, GameError> {
        let wallet = SessionStore::normalize_wallet(wallet)?.to_string();
        let (reply, response) = oneshot::channel();
        self.submit(RoundCommand::CashOut { wallet, reply })?;
        response.await.map_err(|_| GameError::DriverStopped)?
    }

    /// Latest published round state
    pub fn snapshot(&self) -> RoundSnapshot {
        self.snapshot.read().clone()
    }

    /// Subscribe to per-tick round updates
    pub fn subscribe(&self) -> broadcast::Receiver<RoundSnapshot> {
        self.updates.subscribe()
    }
}

/// Round Driver
///
/// Runs the crash loop: drains commands, advances the round, publishes state.
pub struct RoundDriver<R> {
    round: CrashRound,
    rng: R,
    sessions: Arc<SessionStore>,
    command_receiver: Receiver<RoundCommand>,
    handle: RoundHandle,
    running: Arc<AtomicBool>,
}

impl<R: RandomSource + Send + 'static> RoundDriver<R> {
    /// Create a new driver; the round starts in `Waiting`
    pub fn new(timings: RoundTimings, rng: R, sessions: Arc<SessionStore>) -> Self {
        Self::with_queue_capacity(timings, rng, sessions, MAX_PENDING_COMMANDS)
    }

    /// Create a driver whose command queue holds at most `capacity` entries
    pub fn with_queue_capacity(
        timings: RoundTimings,
        rng: R,
        sessions: Arc<SessionStore>,
        capacity: usize,
    ) -> Self {
        let (sender, command_receiver) = bounded(capacity.max(1));
        let (updates, _) = broadcast::channel(64);

        let round = CrashRound::new(timings, 0);
        let snapshot = Arc::new(RwLock::new(round.snapshot()));

        Self {
            round,
            rng,
            sessions,
            command_receiver,
            handle: RoundHandle {
                sender,
                snapshot,
                updates,
            },
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a handle for submitting commands and reading state
    pub fn handle(&self) -> RoundHandle {
        self.handle.clone()
    }

    /// Flag shared with `run_async`; clearing it stops the loop
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Apply queued commands against the current round state
    fn drain_commands(&mut self) {
        loop {
            match self.command_receiver.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply(&mut self, command: RoundCommand) {
        let round = &mut self.round;
        match command {
            RoundCommand::PlaceBet {
                wallet,
                amount,
                reply,
            } => {
                let result = self
                    .sessions
                    .with_session(&wallet, |session| {
                        round.place_wager(session, amount).map(|wager| BetReceipt {
                            round_id: wager.round_id,
                            amount: wager.amount,
                            balance: session.balance,
                        })
                    })
                    .and_then(|r| r);

                match &result {
                    Ok(receipt) => tracing::debug!(
                        "Bet {} from {} in round {}",
                        receipt.amount,
                        wallet,
                        receipt.round_id
                    ),
                    Err(e) => tracing::debug!("Bet from {} rejected: {}", wallet, e),
                }
                let _ = reply.send(result);
            }
            RoundCommand::CashOut { wallet, reply } => {
                let result = self.sessions.with_session(&wallet, |session| {
                    match round.cash_out(session) {
                        Some(payout) => CashOutReceipt {
                            cashed_out: true,
                            payout: Some(payout.payout),
                            multiplier: Some(payout.multiplier),
                            balance: payout.balance,
                        },
                        None => CashOutReceipt {
                            cashed_out: false,
                            payout: None,
                            multiplier: None,
                            balance: session.balance,
                        },
                    }
                });

                if let Ok(receipt) = &result {
                    if receipt.cashed_out {
                        tracing::debug!(
                            "{} cashed out {:?} at {:?}x",
                            wallet,
                            receipt.payout,
                            receipt.multiplier
                        );
                    }
                }
                let _ = reply.send(result);
            }
        }
    }

    /// One loop iteration at `now_ms` on the driver clock
    pub fn tick(&mut self, now_ms: u64) -> Option<RoundEvent> {
        self.drain_commands();
        let event = self.round.tick(now_ms, &mut self.rng);

        let snapshot = self.round.snapshot();
        *self.handle.snapshot.write() = snapshot.clone();
        // Broadcast to subscribers (ignore errors if no subscribers)
        let _ = self.handle.updates.send(snapshot);

        event
    }

    /// Run the driver asynchronously (tokio)
    pub async fn run_async(mut self) {
        self.running.store(true, Ordering::SeqCst);

        let tick_ms = self.round.timings().tick_ms.max(1);
        let tick_duration = Duration::from_millis(tick_ms);
        let mut interval = tokio::time::interval(tick_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let clock = Instant::now();

        tracing::info!(
            "Round driver started ({}ms ticks, {}Hz)",
            tick_ms,
            1000 / tick_ms
        );

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            let tick_start = Instant::now();

            let now_ms = clock.elapsed().as_millis() as u64;
            self.tick(now_ms);

            let processing_time = tick_start.elapsed();
            // Warn if we're falling behind
            if processing_time > tick_duration {
                tracing::warn!(
                    "Round {} tick took {:.2}ms (target: {}ms)",
                    self.round.round_id(),
                    processing_time.as_secs_f64() * 1000.0,
                    tick_ms
                );
            }
        }

        tracing::info!("Round driver stopped at round {}", self.round.round_id());
    }
}
