//! Crash Round - the wager timer state machine
//!
//! `Waiting → Running → Crashed → Waiting`, driven by `tick`. While running,
//! every tick raises the multiplier by 0.01 until it reaches the threshold
//! drawn at round start; the round then crashes and every open wager is lost.
//!
//! The machine takes timestamps from its caller and owns no timers, so it can
//! be stepped deterministically in tests.

use crate::{
    error::GameError, rng::RandomSource, session::Session, CRASHED_DELAY_MS, TICK_MS,
    WAITING_DELAY_MS,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Multiplier increment per running tick, in hundredths
const STEP_HUNDREDTHS: u64 = 1;

/// Width of the crash threshold range above 1.0
const THRESHOLD_SPAN: f64 = 10.0;

/// Round phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundState {
    Waiting,
    Running,
    Crashed,
}

/// Round timing configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundTimings {
    /// Time spent waiting before a round starts
    pub waiting_delay_ms: u64,
    /// Multiplier step period
    pub tick_ms: u64,
    /// Time the crash stays visible before the next wait
    pub crashed_delay_ms: u64,
}

impl Default for RoundTimings {
    fn default() -> Self {
        Self {
            waiting_delay_ms: WAITING_DELAY_MS,
            tick_ms: TICK_MS,
            crashed_delay_ms: CRASHED_DELAY_MS,
        }
    }
}

/// An open bet on the current round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub amount: u64,
    /// Round the wager was placed in
    pub round_id: u64,
}

/// State transition emitted by `tick`
#[derive(Clone, Debug, PartialEq)]
pub enum RoundEvent {
    Started {
        round_id: u64,
        at_ms: u64,
    },
    Crashed {
        round_id: u64,
        crash_point: f64,
        at_ms: u64,
        /// Wallets whose wagers were lost, with the amounts
        forfeited: Vec<(String, u64)>,
    },
    Reset {
        round_id: u64,
        at_ms: u64,
    },
}

/// Public view of the round
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    pub round_id: u64,
    pub state: RoundState,
    pub multiplier: f64,
    /// Only revealed once the round has crashed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub crash_point: Option<f64>,
    pub active_wagers: usize,
    /// When the current state was entered, in ms on the driver clock
    pub state_since_ms: u64,
}

/// Outcome of a cash-out
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Payout {
    pub wager: u64,
    pub multiplier: f64,
    pub payout: u64,
    pub balance: u64,
}

/// A single crash round, reused across rounds
#[derive(Clone, Debug)]
pub struct CrashRound {
    timings: RoundTimings,
    round_id: u64,
    state: RoundState,
    /// Running ticks taken this round
    steps: u64,
    multiplier: f64,
    crash_threshold: f64,
    state_since_ms: u64,
    wagers: HashMap<String, Wager>,
}

impl CrashRound {
    /// Create a round in `Waiting`, entered at `now_ms`
    pub fn new(timings: RoundTimings, now_ms: u64) -> Self {
        Self {
            timings,
            round_id: 0,
            state: RoundState::Waiting,
            steps: 0,
            multiplier: 1.0,
            crash_threshold: 1.0,
            state_since_ms: now_ms,
            wagers: HashMap::new(),
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Running multiplier in hundredths, exact for every step
    fn multiplier_hundredths(&self) -> u64 {
        100 + self.steps * STEP_HUNDREDTHS
    }

    /// Threshold drawn for the current round
    pub fn crash_threshold(&self) -> f64 {
        self.crash_threshold
    }

    pub fn timings(&self) -> RoundTimings {
        self.timings
    }

    pub fn state_since_ms(&self) -> u64 {
        self.state_since_ms
    }

    pub fn wager(&self, wallet: &str) -> Option<Wager> {
        self.wagers.get(wallet).copied()
    }

    pub fn active_wagers(&self) -> usize {
        self.wagers.len()
    }

    /// Draw a crash threshold uniformly from `[1, 11)`
    pub fn draw_threshold<R: RandomSource + ?Sized>(rng: &mut R) -> f64 {
        let unit = rng.next_unit().clamp(0.0, 1.0);
        let threshold = 1.0 + unit * THRESHOLD_SPAN;
        threshold.min(1.0 + THRESHOLD_SPAN - f64::EPSILON * 16.0)
    }

    /// Advance the machine to `now_ms`.
    ///
    /// A running round takes exactly one step per call; the driver calls this
    /// once per tick period.
    pub fn tick<R: RandomSource + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> Option<RoundEvent> {
        let elapsed = now_ms.saturating_sub(self.state_since_ms);
        match self.state {
            RoundState::Waiting if elapsed >= self.timings.waiting_delay_ms => {
                let threshold = Self::draw_threshold(rng);
                Some(self.start(threshold, now_ms))
            }
            RoundState::Running => self.step(now_ms),
            RoundState::Crashed if elapsed >= self.timings.crashed_delay_ms => {
                self.enter(RoundState::Waiting, now_ms);
                tracing::debug!("Round {} reset to waiting", self.round_id);
                Some(RoundEvent::Reset {
                    round_id: self.round_id,
                    at_ms: now_ms,
                })
            }
            _ => None,
        }
    }

    /// Start a round with the given threshold
    pub fn start(&mut self, crash_threshold: f64, now_ms: u64) -> RoundEvent {
        self.round_id += 1;
        self.steps = 0;
        self.multiplier = 1.0;
        self.crash_threshold = crash_threshold;
        self.wagers.clear();
        self.enter(RoundState::Running, now_ms);

        tracing::debug!("Round {} started", self.round_id);
        RoundEvent::Started {
            round_id: self.round_id,
            at_ms: now_ms,
        }
    }

    /// Raise the multiplier one step, crashing at the threshold
    fn step(&mut self, now_ms: u64) -> Option<RoundEvent> {
        self.steps += 1;
        let next = self.multiplier_hundredths() as f64 / 100.0;

        if next < self.crash_threshold {
            self.multiplier = next;
            return None;
        }

        self.multiplier = self.crash_threshold;
        self.enter(RoundState::Crashed, now_ms);

        let mut forfeited: Vec<(String, u64)> = self
            .wagers
            .drain()
            .map(|(wallet, wager)| (wallet, wager.amount))
            .collect();
        forfeited.sort();

        tracing::info!(
            "Round {} crashed at {:.2}x ({} wagers lost)",
            self.round_id,
            self.crash_threshold,
            forfeited.len()
        );

        Some(RoundEvent::Crashed {
            round_id: self.round_id,
            crash_point: self.crash_threshold,
            at_ms: now_ms,
            forfeited,
        })
    }

    fn enter(&mut self, state: RoundState, now_ms: u64) {
        self.state = state;
        self.state_since_ms = now_ms;
    }

    /// Place a wager for the session's wallet, deducting it at once
    pub fn place_wager(&mut self, session: &mut Session, amount: u64) -> Result<Wager, GameError> {
        if self.state != RoundState::Running {
            return Err(GameError::RoundNotRunning);
        }
        if amount == 0 {
            return Err(GameError::InvalidAmount);
        }
        if self.wagers.contains_key(&session.wallet_address) {
            return Err(GameError::WagerAlreadyActive);
        }

        session.debit(amount)?;

        let wager = Wager {
            amount,
            round_id: self.round_id,
        };
        self.wagers.insert(session.wallet_address.clone(), wager);
        Ok(wager)
    }

    /// Cash out the session's wager at the current multiplier.
    ///
    /// Returns `None` without touching anything when the round is not running
    /// or the wallet holds no wager.
    pub fn cash_out(&mut self, session: &mut Session) -> Option<Payout> {
        if self.state != RoundState::Running {
            return None;
        }
        let wager = self.wagers.remove(&session.wallet_address)?;

        let payout = payout_for(wager.amount, self.multiplier_hundredths());
        let balance = session.credit(payout);

        Some(Payout {
            wager: wager.amount,
            multiplier: self.multiplier,
            payout,
            balance,
        })
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            round_id: self.round_id,
            state: self.state,
            multiplier: self.multiplier,
            crash_point: (self.state == RoundState::Crashed).then_some(self.crash_threshold),
            active_wagers: self.wagers.len(),
            state_since_ms: self.state_since_ms,
        }
    }
}

/// `floor(amount × hundredths / 100)` in integers
fn payout_for(amount: u64, multiplier_hundredths: u64) -> u64 {
    let payout = amount as u128 * multiplier_hundredths as u128 / 100;
    u64::try_from(payout).unwrap_or(u64::MAX)
}
