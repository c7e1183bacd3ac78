//! Proactive access-token refresh.
//!
//! One timer per session fires `lookahead` before the access token's `exp`.
//! A fire while the user is idle suspends scheduling instead of refreshing;
//! the next [`RefreshScheduler::update_activity`] resumes it.

use chrono::{DateTime, Utc};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};
use tokio::task::JoinHandle;

use super::{
    activity::ActivityTracker,
    coordinator::{RefreshCoordinator, RefreshError},
    token_codec::{self, ParseError},
    tokens::{TokenPair, TokenStore},
};
use crate::utils::time::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Refreshing,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The server no longer knows the session behind the refresh token.
    RefreshRejected,
    /// Refresh kept failing until the access token ran out.
    Expired,
    /// The server answered with an access token the client cannot read.
    MalformedToken,
}

pub type SessionEndCallback = Arc<dyn Fn(SessionEndReason) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTiming {
    pub lookahead: Duration,
    pub idle_threshold: Duration,
    pub retry_interval: Duration,
}

struct Machine {
    state: SchedulerState,
    tokens: Option<TokenPair>,
    expires_at: Option<DateTime<Utc>>,
    /// Bumped whenever pending timers and refresh outcomes must be ignored.
    generation: u64,
    timer: Option<JoinHandle<()>>,
    suspended: bool,
}

impl Machine {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn timer_pending(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

struct Inner {
    coordinator: Arc<RefreshCoordinator>,
    activity: ActivityTracker,
    tokens: TokenStore,
    clock: Arc<dyn Clock>,
    timing: RefreshTiming,
    on_session_end: SessionEndCallback,
    machine: Mutex<Machine>,
}

/// Cheap to clone; all clones drive the same session. Timers run as tokio
/// tasks, so the scheduler must be used from within a runtime.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        activity: ActivityTracker,
        tokens: TokenStore,
        clock: Arc<dyn Clock>,
        timing: RefreshTiming,
        on_session_end: SessionEndCallback,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                coordinator,
                activity,
                tokens,
                clock,
                timing,
                on_session_end,
                machine: Mutex::new(Machine {
                    state: SchedulerState::Idle,
                    tokens: None,
                    expires_at: None,
                    generation: 0,
                    timer: None,
                    suspended: false,
                }),
            }),
        }
    }

    /// Adopts `pair` as the live session and arms the refresh timer. Works
    /// from any state; a pending timer or in-flight refresh of the previous
    /// pair is discarded. An unreadable access token leaves the scheduler as
    /// it was.
    pub fn start_session(&self, pair: TokenPair) -> Result<(), ParseError> {
        let parsed = token_codec::parse(&pair.access_token)?;
        // Detach the old refresh first so it cannot overwrite the new pair.
        self.inner.coordinator.invalidate();
        if let Err(err) = self.inner.tokens.save(&pair) {
            log::warn!("Failed to persist tokens: {}", err);
        }

        let mut machine = self.inner.lock();
        machine.generation += 1;
        self.inner.arm(&mut machine, pair, &parsed.payload);
        log::info!(
            "Refresh scheduler armed for session ending {:?}",
            machine.expires_at
        );
        Ok(())
    }

    pub fn update_activity(&self) {
        let now = self.inner.clock.now();
        self.inner.activity.record_activity(now);

        let mut machine = self.inner.lock();
        if machine.state != SchedulerState::Armed || !machine.suspended || machine.timer_pending() {
            return;
        }

        let remaining = self.inner.remaining(&machine, now);
        let lookahead = self.inner.timing.lookahead.as_secs() as i64;
        if remaining < lookahead {
            log::debug!("Activity resumed inside the refresh window; refreshing now");
            self.inner.begin_refresh(&mut machine);
        } else {
            log::debug!("Activity resumed; re-arming refresh timer");
            machine.suspended = false;
            let delay = Duration::from_secs((remaining - lookahead) as u64);
            self.inner.arm_timer(&mut machine, delay);
        }
    }

    /// Stops scheduling for good. Safe to call repeatedly.
    pub fn destroy(&self) {
        let mut machine = self.inner.lock();
        if machine.state == SchedulerState::Stopped {
            return;
        }
        machine.state = SchedulerState::Stopped;
        machine.generation += 1;
        machine.cancel_timer();
        machine.tokens = None;
        machine.expires_at = None;
        machine.suspended = false;
        self.inner.coordinator.invalidate();
        log::info!("Refresh scheduler stopped");
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.lock().state
    }

    pub fn has_pending_timer(&self) -> bool {
        self.inner.lock().timer_pending()
    }

    pub fn current_tokens(&self) -> Option<TokenPair> {
        self.inner.lock().tokens.clone()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().expires_at
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remaining(&self, machine: &Machine, now: DateTime<Utc>) -> i64 {
        machine
            .expires_at
            .map(|exp| exp.timestamp() - now.timestamp())
            .unwrap_or(0)
    }

    fn arm(
        self: &Arc<Self>,
        machine: &mut Machine,
        pair: TokenPair,
        payload: &serde_json::Map<String, serde_json::Value>,
    ) {
        let now = self.clock.now();
        let until_expiry = token_codec::seconds_until_expiry(payload, now);
        let delay_secs = (until_expiry - self.timing.lookahead.as_secs() as i64).max(0);

        machine.state = SchedulerState::Armed;
        machine.tokens = Some(pair);
        machine.expires_at = token_codec::expires_at(payload);
        machine.suspended = false;
        self.arm_timer(machine, Duration::from_secs(delay_secs as u64));
    }

    fn arm_timer(self: &Arc<Self>, machine: &mut Machine, delay: Duration) {
        machine.cancel_timer();
        let generation = machine.generation;
        let weak = Arc::downgrade(self);
        log::debug!("Next token refresh check in {}s", delay.as_secs());
        machine.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_timer(generation);
            }
        }));
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let mut machine = self.lock();
        if machine.generation != generation || machine.state != SchedulerState::Armed {
            return;
        }
        // The handle belongs to the task running this code.
        machine.timer = None;

        let now = self.clock.now();
        if !self.activity.is_active(now, self.timing.idle_threshold) {
            log::debug!("User idle at refresh time; suspending refresh");
            machine.suspended = true;
            return;
        }
        self.begin_refresh(&mut machine);
    }

    fn begin_refresh(self: &Arc<Self>, machine: &mut Machine) {
        let Some(pair) = machine.tokens.clone() else {
            return;
        };
        machine.state = SchedulerState::Refreshing;
        machine.suspended = false;
        machine.cancel_timer();

        let generation = machine.generation;
        let coordinator = Arc::clone(&self.coordinator);
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = coordinator.refresh(&pair.refresh_token).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_refresh_complete(generation, outcome);
            }
        });
    }

    fn on_refresh_complete(
        self: &Arc<Self>,
        generation: u64,
        outcome: Result<TokenPair, RefreshError>,
    ) {
        let mut machine = self.lock();
        if machine.generation != generation || machine.state != SchedulerState::Refreshing {
            log::debug!("Discarding outcome of a superseded refresh");
            return;
        }

        let now = self.clock.now();
        let ended = match outcome {
            Ok(pair) => match token_codec::parse(&pair.access_token) {
                Ok(parsed) => {
                    self.activity.record_activity(now);
                    self.arm(&mut machine, pair, &parsed.payload);
                    None
                }
                Err(err) => {
                    log::warn!("Refreshed access token is unreadable: {}", err);
                    Some(SessionEndReason::MalformedToken)
                }
            },
            Err(err) if !err.is_transient() => {
                log::warn!("Refresh token rejected ({}); ending session", err);
                Some(SessionEndReason::RefreshRejected)
            }
            Err(err) => {
                let remaining = self.remaining(&machine, now);
                if remaining <= 0 {
                    log::warn!("Token refresh failed after expiry: {}", err);
                    Some(SessionEndReason::Expired)
                } else {
                    let retry = self
                        .timing
                        .retry_interval
                        .min(Duration::from_secs(remaining as u64));
                    log::warn!(
                        "Token refresh failed: {}; retrying in {}s",
                        err,
                        retry.as_secs()
                    );
                    machine.state = SchedulerState::Armed;
                    self.arm_timer(&mut machine, retry);
                    None
                }
            }
        };

        if let Some(reason) = ended {
            self.end_session(&mut machine);
            drop(machine);
            (self.on_session_end)(reason);
        }
    }

    fn end_session(&self, machine: &mut Machine) {
        machine.state = SchedulerState::Stopped;
        machine.generation += 1;
        machine.cancel_timer();
        machine.tokens = None;
        machine.expires_at = None;
        machine.suspended = false;
        if let Err(err) = self.tokens.clear() {
            log::warn!("Failed to clear tokens: {}", err);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let machine = self
            .machine
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        machine.cancel_timer();
    }
}
