//! Pure supervisor state machine.
//!
//! `SupervisorState::apply` folds one [`Event`] into the state and returns the
//! [`Effect`]s the async driver must carry out. The function has no side
//! effects and no clock, so a recorded event history replays to the same
//! state with [`SupervisorState::replay`].
//!
//! Phases move `Pending -> Running -> Completed`. Only a work-unit
//! completion reaches `Completed`; cancellation and the start timeout merely
//! influence how the work unit is driven and what the terminal result is.

use std::time::Duration;

use alo_core::{AloInfo, AloStatus};

use super::failure::{AloFailure, Outcome};

// ---------------------------------------------------------------------------
// Events and effects
// ---------------------------------------------------------------------------

/// Lifecycle phase of a supervised operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Pending,
    Running,
    Completed,
}

/// Input to the decision loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The work unit finished.
    Completed(Outcome),
    /// The work unit reported itself started, possibly again.
    Started(AloInfo),
    /// The start-acknowledgement timer expired.
    StartTimeoutFired,
    /// A caller asked for cancellation.
    CancelRequested,
    /// The driver attempted the completion callback.
    CallbackAttempted,
}

/// Action requested from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Forward cancellation into the work unit.
    PropagateCancel,
    /// Stop the work unit without waiting for it to notice cancellation.
    AbortWorkUnit,
    /// Replace the queryable snapshot.
    PublishInfo(AloInfo),
    /// Deliver the terminal result to the request's callback.
    InvokeCallback(Outcome),
    /// Hand the terminal result to waiters.
    Resolve(Outcome),
}

// ---------------------------------------------------------------------------
// SupervisorState
// ---------------------------------------------------------------------------

/// Decision state for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorState {
    id: String,
    start_timeout: Duration,
    has_callback: bool,
    phase: Phase,
    info: Option<AloInfo>,
    timed_out: bool,
    cancel_propagated: bool,
    callback_attempted: bool,
    outcome: Option<Outcome>,
}

impl SupervisorState {
    /// Fresh state for operation `id`.
    #[must_use]
    pub fn new(id: impl Into<String>, start_timeout: Duration, has_callback: bool) -> Self {
        Self {
            id: id.into(),
            start_timeout,
            has_callback,
            phase: Phase::Pending,
            info: None,
            timed_out: false,
            cancel_propagated: false,
            callback_attempted: false,
            outcome: None,
        }
    }

    /// Rebuild the state of a supervisor from its recorded history.
    ///
    /// Returns the state together with every effect the history produced. A
    /// history that already holds `CallbackAttempted` yields no
    /// `InvokeCallback` effect, so a resumed driver never calls back twice.
    #[must_use]
    pub fn replay(mut self, history: &[Event]) -> (Self, Vec<Effect>) {
        self.callback_attempted = history
            .iter()
            .any(|event| matches!(event, Event::CallbackAttempted));
        let mut effects = Vec::new();
        for event in history {
            effects.extend(self.apply(event.clone()));
        }
        (self, effects)
    }

    /// Fold one event into the state.
    pub fn apply(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Completed(outcome) => self.complete(outcome),
            Event::Started(info) => self.start(info),
            Event::StartTimeoutFired => self.start_timeout_fired(),
            Event::CancelRequested => self.cancel_requested(),
            Event::CallbackAttempted => {
                self.callback_attempted = true;
                Vec::new()
            }
        }
    }

    fn complete(&mut self, outcome: Outcome) -> Vec<Effect> {
        if self.phase == Phase::Completed {
            return Vec::new();
        }
        let outcome = if self.timed_out {
            Err(AloFailure::OperationTimeout {
                after: self.start_timeout,
            })
        } else {
            outcome
        };

        let mut info = self
            .info
            .take()
            .unwrap_or_else(|| AloInfo::new(self.id.clone(), AloStatus::Completed));
        info.status = AloStatus::Completed;

        self.phase = Phase::Completed;
        self.info = Some(info.clone());
        self.outcome = Some(outcome.clone());

        let mut effects = vec![Effect::PublishInfo(info)];
        if self.has_callback && !self.callback_attempted {
            effects.push(Effect::InvokeCallback(outcome.clone()));
        }
        effects.push(Effect::Resolve(outcome));
        effects
    }

    fn start(&mut self, mut info: AloInfo) -> Vec<Effect> {
        if self.phase == Phase::Completed || self.timed_out {
            return Vec::new();
        }
        let floor = self
            .info
            .as_ref()
            .map_or(AloStatus::Running, |current| current.status.advance(AloStatus::Running));
        info.status = info.status.advance(floor);
        if info.status.is_terminal() {
            // Only a work-unit completion may report COMPLETED.
            info.status = AloStatus::Running;
        }
        // The ALO id is the start request id for the operation's lifetime.
        info.id.clone_from(&self.id);
        self.phase = Phase::Running;
        self.info = Some(info.clone());
        vec![Effect::PublishInfo(info)]
    }

    fn start_timeout_fired(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Pending || self.timed_out {
            return Vec::new();
        }
        self.timed_out = true;
        let mut effects = Vec::with_capacity(2);
        if !self.cancel_propagated {
            self.cancel_propagated = true;
            effects.push(Effect::PropagateCancel);
        }
        effects.push(Effect::AbortWorkUnit);
        effects
    }

    fn cancel_requested(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Completed || self.cancel_propagated {
            return Vec::new();
        }
        self.cancel_propagated = true;
        vec![Effect::PropagateCancel]
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Latest published snapshot; `None` until the operation leaves `Pending`.
    #[must_use]
    pub fn info(&self) -> Option<&AloInfo> {
        self.info.as_ref()
    }

    /// Terminal result once `Completed`.
    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    #[must_use]
    pub fn cancel_propagated(&self) -> bool {
        self.cancel_propagated
    }

    #[must_use]
    pub fn callback_attempted(&self) -> bool {
        self.callback_attempted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
