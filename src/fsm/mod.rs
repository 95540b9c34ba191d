//! Hierarchical state machine for the disinfection sequence.
//!
//! ```text
//!            run (unless disabled)        run
//!   ┌──────┐ ─────────────────▶ ┌─────────┐ ─────▶ ┌──────────────────────────┐
//!   │ HALT │                    │ WAITING │        │ RUNNING                  │
//!   └──────┘ ◀──── halt ─────── └─────────┘        │  ┌───────────┐  treat    │
//!      ▲  ▲                                        │  │ ADJUSTING │ ───────▶  │
//!      │  └─────────────── halt ────────────────── │  └───────────┘ ┌──────┐ │
//!      │                                           │     ▲ adjust   │TREAT-│ │
//!      │          ┌──────────┐ ◀──── constant ──── │     └───────── │ ING  │ │
//!      └─ halt ── │ CONSTANT │                     │                └──────┘ │
//!                 └──────────┘                     └──────────────────────────┘
//! ```
//!
//! `constant` is reachable from `halt`, `waiting` and `running`.  Routes
//! are a static table ([`TRANSITIONS`]) checked once by
//! [`validate_table`]: every (trigger, state) pair has at most one row.
//! Triggers without a row are ignored.
//!
//! The machine itself only computes and commits transitions.  Entry hooks
//! live in [`states`] and are run by the orchestrator, which also performs
//! the cancel-before-transition interlock.

pub mod states;

use core::fmt;
use std::time::{Duration, Instant};

use heapless::Vec;
use log::debug;

use crate::error::TableError;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Substates of the composite `running` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Running {
    Adjusting,
    Treating,
}

/// Active state, down to the innermost substate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Halt,
    Waiting,
    Constant,
    Running(Running),
}

/// Names every node of the state tree, composite ones included.  Used by
/// the transition table and to index the descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Halt = 0,
    Waiting = 1,
    Constant = 2,
    Running = 3,
    Adjusting = 4,
    Treating = 5,
}

impl StateId {
    /// Number of state nodes; sizes the descriptor table.
    pub const COUNT: usize = 6;

    pub fn name(self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Waiting => "waiting",
            Self::Constant => "constant",
            Self::Running => "running",
            Self::Adjusting => "adjusting",
            Self::Treating => "treating",
        }
    }

    /// Leaf state entered when this node is the destination.
    pub fn resolve(self) -> State {
        match self {
            Self::Halt => State::Halt,
            Self::Waiting => State::Waiting,
            Self::Constant => State::Constant,
            // Initial substate of `running`.
            Self::Running | Self::Adjusting => State::Running(Running::Adjusting),
            Self::Treating => State::Running(Running::Treating),
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl State {
    pub const INITIAL: Self = Self::Halt;

    /// Every leaf state.
    pub const LEAVES: [Self; 5] = [
        Self::Halt,
        Self::Waiting,
        Self::Constant,
        Self::Running(Running::Adjusting),
        Self::Running(Running::Treating),
    ];

    /// Id of the innermost state.
    pub fn id(self) -> StateId {
        match self {
            Self::Halt => StateId::Halt,
            Self::Waiting => StateId::Waiting,
            Self::Constant => StateId::Constant,
            Self::Running(Running::Adjusting) => StateId::Adjusting,
            Self::Running(Running::Treating) => StateId::Treating,
        }
    }

    /// Id of the top-level state.
    pub fn top(self) -> StateId {
        match self {
            Self::Running(_) => StateId::Running,
            other => other.id(),
        }
    }

    /// True if this state is `id` or nested inside it.
    pub fn is_within(self, id: StateId) -> bool {
        self.id() == id || self.top() == id
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running(sub) => write!(f, "running.{}", State::Running(*sub).id()),
            other => f.write_str(other.id().name()),
        }
    }
}

// ---------------------------------------------------------------------------
// Triggers and routes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Run,
    Halt,
    Constant,
    Adjust,
    Treat,
}

impl Trigger {
    pub const ALL: [Self; 5] = [Self::Run, Self::Halt, Self::Constant, Self::Adjust, Self::Treat];
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Run => "run",
            Self::Halt => "halt",
            Self::Constant => "constant",
            Self::Adjust => "adjust",
            Self::Treat => "treat",
        };
        f.write_str(name)
    }
}

/// Condition a route needs to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Blocked while the controller is administratively disabled.
    UnlessDisabled,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub trigger: Trigger,
    pub source: StateId,
    pub dest: StateId,
    pub guard: Option<Guard>,
}

impl Route {
    const fn new(trigger: Trigger, source: StateId, dest: StateId) -> Self {
        Self {
            trigger,
            source,
            dest,
            guard: None,
        }
    }

    const fn unless_disabled(mut self) -> Self {
        self.guard = Some(Guard::UnlessDisabled);
        self
    }
}

/// The disinfection transition table.
pub const TRANSITIONS: &[Route] = &[
    Route::new(Trigger::Run, StateId::Halt, StateId::Waiting).unless_disabled(),
    Route::new(Trigger::Run, StateId::Waiting, StateId::Running),
    // Re-entering halt from halt re-runs its entry (actuators off).
    Route::new(Trigger::Halt, StateId::Halt, StateId::Halt),
    Route::new(Trigger::Halt, StateId::Constant, StateId::Halt),
    Route::new(Trigger::Halt, StateId::Waiting, StateId::Halt),
    Route::new(Trigger::Halt, StateId::Running, StateId::Halt),
    Route::new(Trigger::Constant, StateId::Halt, StateId::Constant),
    Route::new(Trigger::Constant, StateId::Waiting, StateId::Constant),
    Route::new(Trigger::Constant, StateId::Running, StateId::Constant),
    Route::new(Trigger::Adjust, StateId::Treating, StateId::Adjusting),
    Route::new(Trigger::Treat, StateId::Adjusting, StateId::Treating),
];

/// Check that no (trigger, leaf state) pair is routed twice.
pub fn validate_table(table: &[Route]) -> Result<(), TableError> {
    for state in State::LEAVES {
        for trigger in Trigger::ALL {
            let matches = table
                .iter()
                .filter(|r| r.trigger == trigger && state.is_within(r.source))
                .count();
            if matches > 1 {
                return Err(TableError::Ambiguous {
                    trigger,
                    source: state.id(),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transition plan
// ---------------------------------------------------------------------------

/// A resolved transition: where it goes and which entry hooks to run,
/// outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: State,
    pub to: State,
    pub enter: Vec<StateId, 2>,
}

impl Transition {
    fn plan(from: State, to: State) -> Self {
        let mut enter = Vec::new();
        // Entering `running` from outside runs the composite entry first.
        if to.top() == StateId::Running && from.top() != StateId::Running {
            let _ = enter.push(StateId::Running);
        }
        let _ = enter.push(to.id());
        Self { from, to, enter }
    }

    /// True when the transition leaves the top-level state it started in
    /// (or re-enters it).  Work started by that state must stop.
    pub fn leaves_top_level(&self) -> bool {
        self.from.top() != self.to.top() || self.from == self.to
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// Current state plus the time it was entered.
pub struct Machine {
    table: &'static [Route],
    state: State,
    entered_at: Instant,
}

impl Machine {
    /// Validate `table` and start in the initial state (`halt`).
    pub fn new(table: &'static [Route]) -> Result<Self, TableError> {
        validate_table(table)?;
        Ok(Self {
            table,
            state: State::INITIAL,
            entered_at: Instant::now(),
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn time_in_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Resolve `trigger` from the current state.  `None` if no row
    /// matches or its guard blocks.
    pub fn plan(&self, trigger: Trigger, disabled: bool) -> Option<Transition> {
        let route = self
            .table
            .iter()
            .find(|r| r.trigger == trigger && self.state.is_within(r.source))?;

        if route.guard == Some(Guard::UnlessDisabled) && disabled {
            debug!("FSM: {} blocked, controller disabled", trigger);
            return None;
        }

        Some(Transition::plan(self.state, route.dest.resolve()))
    }

    /// Make `transition` current and restart the time-in-state clock.
    pub fn commit(&mut self, transition: &Transition) {
        debug_assert_eq!(transition.from, self.state);
        self.state = transition.to;
        self.entered_at = Instant::now();
    }
}
