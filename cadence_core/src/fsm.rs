//! Finite state machine executor.
//!
//! A [`StateMachine`] wraps a [`MachineLogic`] value and drives it through
//! declared [`State`]s, one handler call per tick. The machine only runs
//! while some caller re-asserts intent via [`StateMachine::engage`] each
//! tick; when intent lapses, execution stops, [`MachineLogic::on_done`]
//! fires and the machine resets to its first state. States marked
//! `must_finish` keep running without engagement until they complete.
//!
//! Timed transitions are drift-free: when a state expires, the successor's
//! start time is the expired state's deadline rather than the tick
//! timestamp, so a chain of timed states takes exactly the sum of its
//! durations regardless of tick alignment.
//!
//! Handler timestamps are machine-relative. `tm` counts from the moment
//! the machine engaged, `state_tm` from the active state's start time
//! (which, after an expiry transition, may already be in the past).

use thiserror::Error;
use tracing::{debug, warn};

use crate::component::{Component, Feedback, TickContext, TickFault, TickResult, Wired};
use crate::inject::{Bindings, FieldRequest, InjectionError};
use crate::reset::Resettable;
use crate::tunable::{Tunable, TunableCell};

/// Same-tick dispatch limit for `next_state_now` chains. A handler graph
/// that exceeds this is cycling without consuming time.
const MAX_CHAINED_DISPATCH: u32 = 64;

/// State names that collide with the machine's own control surface.
const RESERVED_NAMES: [&str; 4] = ["done", "engage", "execute", "next_state"];

// ─── State descriptors ──────────────────────────────────────────────

/// Handler invoked once per tick while its state is active.
pub type StateHandler<C> = fn(&mut C, &mut MachineCtl, &StateTiming) -> TickResult;

/// Machine-relative timestamps handed to a state handler.
#[derive(Debug, Clone, Copy)]
pub struct StateTiming {
    /// Seconds since the machine engaged.
    pub tm: f64,
    /// Seconds since the active state started.
    pub state_tm: f64,
    /// True on the first handler call after entering the state.
    pub initial_call: bool,
}

/// Declaration of one state, consumed by [`StateMachine::new`].
///
/// Declaration order in [`MachineLogic::states`] is the order published
/// to dashboards; it carries no execution meaning beyond that.
pub struct State<C> {
    name: &'static str,
    description: &'static str,
    handler: StateHandler<C>,
    first: bool,
    default: bool,
    must_finish: bool,
    duration: Option<f64>,
    next: Option<&'static str>,
}

impl<C> State<C> {
    /// Ordinary state: runs until the handler transitions away or the
    /// machine stops.
    pub fn new(name: &'static str, handler: StateHandler<C>) -> Self {
        Self {
            name,
            description: "",
            handler,
            first: false,
            default: false,
            must_finish: false,
            duration: None,
            next: None,
        }
    }

    /// Timed state: expires `duration` seconds after entry, then moves to
    /// its `next` state (or stops if none is declared). Guaranteed to run
    /// at least once even if it expires before its first tick.
    pub fn timed(name: &'static str, duration: f64, handler: StateHandler<C>) -> Self {
        Self {
            duration: Some(duration),
            ..Self::new(name, handler)
        }
    }

    /// Default state: runs whenever no other state is active. Implies
    /// `must_finish`, and never needs engagement.
    pub fn default_state(name: &'static str, handler: StateHandler<C>) -> Self {
        Self {
            default: true,
            must_finish: true,
            ..Self::new(name, handler)
        }
    }

    /// Mark this state as the one entered on engagement.
    pub fn first(mut self) -> Self {
        self.first = true;
        self
    }

    /// Keep executing this state even without engagement, until it
    /// completes or `done()` is called.
    pub fn must_finish(mut self) -> Self {
        self.must_finish = true;
        self
    }

    /// State to enter when this (timed) state expires.
    pub fn next(mut self, name: &'static str) -> Self {
        self.next = Some(name);
        self
    }

    /// Dashboard description.
    pub fn describe(mut self, text: &'static str) -> Self {
        self.description = text;
        self
    }
}

impl<C> std::fmt::Debug for State<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("first", &self.first)
            .field("default", &self.default)
            .field("must_finish", &self.must_finish)
            .field("duration", &self.duration)
            .field("next", &self.next)
            .finish()
    }
}

// ─── Machine logic ──────────────────────────────────────────────────

/// The user-written half of a state machine: the data the handlers
/// operate on plus the state declarations.
pub trait MachineLogic: Wired + Sized {
    /// Declare the machine's states.
    fn states() -> Vec<State<Self>>;

    /// Called every time execution ceases, whether by `done()`, loss of
    /// engagement or expiry of a terminal state.
    fn on_done(&mut self) {}
}

/// Control handle handed to state handlers.
///
/// Requests are queued and applied in call order after the handler
/// returns; if the handler fails, queued requests are discarded.
#[derive(Debug, Default)]
pub struct MachineCtl {
    ops: Vec<CtlOp>,
}

#[derive(Debug)]
enum CtlOp {
    Engage,
    Next(&'static str),
    NextNow(&'static str),
    Done,
}

impl MachineCtl {
    /// Transition to `name` on the next tick.
    pub fn next_state(&mut self, name: &'static str) {
        self.ops.push(CtlOp::Next(name));
    }

    /// Transition to `name` and run its handler within this same tick.
    pub fn next_state_now(&mut self, name: &'static str) {
        self.ops.push(CtlOp::NextNow(name));
    }

    /// Stop execution after this handler returns.
    pub fn done(&mut self) {
        self.ops.push(CtlOp::Done);
    }

    /// Re-assert engagement for this tick (used from default states that
    /// decide to start the sequence).
    pub fn engage(&mut self) {
        self.ops.push(CtlOp::Engage);
    }
}

// ─── Configuration errors ───────────────────────────────────────────

/// Fatal construction error: the state declarations are inconsistent.
#[derive(Debug, Error, PartialEq)]
pub enum MachineConfigError {
    #[error("no state is marked first")]
    NoFirstState,

    #[error("multiple states are marked first")]
    MultipleFirstStates,

    #[error("multiple default states declared")]
    MultipleDefaultStates,

    #[error("duplicate state name '{0}'")]
    DuplicateState(&'static str),

    #[error("'{0}' is a reserved state name")]
    ReservedStateName(&'static str),

    #[error("state '{state}' names unknown next state '{next}'")]
    UnknownNextState {
        state: &'static str,
        next: &'static str,
    },

    #[error("state '{state}' has invalid duration {duration}")]
    InvalidDuration {
        state: &'static str,
        duration: f64,
    },

    #[error("the default state cannot be marked first")]
    DefaultMarkedFirst,
}

// ─── Executor ───────────────────────────────────────────────────────

struct StateSlot<C> {
    def: State<C>,
    next_idx: Option<usize>,
    duration: Option<Tunable<f64>>,
    ran: bool,
    /// Machine-relative entry time [s]. Valid once `ran` is set.
    start_time: f64,
    /// Machine-relative deadline [s]. Infinite for untimed states.
    expires: f64,
}

/// Executor wrapping a [`MachineLogic`] value.
///
/// Implements [`Component`], so it slots into the cycle driver like any
/// other component; its `execute` runs the machine and its `on_disable`
/// stops it.
pub struct StateMachine<C: MachineLogic> {
    logic: C,
    slots: Vec<StateSlot<C>>,
    first_idx: usize,
    default_idx: Option<usize>,
    current: Option<usize>,
    should_engage: bool,
    engaged: bool,
    /// Absolute time the machine engaged [s].
    start: f64,
    current_cell: Tunable<String>,
    names_cell: Tunable<Vec<String>>,
    descriptions_cell: Tunable<Vec<String>>,
}

impl<C: MachineLogic> std::fmt::Debug for StateMachine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("states", &self.slots.len())
            .field("current", &self.current_state())
            .field("engaged", &self.engaged)
            .finish_non_exhaustive()
    }
}

impl<C: MachineLogic> StateMachine<C> {
    /// Validate `C`'s state declarations and build the executor.
    pub fn new(logic: C) -> Result<Self, MachineConfigError> {
        let defs = C::states();

        let mut first_idx = None;
        let mut default_idx = None;
        let mut names = Vec::with_capacity(defs.len());
        let mut descriptions = Vec::with_capacity(defs.len());

        for (idx, def) in defs.iter().enumerate() {
            if RESERVED_NAMES.contains(&def.name) {
                return Err(MachineConfigError::ReservedStateName(def.name));
            }
            if defs[..idx].iter().any(|d| d.name == def.name) {
                return Err(MachineConfigError::DuplicateState(def.name));
            }
            if def.first {
                if def.default {
                    return Err(MachineConfigError::DefaultMarkedFirst);
                }
                if first_idx.is_some() {
                    return Err(MachineConfigError::MultipleFirstStates);
                }
                first_idx = Some(idx);
            }
            if def.default {
                if default_idx.is_some() {
                    return Err(MachineConfigError::MultipleDefaultStates);
                }
                default_idx = Some(idx);
            }
            if let Some(duration) = def.duration {
                if !duration.is_finite() || duration <= 0.0 {
                    return Err(MachineConfigError::InvalidDuration {
                        state: def.name,
                        duration,
                    });
                }
            }
            names.push(def.name.to_string());
            descriptions.push(def.description.to_string());
        }

        let first_idx = first_idx.ok_or(MachineConfigError::NoFirstState)?;

        // Resolve declared successors up front so expiry transitions
        // never look names up at tick time.
        let slots = defs
            .into_iter()
            .map(|def| {
                let next_idx = match def.next {
                    Some(next) => Some(
                        names
                            .iter()
                            .position(|n| n.as_str() == next)
                            .ok_or(MachineConfigError::UnknownNextState {
                                state: def.name,
                                next,
                            })?,
                    ),
                    None => None,
                };
                let duration = def.duration.map(|d| {
                    Tunable::without_default_write(format!("state/{}_duration", def.name), d)
                });
                Ok(StateSlot {
                    def,
                    next_idx,
                    duration,
                    ran: false,
                    start_time: 0.0,
                    expires: f64::INFINITY,
                })
            })
            .collect::<Result<Vec<_>, MachineConfigError>>()?;

        Ok(Self {
            logic,
            slots,
            first_idx,
            default_idx,
            current: None,
            should_engage: false,
            engaged: false,
            start: 0.0,
            current_cell: Tunable::new("state/current", String::new()),
            names_cell: Tunable::new("state/names", names),
            descriptions_cell: Tunable::new("state/descriptions", descriptions),
        })
    }

    /// The wrapped logic.
    pub fn logic(&self) -> &C {
        &self.logic
    }

    /// Mutable access to the wrapped logic.
    pub fn logic_mut(&mut self) -> &mut C {
        &mut self.logic
    }

    /// True while the machine is executing states.
    pub fn is_executing(&self) -> bool {
        self.engaged
    }

    /// Name of the pending/active state, if any.
    pub fn current_state(&self) -> Option<&'static str> {
        self.current.map(|idx| self.slots[idx].def.name)
    }

    /// Signal that the machine should execute this tick. Must be called
    /// every tick the caller wants the machine to keep running.
    pub fn engage(&mut self) {
        self.engage_with(None, false);
    }

    /// Engage, optionally choosing the entry state and optionally forcing
    /// a transition even while another state is active.
    pub fn engage_with(&mut self, initial_state: Option<&str>, force: bool) {
        self.should_engage = true;

        let idle = match self.current {
            None => true,
            Some(idx) => Some(idx) == self.default_idx,
        };
        if force || idle {
            let target = match initial_state {
                Some(name) => match self.index_of(name) {
                    Some(idx) => idx,
                    None => {
                        warn!("engage requested unknown state '{name}', using first state");
                        self.first_idx
                    }
                },
                None => self.first_idx,
            };
            self.transition_to(target);
        }
    }

    /// Transition to `name` on the next tick. Unknown names are logged
    /// and ignored.
    pub fn next_state(&mut self, name: &str) {
        match self.index_of(name) {
            Some(idx) => self.transition_to(idx),
            None => warn!("next_state requested unknown state '{name}'"),
        }
    }

    /// Stop execution and reset to the first state. Safe to call at any
    /// time; fires [`MachineLogic::on_done`].
    pub fn done(&mut self) {
        if let Some(idx) = self.current {
            debug!("state machine stopped in '{}'", self.slots[idx].def.name);
        }
        self.current = None;
        self.engaged = false;
        self.current_cell.set(String::new());
        self.logic.on_done();
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.def.name == name)
    }

    fn transition_to(&mut self, idx: usize) {
        self.slots[idx].ran = false;
        self.current_cell.set(self.slots[idx].def.name.to_string());
        self.current = Some(idx);
    }

    /// Run one tick of the machine.
    pub fn run(&mut self, now: f64) -> TickResult {
        if !self.engaged {
            if self.should_engage {
                self.start = now;
                self.engaged = true;
            } else if self.default_idx.is_none() {
                return Ok(());
            }
        }

        let mut dispatches = 0u32;
        loop {
            if !self.run_once(now)? {
                break;
            }
            dispatches += 1;
            if dispatches > MAX_CHAINED_DISPATCH {
                self.done();
                return Err(TickFault::new(format!(
                    "state machine exceeded {MAX_CHAINED_DISPATCH} chained dispatches in one tick"
                )));
            }
        }

        // Engagement is consumed each tick; callers must re-assert it.
        self.should_engage = false;
        Ok(())
    }

    /// One dispatch. Returns true when a `next_state_now` request asks
    /// for another dispatch within this tick.
    fn run_once(&mut self, now: f64) -> Result<bool, TickFault> {
        let tm = now - self.start;
        let mut state = self.current;
        let mut done_called = false;

        // Successors of an expired state start at the expiry deadline,
        // not at this tick's timestamp, so chained durations add exactly.
        let mut new_state_start = tm;

        if let Some(idx) = state {
            let slot = &self.slots[idx];
            if slot.ran && slot.expires < tm {
                new_state_start = slot.expires;
                match slot.next_idx {
                    Some(next) => {
                        self.transition_to(next);
                        state = self.current;
                    }
                    None => {
                        // Terminal expiry: always stop, then restart from
                        // the first state if engagement persists.
                        done_called = true;
                        self.done();
                        if self.should_engage {
                            self.transition_to(self.first_idx);
                            state = self.current;
                        } else {
                            state = None;
                        }
                    }
                }
            }
        }

        // Without fresh engagement, only must_finish states keep running.
        if let Some(idx) = state {
            if !self.should_engage && !self.slots[idx].def.must_finish {
                state = None;
            }
        }

        // Idle machines fall back to the default state. Entering it is
        // not a telemetry-visible transition.
        if state.is_none() {
            if let Some(didx) = self.default_idx {
                if self.current != Some(didx) {
                    self.slots[didx].ran = false;
                    self.current = Some(didx);
                }
                state = Some(didx);
            }
        }

        let Some(idx) = state else {
            if !done_called {
                self.done();
            }
            return Ok(false);
        };

        let initial_call = !self.slots[idx].ran;
        if initial_call {
            let duration = self.slots[idx]
                .duration
                .as_ref()
                .map_or(f64::INFINITY, |d| *d.get());
            let slot = &mut self.slots[idx];
            slot.ran = true;
            slot.start_time = new_state_start;
            slot.expires = new_state_start + duration;
            debug!("{tm:.3}s: entering state '{}'", slot.def.name);
        }

        let timing = StateTiming {
            tm,
            state_tm: tm - self.slots[idx].start_time,
            initial_call,
        };
        let handler = self.slots[idx].def.handler;
        let mut ctl = MachineCtl::default();
        handler(&mut self.logic, &mut ctl, &timing)?;

        self.apply(ctl)
    }

    /// Apply queued control requests in call order.
    fn apply(&mut self, ctl: MachineCtl) -> Result<bool, TickFault> {
        let mut chained = false;
        for op in ctl.ops {
            match op {
                CtlOp::Engage => {
                    self.engage();
                }
                CtlOp::Next(name) => {
                    let idx = self.require(name)?;
                    self.transition_to(idx);
                    chained = false;
                }
                CtlOp::NextNow(name) => {
                    let idx = self.require(name)?;
                    self.transition_to(idx);
                    chained = true;
                }
                CtlOp::Done => {
                    self.done();
                    chained = false;
                }
            }
        }
        Ok(chained)
    }

    fn require(&self, name: &'static str) -> Result<usize, TickFault> {
        self.index_of(name).ok_or_else(|| {
            TickFault::new(format!("transition to unknown state '{name}'"))
        })
    }
}

impl<C: MachineLogic> Wired for StateMachine<C> {
    fn requests(&self) -> Vec<FieldRequest> {
        self.logic.requests()
    }

    fn wire(&mut self, bindings: &Bindings) -> Result<(), InjectionError> {
        self.logic.wire(bindings)
    }

    fn setup(&mut self) -> TickResult {
        self.logic.setup()
    }

    fn reset_fields(&mut self) -> Vec<&mut dyn Resettable> {
        self.logic.reset_fields()
    }

    fn tunables(&mut self) -> Vec<&mut dyn TunableCell> {
        let mut cells = self.logic.tunables();
        cells.push(&mut self.current_cell);
        cells.push(&mut self.names_cell);
        cells.push(&mut self.descriptions_cell);
        for slot in &mut self.slots {
            if let Some(duration) = &mut slot.duration {
                cells.push(duration);
            }
        }
        cells
    }

    fn feedback(&self, out: &mut Feedback) {
        self.logic.feedback(out);
    }
}

impl<C: MachineLogic> Component for StateMachine<C> {
    fn execute(&mut self, ctx: &TickContext) -> TickResult {
        self.run(ctx.now)
    }

    fn on_disable(&mut self) -> TickResult {
        self.done();
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
