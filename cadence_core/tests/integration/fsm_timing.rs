//! Integration test: state machine execution and timing.
//!
//! Drives state machines against a manually advanced clock and checks
//! the full execution traces: engagement semantics, must_finish states,
//! same-tick chained dispatch, default states, drift-free timed
//! transitions and restart of an engaged machine after terminal expiry.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::clock::{Clock, ManualClock};
use cadence_core::component::{Component, TickContext, TickResult, Wired};
use cadence_core::config::CoreConfig;
use cadence_core::cycle::CycleDriverBuilder;
use cadence_core::fsm::{MachineLogic, State, StateMachine};
use cadence_core::inject::{Bindings, FieldRequest, InjectionError};
use cadence_core::report::MemorySink;
use cadence_core::telemetry::{MemoryTelemetry, Telemetry};

// ── Three-state sequence ────────────────────────────────────────────

#[derive(Default)]
struct Sequence {
    executed: Vec<&'static str>,
}

impl Wired for Sequence {}

impl MachineLogic for Sequence {
    fn states() -> Vec<State<Self>> {
        vec![
            State::new("first_state", |logic: &mut Self, ctl, _t| {
                logic.executed.push("1");
                ctl.next_state("second_state");
                Ok(())
            })
            .first(),
            State::timed("second_state", 1.0, |logic: &mut Self, _ctl, _t| {
                logic.executed.push("2");
                Ok(())
            })
            .next("third_state"),
            State::new("third_state", |logic: &mut Self, _ctl, _t| {
                logic.executed.push("3");
                Ok(())
            }),
        ]
    }
}

#[test]
fn engagement_timed_expiry_and_force() {
    let clock = ManualClock::new();
    let mut sm = StateMachine::new(Sequence::default()).unwrap();

    assert_eq!(sm.current_state(), None);
    assert!(!sm.is_executing());

    // Engage retargets immediately; execution starts on the next run.
    sm.engage();
    assert_eq!(sm.current_state(), Some("first_state"));
    assert!(!sm.is_executing());

    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("second_state"));
    assert!(sm.is_executing());

    // Engaging while active does not restart.
    sm.engage();
    assert_eq!(sm.current_state(), Some("second_state"));

    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("second_state"));

    // Past the 1s duration: expiry moves to the declared successor.
    clock.advance(1.5);
    sm.engage();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("third_state"));

    sm.engage();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("third_state"));

    sm.done();
    assert_eq!(sm.current_state(), None);
    assert!(!sm.is_executing());

    // Start directly at a chosen state.
    sm.engage_with(Some("second_state"), false);
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("second_state"));

    clock.advance(1.5);
    sm.engage();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("third_state"));

    sm.engage();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("third_state"));

    // Forced engagement restarts mid-run.
    sm.engage_with(None, true);
    assert_eq!(sm.current_state(), Some("first_state"));
    assert!(sm.is_executing());

    sm.run(clock.now()).unwrap();
    // No engage before this run: execution ceases.
    sm.run(clock.now()).unwrap();
    assert!(!sm.is_executing());
    assert_eq!(sm.current_state(), None);

    assert_eq!(
        sm.logic().executed,
        ["1", "2", "3", "3", "2", "3", "3", "1"]
    );
}

// ── must_finish and chained dispatch ────────────────────────────────

#[derive(Default)]
struct Persistent {
    executed: Vec<&'static str>,
}

impl Wired for Persistent {}

impl MachineLogic for Persistent {
    fn states() -> Vec<State<Self>> {
        vec![
            State::new("ordinary1", |logic: &mut Self, ctl, _t| {
                ctl.next_state("ordinary2");
                logic.executed.push("1");
                Ok(())
            })
            .first(),
            State::new("ordinary2", |logic: &mut Self, ctl, _t| {
                ctl.next_state("keep_going");
                logic.executed.push("2");
                Ok(())
            }),
            State::new("keep_going", |logic: &mut Self, _ctl, _t| {
                logic.executed.push("kg");
                Ok(())
            })
            .must_finish(),
            State::new("ordinary3", |logic: &mut Self, ctl, _t| {
                logic.executed.push("3");
                ctl.next_state_now("timed_keep_going");
                Ok(())
            }),
            State::timed("timed_keep_going", 1.0, |logic: &mut Self, _ctl, _t| {
                logic.executed.push("tkg");
                Ok(())
            })
            .must_finish(),
        ]
    }
}

#[test]
fn must_finish_states_survive_missing_engagement() {
    let clock = ManualClock::new();
    let mut sm = StateMachine::new(Persistent::default()).unwrap();

    // Without re-engagement, an ordinary successor never runs.
    sm.engage();
    sm.run(clock.now()).unwrap();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), None);
    assert!(!sm.is_executing());

    // Re-engage through to the must_finish state, then stop engaging.
    sm.engage();
    sm.run(clock.now()).unwrap();
    sm.engage();
    sm.run(clock.now()).unwrap();
    sm.run(clock.now()).unwrap();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("keep_going"));
    assert!(sm.is_executing());

    // External transition, then a same-tick chain into the timed state.
    sm.next_state("ordinary3");
    sm.engage();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("timed_keep_going"));

    sm.run(clock.now()).unwrap();
    assert!(sm.is_executing());
    assert_eq!(sm.current_state(), Some("timed_keep_going"));

    for _ in 0..7 {
        clock.advance(0.1);
        sm.run(clock.now()).unwrap();
        assert!(sm.is_executing());
        assert_eq!(sm.current_state(), Some("timed_keep_going"));
    }

    // Terminal expiry without engagement: the machine stops.
    clock.advance(1.0);
    sm.run(clock.now()).unwrap();
    assert!(!sm.is_executing());

    let mut expected = vec!["1", "1", "2", "kg", "kg", "3"];
    expected.extend(["tkg"; 9]);
    assert_eq!(sm.logic().executed, expected);
}

// ── Timed chain with declared successor ─────────────────────────────

#[derive(Default)]
struct TimedPair {
    second_entry_tm: Option<f64>,
}

impl Wired for TimedPair {}

impl MachineLogic for TimedPair {
    fn states() -> Vec<State<Self>> {
        vec![
            State::timed("opening", 0.1, |_logic: &mut Self, _ctl, _t| Ok(()))
                .first()
                .next("holding"),
            State::new("holding", |logic: &mut Self, _ctl, timing| {
                if timing.initial_call {
                    logic.second_entry_tm = Some(timing.tm - timing.state_tm);
                }
                Ok(())
            }),
        ]
    }
}

#[test]
fn expired_state_hands_off_to_declared_successor() {
    let clock = ManualClock::new();
    let mut sm = StateMachine::new(TimedPair::default()).unwrap();

    sm.engage();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("opening"));
    assert!(sm.is_executing());

    clock.advance(0.5);
    sm.engage();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), Some("holding"));
    assert!(sm.is_executing());

    // An untimed state with no engagement ceases on the next run.
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.current_state(), None);
    assert!(!sm.is_executing());
}

#[test]
fn successor_start_time_is_the_expiry_deadline() {
    // Ticks land at 0.0 and 0.5; "opening" expires at 0.1, so "holding"
    // must start at exactly 0.1 in machine time, not at 0.5.
    let clock = ManualClock::new();
    let mut sm = StateMachine::new(TimedPair::default()).unwrap();

    sm.engage();
    sm.run(clock.now()).unwrap();

    clock.advance(0.5);
    sm.engage();
    sm.run(clock.now()).unwrap();

    let entry = sm.logic().second_entry_tm.unwrap();
    assert!((entry - 0.1).abs() < 1e-9, "entered at tm={entry}");
}

// ── Default state ───────────────────────────────────────────────────

#[derive(Default)]
struct WithDefault {
    ran: Option<&'static str>,
    default_initial: Option<bool>,
}

impl Wired for WithDefault {}

impl MachineLogic for WithDefault {
    fn states() -> Vec<State<Self>> {
        vec![
            State::new("active", |logic: &mut Self, _ctl, _t| {
                logic.ran = Some("active");
                Ok(())
            })
            .first(),
            State::new("finishing", |logic: &mut Self, ctl, _t| {
                logic.ran = Some("finishing");
                ctl.done();
                Ok(())
            }),
            State::default_state("idle", |logic: &mut Self, _ctl, timing| {
                logic.ran = Some("idle");
                logic.default_initial = Some(timing.initial_call);
                Ok(())
            }),
        ]
    }
}

#[test]
fn default_state_fills_every_idle_tick() {
    let clock = ManualClock::new();
    let mut sm = StateMachine::new(WithDefault::default()).unwrap();

    // Never engaged: the default state runs, fresh on the first tick.
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.logic().ran, Some("idle"));
    assert_eq!(sm.logic().default_initial, Some(true));

    sm.run(clock.now()).unwrap();
    assert_eq!(sm.logic().default_initial, Some(false));

    // Engage for one tick, then fall back with a fresh initial_call.
    sm.engage();
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.logic().ran, Some("active"));

    sm.run(clock.now()).unwrap();
    assert_eq!(sm.logic().ran, Some("idle"));
    assert_eq!(sm.logic().default_initial, Some(true));

    sm.run(clock.now()).unwrap();
    assert_eq!(sm.logic().default_initial, Some(false));

    // A state that calls done() also falls back to the default.
    sm.engage_with(Some("finishing"), false);
    sm.run(clock.now()).unwrap();
    assert_eq!(sm.logic().ran, Some("finishing"));

    sm.run(clock.now()).unwrap();
    assert_eq!(sm.logic().ran, Some("idle"));
    assert_eq!(sm.logic().default_initial, Some(true));
}

// ── Restart of an engaged machine + short timed states ──────────────

#[derive(Default)]
struct Looper {
    executed: Vec<&'static str>,
}

impl Wired for Looper {}

impl MachineLogic for Looper {
    fn states() -> Vec<State<Self>> {
        vec![
            State::default_state("waiting", |logic: &mut Self, _ctl, _t| {
                logic.executed.push("d");
                Ok(())
            }),
            State::new("a", |logic: &mut Self, ctl, _t| {
                logic.executed.push("a");
                ctl.next_state("b");
                Ok(())
            })
            .first(),
            State::timed("b", 0.01, |logic: &mut Self, _ctl, _t| {
                logic.executed.push("b");
                Ok(())
            }),
        ]
    }

    fn on_done(&mut self) {
        self.executed.push("done");
    }
}

#[test]
fn engaged_machine_restarts_after_terminal_expiry() {
    // A timed state that expires between ticks, in a machine that is
    // engaged every tick: each expiry stops the machine and immediately
    // restarts it from the first state. The default state never runs.
    let clock = ManualClock::new();
    let mut sm = StateMachine::new(Looper::default()).unwrap();

    for _ in 0..4 {
        sm.engage();
        sm.run(clock.now()).unwrap();
        assert_eq!(sm.current_state(), Some("b"));
        clock.advance(0.02);

        sm.engage();
        sm.run(clock.now()).unwrap();
        assert_eq!(sm.current_state(), Some("b"));
        clock.advance(0.02);
    }

    assert_eq!(
        sm.logic().executed,
        ["a", "b", "done", "a", "b", "done", "a", "b", "done", "a", "b"]
    );
}

// ── Machine inside the cycle driver ─────────────────────────────────

/// Flywheel logic: spin up for a fixed time, fire, stop.
#[derive(Default)]
struct Flywheel {
    spinning: bool,
    shots: u32,
}

impl Wired for Flywheel {}

impl MachineLogic for Flywheel {
    fn states() -> Vec<State<Self>> {
        vec![
            State::timed("spin_up", 1.0, |logic: &mut Self, _ctl, _t| {
                logic.spinning = true;
                Ok(())
            })
            .first()
            .next("fire"),
            State::timed("fire", 0.5, |logic: &mut Self, _ctl, timing| {
                if timing.initial_call {
                    logic.shots += 1;
                }
                Ok(())
            })
            .must_finish(),
        ]
    }

    fn on_done(&mut self) {
        self.spinning = false;
    }
}

/// Operator stand-in that engages the shooter while `firing` is set.
#[derive(Default)]
struct Trigger {
    firing: bool,
    shooter: Option<Rc<RefCell<StateMachine<Flywheel>>>>,
}

impl Wired for Trigger {
    fn requests(&self) -> Vec<FieldRequest> {
        vec![FieldRequest::component::<StateMachine<Flywheel>>("shooter")]
    }

    fn wire(&mut self, bindings: &Bindings) -> Result<(), InjectionError> {
        self.shooter = Some(bindings.component::<StateMachine<Flywheel>>("shooter")?);
        Ok(())
    }
}

impl Component for Trigger {
    fn execute(&mut self, _ctx: &TickContext) -> TickResult {
        if self.firing {
            if let Some(shooter) = &self.shooter {
                shooter.borrow_mut().engage();
            }
        }
        Ok(())
    }
}

#[test]
fn machine_runs_as_a_component_inside_the_driver() {
    let clock = ManualClock::new();

    let mut builder = CycleDriverBuilder::new();
    let trigger = builder.component("trigger", Trigger::default());
    let shooter = builder.component(
        "shooter",
        StateMachine::new(Flywheel::default()).unwrap(),
    );

    let telemetry = Rc::new(RefCell::new(MemoryTelemetry::new()));
    let mut driver = builder
        .build(
            Box::new(clock.clone()),
            Box::new(Rc::clone(&telemetry)),
            Box::new(MemorySink::new()),
            CoreConfig::default(),
        )
        .unwrap();
    driver.create_components().unwrap();

    // Hold the trigger through spin_up and into fire.
    trigger.borrow_mut().firing = true;
    let period = 0.02;
    for _ in 0..60 {
        driver.run_tick();
        clock.advance(period);
    }
    assert!(shooter.borrow().is_executing());
    assert_eq!(shooter.borrow().current_state(), Some("fire"));
    assert_eq!(shooter.borrow().logic().shots, 1);

    // Release the trigger: fire must finish, then the machine stops.
    trigger.borrow_mut().firing = false;
    for _ in 0..60 {
        driver.run_tick();
        clock.advance(period);
    }
    assert!(!shooter.borrow().is_executing());
    assert!(!shooter.borrow().logic().spinning);

    // The machine published its state telemetry under its prefix.
    assert!(
        telemetry
            .borrow()
            .get("components/shooter/state/names")
            .is_some()
    );

    // Disabling resets the machine even mid-sequence.
    trigger.borrow_mut().firing = true;
    driver.run_tick();
    assert!(shooter.borrow().is_executing());
    driver.run_mode_transition(false);
    assert!(!shooter.borrow().is_executing());
    assert_eq!(shooter.borrow().current_state(), None);
}
