//! Integration test: startup wiring.
//!
//! Builds a small component graph against the real builder/driver and
//! validates name resolution (exact and owner-mangled), sibling access
//! during setup, and all-or-nothing startup on wiring failures.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::clock::ManualClock;
use cadence_core::component::{Component, TickContext, TickResult, Wired};
use cadence_core::config::CoreConfig;
use cadence_core::cycle::{CycleDriver, CycleDriverBuilder, StartupError};
use cadence_core::inject::{Bindings, FieldRequest, InjectionError};
use cadence_core::report::MemorySink;
use cadence_core::reset::ResetCell;
use cadence_core::telemetry::MemoryTelemetry;

// ── Test graph ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Motor {
    output: f64,
}

#[derive(Default)]
struct Drive {
    left: Option<Rc<RefCell<Motor>>>,
    right: Option<Rc<RefCell<Motor>>>,
    throttle: ResetCell<f64>,
    wired: bool,
    setup_ran: bool,
}

impl Drive {
    fn go(&mut self, throttle: f64) {
        self.throttle.set(throttle);
    }
}

impl Wired for Drive {
    fn requests(&self) -> Vec<FieldRequest> {
        vec![
            FieldRequest::new::<RefCell<Motor>>("left_motor"),
            FieldRequest::new::<RefCell<Motor>>("right_motor"),
        ]
    }

    fn wire(&mut self, bindings: &Bindings) -> Result<(), InjectionError> {
        self.left = Some(bindings.get::<RefCell<Motor>>("left_motor")?);
        self.right = Some(bindings.get::<RefCell<Motor>>("right_motor")?);
        self.wired = true;
        Ok(())
    }

    fn setup(&mut self) -> TickResult {
        self.setup_ran = true;
        Ok(())
    }

    fn reset_fields(&mut self) -> Vec<&mut dyn cadence_core::reset::Resettable> {
        vec![&mut self.throttle]
    }
}

impl Component for Drive {
    fn execute(&mut self, _ctx: &TickContext) -> TickResult {
        let output = *self.throttle.get();
        if let (Some(left), Some(right)) = (&self.left, &self.right) {
            left.borrow_mut().output = output;
            right.borrow_mut().output = output;
        }
        Ok(())
    }
}

/// Declared before `Drive`, requests it as a sibling plus a mangled
/// scalar (`autopilot_gain` in the pool, requested as `gain`).
#[derive(Default)]
struct Autopilot {
    drive: Option<Rc<RefCell<Drive>>>,
    gain: f64,
    drive_was_wired_during_setup: bool,
}

impl Wired for Autopilot {
    fn requests(&self) -> Vec<FieldRequest> {
        vec![
            FieldRequest::component::<Drive>("drive"),
            FieldRequest::new::<f64>("gain"),
        ]
    }

    fn wire(&mut self, bindings: &Bindings) -> Result<(), InjectionError> {
        self.drive = Some(bindings.component::<Drive>("drive")?);
        self.gain = *bindings.get::<f64>("gain")?;
        Ok(())
    }

    fn setup(&mut self) -> TickResult {
        // The whole graph is wired before any setup runs, even though
        // drive is declared after this component.
        if let Some(drive) = &self.drive {
            self.drive_was_wired_during_setup = drive.borrow().wired;
        }
        Ok(())
    }
}

impl Component for Autopilot {
    fn execute(&mut self, _ctx: &TickContext) -> TickResult {
        if let Some(drive) = &self.drive {
            drive.borrow_mut().go(0.5 * self.gain);
        }
        Ok(())
    }
}

fn build(builder: CycleDriverBuilder) -> CycleDriver {
    builder
        .build(
            Box::new(ManualClock::new()),
            Box::new(MemoryTelemetry::new()),
            Box::new(MemorySink::new()),
            CoreConfig::default(),
        )
        .unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn full_graph_wires_and_runs() {
    let mut builder = CycleDriverBuilder::new();
    let left = Rc::new(RefCell::new(Motor::default()));
    let right = Rc::new(RefCell::new(Motor::default()));
    builder.provide_shared("left_motor", Rc::clone(&left));
    builder.provide_shared("right_motor", Rc::clone(&right));
    builder.provide("autopilot_gain", 2.0f64);

    let autopilot = builder.component("autopilot", Autopilot::default());
    let drive = builder.component("drive", Drive::default());

    let mut driver = build(builder);
    driver.create_components().unwrap();

    assert!(drive.borrow().wired);
    assert!(drive.borrow().setup_ran);
    assert_eq!(autopilot.borrow().gain, 2.0);
    assert!(autopilot.borrow().drive_was_wired_during_setup);

    // One tick: autopilot commands the drive, the drive moves the motors.
    driver.run_tick();
    assert_eq!(left.borrow().output, 1.0);
    assert_eq!(right.borrow().output, 1.0);
}

#[test]
fn missing_dependency_aborts_startup() {
    let mut builder = CycleDriverBuilder::new();
    builder.provide("left_motor", RefCell::new(Motor::default()));
    // right_motor deliberately absent.

    let drive = builder.component("drive", Drive::default());

    let mut driver = build(builder);
    let err = driver.create_components().unwrap_err();
    assert!(matches!(
        err,
        StartupError::Injection(InjectionError::Missing { .. })
    ));

    // Nothing ran: startup is all-or-nothing.
    assert!(!drive.borrow().setup_ran);
}

#[test]
fn type_mismatch_aborts_startup() {
    let mut builder = CycleDriverBuilder::new();
    builder.provide("left_motor", 1.0f64);
    builder.provide("right_motor", RefCell::new(Motor::default()));
    builder.component("drive", Drive::default());

    let mut driver = build(builder);
    let err = driver.create_components().unwrap_err();
    match err {
        StartupError::Injection(InjectionError::TypeMismatch { owner, field, .. }) => {
            assert_eq!(owner, "drive");
            assert_eq!(field, "left_motor");
        }
        other => panic!("expected TypeMismatch, got {other:?}"),
    }
}

#[test]
fn sibling_request_by_exact_name() {
    // Autopilot's "drive" request resolves to the component of that name
    // even though the pool also holds the mangled candidates.
    let mut builder = CycleDriverBuilder::new();
    builder.provide("left_motor", RefCell::new(Motor::default()));
    builder.provide("right_motor", RefCell::new(Motor::default()));
    builder.provide("autopilot_gain", 1.0f64);

    let autopilot = builder.component("autopilot", Autopilot::default());
    let drive = builder.component("drive", Drive::default());

    let mut driver = build(builder);
    driver.create_components().unwrap();

    let bound = autopilot.borrow().drive.as_ref().map(Rc::clone).unwrap();
    assert!(Rc::ptr_eq(&bound, &drive));
}

#[test]
fn wiring_is_independent_of_declaration_order() {
    // Drive first, autopilot second: the pool already holds every
    // component before resolution starts.
    let mut builder = CycleDriverBuilder::new();
    builder.provide("left_motor", RefCell::new(Motor::default()));
    builder.provide("right_motor", RefCell::new(Motor::default()));
    builder.provide("autopilot_gain", 1.0f64);

    let drive = builder.component("drive", Drive::default());
    let autopilot = builder.component("autopilot", Autopilot::default());

    let mut driver = build(builder);
    driver.create_components().unwrap();

    assert!(drive.borrow().wired);
    assert!(autopilot.borrow().drive.is_some());
}
