//! Demonstration components: simulated motors, a drive base, a shooter
//! state machine and a scripted operator.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::component::{Component, Feedback, TickContext, TickResult, Wired};
use cadence_core::fsm::{MachineLogic, State, StateMachine};
use cadence_core::inject::{Bindings, FieldRequest, InjectionError};
use cadence_core::reset::{ResetCell, Resettable};
use cadence_core::tunable::{Tunable, TunableCell};

// ─── Simulated hardware ─────────────────────────────────────────────

/// Stand-in for a speed controller: remembers the last commanded output.
#[derive(Debug, Default)]
pub struct SimMotor {
    output: f64,
}

impl SimMotor {
    pub fn set(&mut self, output: f64) {
        self.output = output.clamp(-1.0, 1.0);
    }

    pub fn get(&self) -> f64 {
        self.output
    }
}

// ─── Drive base ─────────────────────────────────────────────────────

/// Differential drive. Inputs are reset cells, so a tick without an
/// operator command coasts to zero instead of latching the last value.
pub struct Drive {
    left: Option<Rc<RefCell<SimMotor>>>,
    right: Option<Rc<RefCell<SimMotor>>>,
    forward: ResetCell<f64>,
    rotate: ResetCell<f64>,
    deadband: Tunable<f64>,
    left_out: f64,
    right_out: f64,
}

impl Default for Drive {
    fn default() -> Self {
        Self {
            left: None,
            right: None,
            forward: ResetCell::new(0.0),
            rotate: ResetCell::new(0.0),
            deadband: Tunable::new("deadband", 0.05),
            left_out: 0.0,
            right_out: 0.0,
        }
    }
}

impl Drive {
    /// Command arcade-style motion for this tick.
    pub fn go(&mut self, forward: f64, rotate: f64) {
        self.forward.set(forward);
        self.rotate.set(rotate);
    }

    fn shape(&self, value: f64) -> f64 {
        if value.abs() < *self.deadband.get() {
            0.0
        } else {
            value
        }
    }
}

impl Wired for Drive {
    fn requests(&self) -> Vec<FieldRequest> {
        vec![
            FieldRequest::new::<RefCell<SimMotor>>("left_motor"),
            FieldRequest::new::<RefCell<SimMotor>>("right_motor"),
        ]
    }

    fn wire(&mut self, bindings: &Bindings) -> Result<(), InjectionError> {
        self.left = Some(bindings.get::<RefCell<SimMotor>>("left_motor")?);
        self.right = Some(bindings.get::<RefCell<SimMotor>>("right_motor")?);
        Ok(())
    }

    fn reset_fields(&mut self) -> Vec<&mut dyn Resettable> {
        vec![&mut self.forward, &mut self.rotate]
    }

    fn tunables(&mut self) -> Vec<&mut dyn TunableCell> {
        vec![&mut self.deadband]
    }

    fn feedback(&self, out: &mut Feedback) {
        // Report what the motors actually received, not the mixed request.
        if let (Some(left), Some(right)) = (&self.left, &self.right) {
            out.push("left", left.borrow().get());
            out.push("right", right.borrow().get());
        }
    }
}

impl Component for Drive {
    fn execute(&mut self, _ctx: &TickContext) -> TickResult {
        let forward = self.shape(*self.forward.get());
        let rotate = self.shape(*self.rotate.get());

        self.left_out = (forward + rotate).clamp(-1.0, 1.0);
        self.right_out = (forward - rotate).clamp(-1.0, 1.0);

        if let (Some(left), Some(right)) = (&self.left, &self.right) {
            left.borrow_mut().set(self.left_out);
            right.borrow_mut().set(self.right_out);
        }
        Ok(())
    }

    fn on_disable(&mut self) -> TickResult {
        self.left_out = 0.0;
        self.right_out = 0.0;
        if let (Some(left), Some(right)) = (&self.left, &self.right) {
            left.borrow_mut().set(0.0);
            right.borrow_mut().set(0.0);
        }
        Ok(())
    }
}

// ─── Shooter ────────────────────────────────────────────────────────

/// Flywheel shooter sequence: deploy the hood, spin the wheel up for a
/// fixed time, then fire. Firing always completes once started.
pub struct ShooterLogic {
    flywheel: Option<Rc<RefCell<SimMotor>>>,
    spin_power: Tunable<f64>,
    deployed: bool,
    shots: u32,
}

impl Default for ShooterLogic {
    fn default() -> Self {
        Self {
            flywheel: None,
            spin_power: Tunable::new("spin_power", 0.85),
            deployed: false,
            shots: 0,
        }
    }
}

impl ShooterLogic {
    pub fn shots(&self) -> u32 {
        self.shots
    }

    fn set_flywheel(&mut self, output: f64) {
        if let Some(motor) = &self.flywheel {
            motor.borrow_mut().set(output);
        }
    }
}

impl Wired for ShooterLogic {
    fn requests(&self) -> Vec<FieldRequest> {
        // Resolves to "shooter_flywheel_motor" via the owner fallback.
        vec![FieldRequest::new::<RefCell<SimMotor>>("flywheel_motor")]
    }

    fn wire(&mut self, bindings: &Bindings) -> Result<(), InjectionError> {
        self.flywheel = Some(bindings.get::<RefCell<SimMotor>>("flywheel_motor")?);
        Ok(())
    }

    fn tunables(&mut self) -> Vec<&mut dyn TunableCell> {
        vec![&mut self.spin_power]
    }

    fn feedback(&self, out: &mut Feedback) {
        out.push("deployed", self.deployed);
        out.push("shots", self.shots());
    }
}

impl MachineLogic for ShooterLogic {
    fn states() -> Vec<State<Self>> {
        vec![
            State::new("deploy", |logic: &mut Self, ctl, timing| {
                if timing.initial_call {
                    logic.deployed = true;
                }
                ctl.next_state("spin_up");
                Ok(())
            })
            .first()
            .describe("Deploy the hood"),
            State::timed("spin_up", 1.0, |logic: &mut Self, _ctl, _timing| {
                let power = *logic.spin_power.get();
                logic.set_flywheel(power);
                Ok(())
            })
            .next("fire")
            .describe("Bring the flywheel to speed"),
            State::timed("fire", 0.5, |logic: &mut Self, _ctl, timing| {
                if timing.initial_call {
                    logic.shots += 1;
                }
                Ok(())
            })
            .must_finish()
            .describe("Feed and launch"),
        ]
    }

    fn on_done(&mut self) {
        self.deployed = false;
        self.set_flywheel(0.0);
    }
}

// ─── Scripted operator ──────────────────────────────────────────────

/// Joystick stand-in: drives a gentle weave and holds the shooter
/// trigger for a window of each cycle.
#[derive(Default)]
pub struct Operator {
    drive: Option<Rc<RefCell<Drive>>>,
    shooter: Option<Rc<RefCell<StateMachine<ShooterLogic>>>>,
}

impl Wired for Operator {
    fn requests(&self) -> Vec<FieldRequest> {
        vec![
            FieldRequest::component::<Drive>("drive"),
            FieldRequest::component::<StateMachine<ShooterLogic>>("shooter"),
        ]
    }

    fn wire(&mut self, bindings: &Bindings) -> Result<(), InjectionError> {
        self.drive = Some(bindings.component::<Drive>("drive")?);
        self.shooter = Some(bindings.component::<StateMachine<ShooterLogic>>("shooter")?);
        Ok(())
    }
}

impl Component for Operator {
    fn execute(&mut self, ctx: &TickContext) -> TickResult {
        if let Some(drive) = &self.drive {
            let forward = 0.4 * (0.5 * ctx.now).sin();
            let rotate = 0.2 * (0.25 * ctx.now).cos();
            drive.borrow_mut().go(forward, rotate);
        }

        // Hold the trigger for the first 2s of every 5s window.
        if let Some(shooter) = &self.shooter {
            if ctx.now % 5.0 < 2.0 {
                shooter.borrow_mut().engage();
            }
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
