//! Component lifecycle driver.
//!
//! The [`CycleDriver`] owns the declared component graph and runs the two
//! phases of its life: a one-shot startup (wire every component against
//! the injectable pool, initialise tunables, run `setup()`) and the
//! steady-state tick (`run_tick`), which executes every component in
//! declaration order and then performs the bookkeeping passes.
//!
//! Startup failures are fatal and typed; per-tick failures are isolated
//! to the raising component, reported through the [`ErrorSink`] with rate
//! limiting, and never stop the loop.
//!
//! The driver does not sleep or own a thread. The outer program paces
//! calls to `run_tick` at `control_loop_period` and tells the driver
//! about mode changes via [`CycleDriver::run_mode_transition`].

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug_span, info};

use crate::clock::Clock;
use crate::component::{Component, Feedback, TickContext, TickFault};
use crate::config::CoreConfig;
use crate::fsm::MachineConfigError;
use crate::inject::{InjectablePool, InjectionError, resolve};
use crate::report::ErrorSink;
use crate::telemetry::{Telemetry, Value};

// ─── Modes ──────────────────────────────────────────────────────────

/// Operating mode of the outer program, used for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Disabled,
    Autonomous,
    Teleop,
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Disabled => "disabled",
            Mode::Autonomous => "auto",
            Mode::Teleop => "teleop",
            Mode::Test => "test",
        }
    }

    /// True for every mode in which components execute.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Mode::Disabled)
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Declaration-time contract violation, detected by the builder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("component name must not be empty")]
    EmptyName,

    #[error("component '{0}' declared twice")]
    DuplicateComponent(String),

    #[error("injectable '{0}' declared twice")]
    DuplicateInjectable(String),

    #[error("component '{0}' collides with an injectable of the same name")]
    NameCollision(String),

    #[error("create_components was already called")]
    AlreadyCreated,
}

/// Fatal startup error. Nothing executes after one of these.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Injection(#[from] InjectionError),

    #[error(transparent)]
    Machine(#[from] MachineConfigError),

    #[error("component '{name}' setup failed: {fault}")]
    Setup { name: String, fault: TickFault },
}

// ─── Tick Statistics ────────────────────────────────────────────────

/// O(1) per-tick timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total ticks executed.
    pub tick_count: u64,
    /// Last tick duration [s].
    pub last_tick_s: f64,
    /// Minimum tick duration [s].
    pub min_tick_s: f64,
    /// Maximum tick duration [s].
    pub max_tick_s: f64,
    /// Running sum for average computation.
    pub sum_tick_s: f64,
    /// Ticks whose body exceeded the loop period.
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_tick_s: 0.0,
            min_tick_s: f64::INFINITY,
            max_tick_s: 0.0,
            sum_tick_s: 0.0,
            overruns: 0,
        }
    }

    /// Record one tick duration against the loop period budget.
    #[inline]
    pub fn record(&mut self, duration_s: f64, budget_s: f64) {
        self.tick_count += 1;
        self.last_tick_s = duration_s;
        if duration_s < self.min_tick_s {
            self.min_tick_s = duration_s;
        }
        if duration_s > self.max_tick_s {
            self.max_tick_s = duration_s;
        }
        self.sum_tick_s += duration_s;
        if duration_s > budget_s {
            self.overruns += 1;
        }
    }

    /// Average tick duration [s] (0 before the first tick).
    #[inline]
    pub fn avg_tick_s(&self) -> f64 {
        if self.tick_count == 0 {
            0.0
        } else {
            self.sum_tick_s / self.tick_count as f64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Rate-limited fault reporting ───────────────────────────────────

struct FaultReporter {
    sink: Box<dyn ErrorSink>,
    interval: f64,
    last_report: f64,
}

impl FaultReporter {
    fn report(&mut self, now: f64, message: &str, fault: &TickFault, force: bool) {
        if force || now - self.last_report > self.interval {
            self.sink.report(message, Some(fault), force);
        }
        self.last_report = now;
    }
}

// ─── Builder ────────────────────────────────────────────────────────

struct ComponentEntry {
    name: String,
    /// Telemetry prefix, `<telemetry_prefix>/<name>`. Filled in `build`.
    prefix: String,
    handle: Rc<RefCell<dyn Component>>,
}

/// Declares the injectable pool and the component graph.
///
/// Declaration errors are collected rather than returned call-by-call,
/// so a robot program can chain declarations and hear about every
/// mistake from `build()`.
#[derive(Default)]
pub struct CycleDriverBuilder {
    pool: InjectablePool,
    components: Vec<ComponentEntry>,
    errors: Vec<ContractError>,
}

impl CycleDriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose an owned value to component wiring under `name`.
    pub fn provide<T: Any>(&mut self, name: &str, value: T) -> &mut Self {
        self.provide_shared(name, Rc::new(value))
    }

    /// Expose a shared handle to component wiring under `name`.
    pub fn provide_shared<T: Any>(&mut self, name: &str, value: Rc<T>) -> &mut Self {
        if name.is_empty() {
            self.errors.push(ContractError::EmptyName);
        } else if self.pool.contains(name) {
            self.errors
                .push(ContractError::DuplicateInjectable(name.to_string()));
        } else {
            self.pool.insert_shared(name, value);
        }
        self
    }

    /// Declare a component. The returned handle stays valid for the
    /// program's lifetime; the component is also inserted into the pool
    /// so siblings may request it by name.
    pub fn component<C: Component>(&mut self, name: &str, component: C) -> Rc<RefCell<C>> {
        let handle = Rc::new(RefCell::new(component));

        if name.is_empty() {
            self.errors.push(ContractError::EmptyName);
        } else if self.components.iter().any(|e| e.name == name) {
            self.errors
                .push(ContractError::DuplicateComponent(name.to_string()));
        } else if self.pool.contains(name) {
            self.errors
                .push(ContractError::NameCollision(name.to_string()));
        } else {
            self.pool.insert_shared(name, Rc::clone(&handle));
            self.components.push(ComponentEntry {
                name: name.to_string(),
                prefix: String::new(),
                handle: Rc::clone(&handle) as Rc<RefCell<dyn Component>>,
            });
        }

        handle
    }

    /// Validate the declarations and assemble the driver.
    pub fn build(
        mut self,
        clock: Box<dyn Clock>,
        telemetry: Box<dyn Telemetry>,
        sink: Box<dyn ErrorSink>,
        config: CoreConfig,
    ) -> Result<CycleDriver, StartupError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err.into());
        }

        for entry in &mut self.components {
            entry.prefix = format!("{}/{}", config.telemetry_prefix, entry.name);
        }

        let reporter = FaultReporter {
            sink,
            interval: config.error_report_interval,
            last_report: -10.0,
        };

        Ok(CycleDriver {
            config,
            clock,
            telemetry,
            reporter,
            pool: self.pool,
            components: self.components,
            created: false,
            tick: 0,
            stats: CycleStats::new(),
        })
    }
}

// ─── Driver ─────────────────────────────────────────────────────────

/// Owns the component graph and runs startup and the per-tick passes.
pub struct CycleDriver {
    config: CoreConfig,
    clock: Box<dyn Clock>,
    telemetry: Box<dyn Telemetry>,
    reporter: FaultReporter,
    pool: InjectablePool,
    components: Vec<ComponentEntry>,
    created: bool,
    tick: u64,
    stats: CycleStats,
}

impl std::fmt::Debug for CycleDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleDriver")
            .field("components", &self.components.len())
            .field("created", &self.created)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

impl CycleDriver {
    /// One-shot startup: wire, initialise tunables, then `setup()` every
    /// component, all in declaration order.
    ///
    /// Wiring resolves each component's full request set before applying
    /// a single binding, and `setup()` only runs once the whole graph is
    /// wired, so sibling handles are live inside `setup()`.
    pub fn create_components(&mut self) -> Result<(), StartupError> {
        if self.created {
            return Err(ContractError::AlreadyCreated.into());
        }
        self.created = true;

        for entry in &self.components {
            let requests = entry.handle.borrow().requests();
            let bindings = resolve(&requests, &self.pool, &entry.name)?;
            entry.handle.borrow_mut().wire(&bindings)?;
        }

        for entry in &self.components {
            let mut component = entry.handle.borrow_mut();
            for cell in component.tunables() {
                cell.init(&entry.prefix, self.telemetry.as_mut());
            }
        }

        for entry in &self.components {
            entry
                .handle
                .borrow_mut()
                .setup()
                .map_err(|fault| StartupError::Setup {
                    name: entry.name.clone(),
                    fault,
                })?;
        }

        info!("created {} components", self.components.len());
        Ok(())
    }

    /// One control tick: refresh tunables, execute every component,
    /// restore reset cells, flush tunables and feedback, record stats.
    ///
    /// A component fault skips only that component's remaining work for
    /// this tick; everything else still runs.
    pub fn run_tick(&mut self) {
        let now = self.clock.now();

        if !self.created {
            self.reporter.report(
                now,
                "run_tick called before create_components",
                &TickFault::new("component graph is not wired"),
                true,
            );
            return;
        }

        let ctx = TickContext {
            now,
            tick: self.tick,
        };

        for entry in &self.components {
            let mut component = entry.handle.borrow_mut();
            for cell in component.tunables() {
                cell.pull(self.telemetry.as_ref());
            }
        }

        for entry in &self.components {
            let span = debug_span!("execute", component = %entry.name);
            let _guard = span.enter();
            let result = entry.handle.borrow_mut().execute(&ctx);
            if let Err(fault) = result {
                self.reporter.report(
                    now,
                    &format!("component '{}' execute failed", entry.name),
                    &fault,
                    false,
                );
            }
        }

        for entry in &self.components {
            let mut component = entry.handle.borrow_mut();
            for cell in component.reset_fields() {
                cell.reset();
            }
        }

        let mut feedback = Feedback::new();
        for entry in &self.components {
            {
                let mut component = entry.handle.borrow_mut();
                for cell in component.tunables() {
                    cell.flush(self.telemetry.as_mut());
                }
                component.feedback(&mut feedback);
            }
            for (key, value) in feedback.drain() {
                self.telemetry
                    .publish(&format!("{}/{}", entry.prefix, key), value);
            }
        }

        self.stats
            .record(self.clock.now() - now, self.config.control_loop_period);
        self.tick += 1;

        if self.tick % self.config.stats_interval == 0 {
            self.publish_stats();
        }
    }

    /// Run the mode-change hooks: `on_enable` when leaving disabled,
    /// `on_disable` when entering it. Faults are isolated per component
    /// but always reported, bypassing rate limiting.
    pub fn run_mode_transition(&mut self, entering: bool) {
        let now = self.clock.now();
        let hook = if entering { "on_enable" } else { "on_disable" };

        for entry in &self.components {
            let result = if entering {
                entry.handle.borrow_mut().on_enable()
            } else {
                entry.handle.borrow_mut().on_disable()
            };
            if let Err(fault) = result {
                self.reporter.report(
                    now,
                    &format!("component '{}' {hook} failed", entry.name),
                    &fault,
                    true,
                );
            }
        }
    }

    /// Publish the active mode under `robot/mode`.
    pub fn publish_mode(&mut self, mode: Mode) {
        self.telemetry.publish("robot/mode", Value::from(mode.as_str()));
    }

    fn publish_stats(&mut self) {
        self.telemetry
            .publish("robot/stats/ticks", Value::from(self.stats.tick_count));
        self.telemetry
            .publish("robot/stats/last_s", Value::from(self.stats.last_tick_s));
        self.telemetry
            .publish("robot/stats/avg_s", Value::from(self.stats.avg_tick_s()));
        self.telemetry
            .publish("robot/stats/max_s", Value::from(self.stats.max_tick_s));
        self.telemetry
            .publish("robot/stats/overruns", Value::from(self.stats.overruns));
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Ticks executed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn telemetry(&self) -> &dyn Telemetry {
        self.telemetry.as_ref()
    }

    pub fn telemetry_mut(&mut self) -> &mut dyn Telemetry {
        self.telemetry.as_mut()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
