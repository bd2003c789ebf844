//! The coupling state machine.
//!
//! [`SchemeCore`] owns every piece of per-participant coupling state: the
//! compensated clocks, window and iteration counters, the registered data,
//! the required-action ledger, convergence measures, the optional
//! acceleration module, and the iteration/convergence tables. Exchange
//! schedules call back into it for all channel I/O and bookkeeping, so the
//! invariants live in exactly one place.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use tandem_transport::{Channel, SerializedStamples};
use tandem_types::{
    math, Action, CouplingMode, DataId, Direction, Rank, TimesteppingMethod,
    INFINITE_MAX_ITERATIONS, UNDEFINED_MAX_ITERATIONS, UNDEFINED_MIN_ITERATIONS, UNDEFINED_TIME,
    UNDEFINED_TIME_WINDOWS, UNDEFINED_TIME_WINDOW_SIZE,
};

use crate::acceleration::Acceleration;
use crate::actions::ActionLedger;
use crate::clock::CompensatedClock;
use crate::convergence::{ConvergenceMeasure, ConvergenceSet, MeasureContext};
use crate::data::{CouplingDatum, DataSpec, SharedDatum};
use crate::error::{SchemeError, SchemeResult};
use crate::table::{ColumnKind, TableWriter};

/// Construction parameters of a coupling scheme.
///
/// Limits use the sentinel constants of `tandem_types` to mean "not
/// configured". The construction contract is checked by
/// [`SchemeCore::new`]; every violation is a fatal configuration error.
#[derive(Clone, Debug)]
pub struct SchemeConfig {
    pub max_time: f64,
    pub max_time_windows: i32,
    pub time_window_size: f64,
    pub local_participant: String,
    pub min_iterations: i32,
    pub max_iterations: i32,
    pub coupling_mode: CouplingMode,
    pub timestepping: TimesteppingMethod,
    /// This participant exchanges first in a serial schedule.
    pub does_first_step: bool,
    pub rank: Rank,
    /// Directory the iteration and convergence tables are written to.
    pub log_directory: PathBuf,
}

impl SchemeConfig {
    /// Explicit coupling without iteration limits.
    pub fn explicit(local_participant: impl Into<String>) -> Self {
        Self {
            max_time: UNDEFINED_TIME,
            max_time_windows: UNDEFINED_TIME_WINDOWS,
            time_window_size: UNDEFINED_TIME_WINDOW_SIZE,
            local_participant: local_participant.into(),
            min_iterations: UNDEFINED_MIN_ITERATIONS,
            max_iterations: UNDEFINED_MAX_ITERATIONS,
            coupling_mode: CouplingMode::Explicit,
            timestepping: TimesteppingMethod::FixedWindowSize,
            does_first_step: false,
            rank: Rank::Primary,
            log_directory: PathBuf::from("."),
        }
    }

    /// Implicit coupling iterating between `min_iterations` and
    /// `max_iterations` (or [`INFINITE_MAX_ITERATIONS`]).
    pub fn implicit(
        local_participant: impl Into<String>,
        min_iterations: i32,
        max_iterations: i32,
    ) -> Self {
        Self {
            min_iterations,
            max_iterations,
            coupling_mode: CouplingMode::Implicit,
            ..Self::explicit(local_participant)
        }
    }

    pub fn with_max_time(mut self, max_time: f64) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn with_max_time_windows(mut self, max_time_windows: i32) -> Self {
        self.max_time_windows = max_time_windows;
        self
    }

    pub fn with_time_window_size(mut self, time_window_size: f64) -> Self {
        self.time_window_size = time_window_size;
        self
    }

    /// The first participant dictates the window size dynamically.
    pub fn with_first_participant_sizing(mut self) -> Self {
        self.timestepping = TimesteppingMethod::FirstParticipant;
        self
    }

    pub fn as_first_participant(mut self) -> Self {
        self.does_first_step = true;
        self
    }

    pub fn on_secondary_rank(mut self) -> Self {
        self.rank = Rank::Secondary;
        self
    }

    pub fn with_log_directory(mut self, log_directory: impl Into<PathBuf>) -> Self {
        self.log_directory = log_directory.into();
        self
    }

    fn validate(&self) -> SchemeResult<()> {
        let fail = |message: String| Err(SchemeError::InvalidConfiguration(message));

        if !math::equals(self.max_time, UNDEFINED_TIME) && !math::greater(self.max_time, 0.0) {
            return fail(format!("max-time must be positive, got {}", self.max_time));
        }
        if self.max_time_windows != UNDEFINED_TIME_WINDOWS && self.max_time_windows <= 0 {
            return fail(format!(
                "max-time-windows must be positive, got {}",
                self.max_time_windows
            ));
        }
        let has_window_size = !math::equals(self.time_window_size, UNDEFINED_TIME_WINDOW_SIZE);
        if has_window_size && !math::greater(self.time_window_size, 0.0) {
            return fail(format!(
                "time-window-size must be positive, got {}",
                self.time_window_size
            ));
        }
        if self.timestepping == TimesteppingMethod::FixedWindowSize && !has_window_size {
            return fail(
                "a time-window-size is required when it is not dictated by the first participant"
                    .into(),
            );
        }

        match self.coupling_mode {
            CouplingMode::Explicit => {
                if self.min_iterations != UNDEFINED_MIN_ITERATIONS
                    || self.max_iterations != UNDEFINED_MAX_ITERATIONS
                {
                    return fail("iteration limits are not allowed for explicit coupling".into());
                }
            }
            CouplingMode::Implicit => {
                if self.min_iterations == UNDEFINED_MIN_ITERATIONS
                    || self.max_iterations == UNDEFINED_MAX_ITERATIONS
                {
                    return fail("implicit coupling requires iteration limits".into());
                }
                if self.min_iterations < 1 {
                    return fail(format!(
                        "min-iterations must be at least 1, got {}",
                        self.min_iterations
                    ));
                }
                if self.max_iterations != INFINITE_MAX_ITERATIONS && self.max_iterations < 1 {
                    return fail(format!(
                        "max-iterations must be at least 1 or -1 (unbounded), got {}",
                        self.max_iterations
                    ));
                }
                if self.max_iterations != INFINITE_MAX_ITERATIONS
                    && self.min_iterations > self.max_iterations
                {
                    return fail(format!(
                        "min-iterations {} exceeds max-iterations {}",
                        self.min_iterations, self.max_iterations
                    ));
                }
            }
        }
        Ok(())
    }
}

/// The concrete coupling state machine shared by all exchange schedules.
pub struct SchemeCore {
    mode: CouplingMode,
    timestepping: TimesteppingMethod,
    local_participant: String,
    rank: Rank,
    does_first_step: bool,
    log_directory: PathBuf,

    max_time: f64,
    max_time_windows: i32,
    time_window_size: f64,
    next_time_window_size: f64,
    time: CompensatedClock,
    window_start: CompensatedClock,
    time_windows: i32,

    min_iterations: i32,
    max_iterations: i32,
    iterations: i32,
    total_iterations: i32,
    has_converged: bool,

    is_initialized: bool,
    is_time_window_complete: bool,
    has_data_been_received: bool,
    sends_initialized_data: bool,
    receives_initialized_data: bool,

    all_data: BTreeMap<DataId, SharedDatum>,
    convergence: ConvergenceSet,
    acceleration: Option<Box<dyn Acceleration>>,
    ledger: ActionLedger,
    iterations_writer: Option<TableWriter>,
    convergence_writer: Option<TableWriter>,
}

impl SchemeCore {
    pub fn new(config: SchemeConfig) -> SchemeResult<Self> {
        config.validate()?;
        Ok(Self {
            mode: config.coupling_mode,
            timestepping: config.timestepping,
            local_participant: config.local_participant,
            rank: config.rank,
            does_first_step: config.does_first_step,
            log_directory: config.log_directory,
            max_time: config.max_time,
            max_time_windows: config.max_time_windows,
            time_window_size: config.time_window_size,
            next_time_window_size: config.time_window_size,
            time: CompensatedClock::default(),
            window_start: CompensatedClock::default(),
            time_windows: 1,
            min_iterations: config.min_iterations,
            max_iterations: config.max_iterations,
            iterations: 1,
            total_iterations: 1,
            has_converged: false,
            is_initialized: false,
            is_time_window_complete: false,
            has_data_been_received: false,
            sends_initialized_data: false,
            receives_initialized_data: false,
            all_data: BTreeMap::new(),
            convergence: ConvergenceSet::default(),
            acceleration: None,
            ledger: ActionLedger::new(),
            iterations_writer: None,
            convergence_writer: None,
        })
    }

    // ── Mode and identity ────────────────────────────────────────────

    pub fn is_implicit(&self) -> bool {
        self.mode == CouplingMode::Implicit
    }

    pub fn is_explicit(&self) -> bool {
        self.mode == CouplingMode::Explicit
    }

    pub fn timestepping(&self) -> TimesteppingMethod {
        self.timestepping
    }

    pub fn does_first_step(&self) -> bool {
        self.does_first_step
    }

    pub fn local_participant(&self) -> &str {
        &self.local_participant
    }

    pub fn is_secondary_rank(&self) -> bool {
        self.rank.is_secondary()
    }

    // ── Time state ───────────────────────────────────────────────────

    /// The currently computed time.
    pub fn time(&self) -> f64 {
        self.time.sum()
    }

    /// Start time of the current window.
    pub fn window_start_time(&self) -> f64 {
        self.window_start.sum()
    }

    /// 1-based counter of the window currently being computed.
    pub fn time_windows(&self) -> i32 {
        self.time_windows
    }

    pub fn has_time_window_size(&self) -> bool {
        !math::equals(self.time_window_size, UNDEFINED_TIME_WINDOW_SIZE)
    }

    pub fn time_window_size(&self) -> f64 {
        assert!(self.has_time_window_size(), "no time window size configured");
        self.time_window_size
    }

    pub fn next_time_window_size(&self) -> f64 {
        self.next_time_window_size
    }

    pub fn set_time_window_size(&mut self, size: f64) {
        self.time_window_size = size;
    }

    /// Announces the size of the window after the current one.
    pub fn set_next_time_window_size(&mut self, size: f64) {
        self.next_time_window_size = size;
    }

    pub fn set_time_windows(&mut self, time_windows: i32) {
        self.time_windows = time_windows;
    }

    fn has_max_time(&self) -> bool {
        !math::equals(self.max_time, UNDEFINED_TIME)
    }

    fn has_next_time_window_size(&self) -> bool {
        !math::equals(self.next_time_window_size, UNDEFINED_TIME_WINDOW_SIZE)
    }

    /// Maximum step the solver may take next; zero once coupling ended.
    pub fn next_time_step_max_size(&self) -> f64 {
        if !self.is_coupling_ongoing() {
            return 0.0;
        }
        if self.has_time_window_size() {
            let in_window = self.window_start_time() + self.time_window_size - self.time();
            if self.has_max_time() {
                in_window.min(self.max_time - self.time())
            } else {
                in_window
            }
        } else if self.has_max_time() {
            self.max_time - self.time()
        } else {
            f64::MAX
        }
    }

    /// True while time and window limits both leave room.
    pub fn is_coupling_ongoing(&self) -> bool {
        let time_left = !self.has_max_time() || math::greater(self.max_time, self.time());
        let windows_left = self.max_time_windows == UNDEFINED_TIME_WINDOWS
            || self.max_time_windows >= self.time_windows;
        time_left && windows_left
    }

    /// End-of-window predicate, using the tolerant time comparisons.
    ///
    /// Without a window size this participant dictates the cadence and
    /// every step ends a window. With one, the window end is
    /// `window_start + size`, truncated by `max_time` when that falls
    /// earlier.
    pub fn reached_end_of_time_window(&self) -> bool {
        if !self.has_time_window_size() {
            return true;
        }
        let window_end = self.window_start_time() + self.time_window_size;
        if self.has_max_time() && math::smaller(self.max_time, window_end) {
            return math::equals(self.time(), self.max_time);
        }
        math::equals(self.time(), window_end)
    }

    /// True if the next `advance` will exchange data, given the size of the
    /// solver's upcoming step.
    pub fn will_data_be_exchanged(&self, last_solver_dt: f64) -> bool {
        let remainder = self.next_time_step_max_size() - last_solver_dt;
        !math::greater(remainder, 0.0)
    }

    /// Advances the computed time. Returns true when the step reached the
    /// end of the current window.
    pub fn add_computed_time(&mut self, dt: f64) -> SchemeResult<bool> {
        if !self.is_coupling_ongoing() {
            return Err(SchemeError::CouplingComplete);
        }
        debug!(dt, time = self.time(), "adding computed time");
        let max_before = self.next_time_step_max_size();
        self.time.add(dt);

        if !math::greater_equals(self.next_time_step_max_size(), 0.0) {
            return Err(SchemeError::StepExceedsWindow { dt, max: max_before });
        }
        Ok(self.reached_end_of_time_window())
    }

    // ── Flags and counters ───────────────────────────────────────────

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn is_time_window_complete(&self) -> bool {
        self.is_time_window_complete
    }

    pub fn has_data_been_received(&self) -> bool {
        self.has_data_been_received
    }

    pub fn has_converged(&self) -> bool {
        self.has_converged
    }

    pub fn iterations(&self) -> i32 {
        self.iterations
    }

    pub fn total_iterations(&self) -> i32 {
        self.total_iterations
    }

    pub fn sends_initialized_data(&self) -> bool {
        self.sends_initialized_data
    }

    pub fn receives_initialized_data(&self) -> bool {
        self.receives_initialized_data
    }

    /// Marks that data arrived during the current advance. At most one
    /// exchange may report this per coupling iteration.
    pub fn notify_data_received(&mut self) {
        assert!(
            !self.has_data_been_received,
            "data may only be received once within one coupling iteration"
        );
        self.has_data_been_received = true;
    }

    /// Clears the received-data flag for schedules that receive outside the
    /// regular advance cycle (initial data followed by a first-advance
    /// result).
    pub fn reset_data_received(&mut self) {
        self.has_data_been_received = false;
    }

    // ── Data registration ────────────────────────────────────────────

    /// Registers a data field, or returns the existing handle when the same
    /// id was already registered with the same direction. Conflicting
    /// directions are a configuration error.
    pub fn register_data(
        &mut self,
        spec: DataSpec,
        direction: Direction,
    ) -> SchemeResult<SharedDatum> {
        if let Some(existing) = self.all_data.get(&spec.id) {
            if existing.borrow().direction() != direction {
                return Err(SchemeError::ConflictingDirections(spec.name));
            }
            return Ok(existing.clone());
        }

        if spec.requires_initialization {
            match direction {
                Direction::Send => {
                    self.sends_initialized_data = true;
                    self.ledger.require(Action::InitializeData);
                }
                // The receive side expects initial data but requests no
                // matching action; the initial exchange supplies it.
                Direction::Receive => self.receives_initialized_data = true,
            }
        }

        let datum = CouplingDatum::shared(spec, direction);
        self.all_data.insert(datum.borrow().id(), datum.clone());
        Ok(datum)
    }

    pub fn datum(&self, id: DataId) -> SchemeResult<SharedDatum> {
        self.all_data
            .get(&id)
            .cloned()
            .ok_or(SchemeError::UnknownData(id))
    }

    /// All registered data ids in stable order.
    pub fn data_ids(&self) -> Vec<DataId> {
        self.all_data.keys().copied().collect()
    }

    /// True iff any send-direction datum exchanges substeps.
    pub fn requires_substeps(&self) -> bool {
        self.all_data.values().any(|d| {
            let d = d.borrow();
            d.direction() == Direction::Send && d.exchange_substeps()
        })
    }

    pub fn add_convergence_measure(
        &mut self,
        data_id: DataId,
        suffices: bool,
        strict: bool,
        measure: Box<dyn ConvergenceMeasure>,
        does_logging: bool,
    ) -> SchemeResult<()> {
        let datum = self.datum(data_id)?;
        self.convergence.add(MeasureContext {
            datum,
            suffices,
            strict,
            does_logging,
            measure,
        });
        Ok(())
    }

    pub fn set_acceleration(&mut self, acceleration: Box<dyn Acceleration>) {
        self.acceleration = Some(acceleration);
    }

    pub fn has_acceleration(&self) -> bool {
        self.acceleration.is_some()
    }

    // ── Actions ──────────────────────────────────────────────────────

    pub fn require_action(&mut self, action: Action) {
        self.ledger.require(action);
    }

    pub fn is_action_required(&self, action: Action) -> bool {
        self.ledger.is_required(action)
    }

    pub fn mark_action_fulfilled(&mut self, action: Action) -> SchemeResult<()> {
        self.ledger.mark_fulfilled(action)
    }

    pub(crate) fn check_completeness_required_actions(&mut self) -> SchemeResult<()> {
        self.ledger.check_completeness()
    }

    // ── Initialization ───────────────────────────────────────────────

    pub(crate) fn begin_initialization(
        &mut self,
        start_time: f64,
        start_time_window: i32,
    ) -> SchemeResult<()> {
        if self.is_initialized {
            return Err(SchemeError::AlreadyInitialized);
        }
        if !math::greater_equals(start_time, 0.0) {
            return Err(SchemeError::InvalidConfiguration(format!(
                "start time must be non-negative, got {start_time}"
            )));
        }
        if start_time_window < 0 {
            return Err(SchemeError::InvalidConfiguration(format!(
                "start time window must be non-negative, got {start_time_window}"
            )));
        }
        self.window_start.reset(start_time);
        self.time.reset(start_time);
        self.time_windows = start_time_window;
        self.has_data_been_received = false;

        // Send-side storage gets its initial stample here; the receive side
        // is seeded by the schedule so it can be overwritten by initial
        // data.
        for datum in self.all_data.values() {
            let mut datum = datum.borrow_mut();
            if datum.direction() == Direction::Send {
                let sample = datum.sample().clone();
                datum.set_sample_at_time(start_time, sample);
            }
        }
        Ok(())
    }

    pub(crate) fn initialize_acceleration(&mut self, ids: &[DataId]) -> SchemeResult<()> {
        if self.acceleration.is_some() {
            let data = self.collect_data(ids)?;
            self.acceleration
                .as_mut()
                .expect("checked above")
                .initialize(&data)?;
        }
        Ok(())
    }

    pub(crate) fn set_initialized(&mut self) {
        self.is_initialized = true;
    }

    /// Seeds the receive-side storage so readers see a well-defined initial
    /// stample even if no initial data arrives.
    pub fn seed_receive_storage(&mut self, ids: &[DataId]) -> SchemeResult<()> {
        let time = self.time();
        for id in ids {
            let datum = self.datum(*id)?;
            let mut datum = datum.borrow_mut();
            debug!(data = %datum.name(), "seeding receive storage with the current sample");
            let sample = datum.sample().clone();
            datum.set_sample_at_time(time, sample);
        }
        Ok(())
    }

    /// Snapshots all data values as the baseline of the next iteration.
    pub fn store_iteration(&mut self) {
        assert!(self.is_implicit(), "iteration snapshots exist in implicit mode only");
        for datum in self.all_data.values() {
            datum.borrow_mut().store_iteration();
        }
    }

    /// Promotes the final stample of every datum to the next window.
    pub fn move_to_next_window(&mut self) {
        debug!(window = self.time_windows, "moving data storage to the next window");
        for datum in self.all_data.values() {
            datum.borrow_mut().move_to_next_window();
        }
    }

    // ── Channel exchange ─────────────────────────────────────────────

    /// Sends every datum of `ids` in order, following the wire contract.
    pub fn send_data(&self, channel: &mut dyn Channel, ids: &[DataId]) -> SchemeResult<()> {
        for id in ids {
            let datum = self.datum(*id)?;
            let mut datum = datum.borrow_mut();
            assert!(!datum.stamples().is_empty(), "no stamples to send");

            if datum.exchange_substeps() {
                let times = datum.times();
                let packed = SerializedStamples::pack(&datum.sample_run());
                channel.send_int(times.len() as i32)?;
                channel.send_doubles(&times)?;
                channel.send_doubles(packed.values())?;
                if datum.has_gradient() {
                    let gradients = packed.gradients().expect("gradient flag without buffers");
                    channel.send_doubles(gradients)?;
                }
                debug!(data = %datum.name(), substeps = times.len(), "sent substep data");
            } else {
                datum.adopt_last_stample();
                channel.send_doubles(datum.values().as_slice())?;
                if datum.has_gradient() {
                    let gradients = datum.gradients().expect("gradient flag without buffers");
                    channel.send_doubles(gradients.as_slice())?;
                }
                debug!(data = %datum.name(), "sent window-end data");
            }
        }
        Ok(())
    }

    /// Receives every datum of `ids` in order, mirroring
    /// [`SchemeCore::send_data`]. Without substeps the received sample is
    /// stored at the current time.
    pub fn receive_data(&self, channel: &mut dyn Channel, ids: &[DataId]) -> SchemeResult<()> {
        let window_start = self.window_start_time();
        let time = self.time();
        for id in ids {
            let datum = self.datum(*id)?;
            let mut datum = datum.borrow_mut();

            if datum.exchange_substeps() {
                let n_time_steps = channel.receive_int()? as usize;
                assert!(n_time_steps > 0, "peer sent an empty substep run");
                let times = channel.receive_doubles(n_time_steps)?;
                let values = channel.receive_doubles(n_time_steps * datum.values_per_sample())?;
                let gradients = if datum.has_gradient() {
                    Some(channel.receive_doubles(n_time_steps * datum.gradients_per_sample())?)
                } else {
                    None
                };

                let samples = SerializedStamples::unpack(n_time_steps, values, gradients);
                datum.retreat_to(window_start);
                for (t, sample) in times.iter().zip(samples) {
                    datum.set_sample_at_time(*t, sample);
                }
                datum.adopt_last_stample();
                debug!(data = %datum.name(), substeps = n_time_steps, "received substep data");
            } else {
                let values = channel.receive_doubles(datum.values_per_sample())?;
                datum.set_values(&values);
                if datum.has_gradient() {
                    let gradients = channel.receive_doubles(datum.gradients_per_sample())?;
                    datum.set_gradients(&gradients);
                }
                let sample = datum.sample().clone();
                datum.set_sample_at_time(time, sample);
                debug!(data = %datum.name(), "received window-end data");
            }
        }
        Ok(())
    }

    /// Receives with the clock temporarily moved to the end of the next
    /// window, so the samples are stored at the correct timestamp.
    pub fn receive_data_for_window_end(
        &mut self,
        channel: &mut dyn Channel,
        ids: &[DataId],
    ) -> SchemeResult<()> {
        if !self.has_next_time_window_size() {
            return self.receive_data(channel, ids);
        }
        let previous_time = self.time();
        self.time.add(self.next_time_window_size);
        let result = self.receive_data(channel, ids);
        self.time.reset(previous_time);
        result
    }

    /// Sends the convergence decision; only the deciding (non-first)
    /// participant sends.
    pub fn send_convergence(&self, channel: &mut dyn Channel) -> SchemeResult<()> {
        assert!(self.is_implicit(), "convergence exists in implicit mode only");
        assert!(
            !self.does_first_step,
            "the deciding participant is never the first one"
        );
        channel.send_bool(self.has_converged)?;
        Ok(())
    }

    /// Receives the convergence decision; only the first participant
    /// receives.
    pub fn receive_convergence(&mut self, channel: &mut dyn Channel) -> SchemeResult<()> {
        assert!(self.is_implicit(), "convergence exists in implicit mode only");
        assert!(
            self.does_first_step,
            "the receiving participant is always the first one"
        );
        self.has_converged = channel.receive_bool()?;
        Ok(())
    }

    /// Announces the just-performed window size to the second participant.
    pub fn send_window_size(&self, channel: &mut dyn Channel) -> SchemeResult<()> {
        let performed = self.time() - self.window_start_time();
        debug!(size = performed, "announcing time window size");
        channel.send_double(performed)?;
        Ok(())
    }

    /// Adopts the window size dictated by the first participant: it becomes
    /// the next window's size, and the current one's too while none is set.
    pub fn receive_window_size(&mut self, channel: &mut dyn Channel) -> SchemeResult<()> {
        let size = channel.receive_double()?;
        debug!(size, "adopting dictated time window size");
        if !self.has_time_window_size() {
            self.time_window_size = size;
        }
        self.next_time_window_size = size;
        Ok(())
    }

    // ── Implicit iteration ───────────────────────────────────────────

    /// Measures convergence and, on a non-converged iteration, runs the
    /// acceleration transform over `acceleration_ids`.
    pub fn do_implicit_step(&mut self, acceleration_ids: &[DataId]) -> SchemeResult<()> {
        debug!("measuring convergence of the coupling iteration");
        self.has_converged = self.measure_convergence()?;
        // Bounded termination: the iteration limit forces acceptance.
        if self.iterations == self.max_iterations {
            self.has_converged = true;
        }

        if self.has_converged {
            let data = self.collect_data(acceleration_ids)?;
            if let Some(acceleration) = self.acceleration.as_mut() {
                acceleration.iterations_converged(&data);
            }
            self.convergence.new_series_all();
        } else if self.acceleration.is_some() {
            let data = self.collect_data(acceleration_ids)?;
            // Acceleration works on the working samples: load the latest
            // stample, transform in place, store back at the window end.
            for datum in &data {
                datum.borrow_mut().adopt_last_stample();
            }
            self.acceleration
                .as_mut()
                .expect("checked above")
                .accelerate(&data)?;
            let time = self.time();
            for datum in &data {
                let mut datum = datum.borrow_mut();
                let sample = datum.sample().clone();
                datum.set_sample_at_time(time, sample);
            }
        }
        Ok(())
    }

    fn measure_convergence(&mut self) -> SchemeResult<bool> {
        assert!(
            !self.does_first_step,
            "the first participant never measures convergence"
        );

        if !self.is_secondary_rank() {
            if let Some(writer) = self.convergence_writer.as_mut() {
                writer.write_int("TimeWindow", self.time_windows - 1)?;
                writer.write_int("Iteration", self.iterations)?;
            }
        }

        if self.convergence.is_empty() {
            warn!("no convergence measures defined, iteration will never converge");
            return Ok(false);
        }

        let mut all_converged = true;
        let mut one_suffices = false;
        let mut one_strict_failing = false;
        let reached_min_iterations = self.iterations >= self.min_iterations;

        let log_residuals = !self.rank.is_secondary();
        let convergence_writer = &mut self.convergence_writer;
        for context in self.convergence.iter_mut() {
            let datum = context.datum.borrow();
            assert_eq!(
                datum.previous_iteration().len(),
                datum.values().len(),
                "iteration snapshot of {} lost its shape",
                datum.name()
            );
            context
                .measure
                .measure(datum.previous_iteration(), datum.values());

            if log_residuals && context.does_logging {
                if let Some(writer) = convergence_writer.as_mut() {
                    let header = format!(
                        "{}({})",
                        context.measure.abbreviation(),
                        datum.name()
                    );
                    writer.write_double(&header, context.measure.residual())?;
                }
            }

            if !context.measure.has_converged() {
                all_converged = false;
                if context.strict {
                    assert!(self.max_iterations > 0, "strict measures need a finite limit");
                    one_strict_failing = true;
                    if self.iterations >= self.max_iterations {
                        return Err(SchemeError::StrictConvergenceFailure {
                            data: datum.name().to_string(),
                            iterations: self.max_iterations,
                        });
                    }
                }
            } else if context.suffices {
                one_suffices = true;
            }

            info!("{}", context.measure.describe(datum.name()));
        }

        if all_converged {
            info!("all convergence measures converged");
        } else if one_suffices && !one_strict_failing {
            info!("sufficient convergence measures converged");
        }

        Ok(reached_min_iterations && (all_converged || (one_suffices && !one_strict_failing)))
    }

    fn collect_data(&self, ids: &[DataId]) -> SchemeResult<Vec<SharedDatum>> {
        ids.iter().map(|id| self.datum(*id)).collect()
    }

    // ── Advance bookkeeping ──────────────────────────────────────────

    pub(crate) fn precheck_first_exchange(&mut self) -> SchemeResult<()> {
        self.check_completeness_required_actions()?;
        if !self.is_initialized {
            return Err(SchemeError::NotInitialized);
        }
        self.has_data_been_received = false;
        self.is_time_window_complete = false;
        Ok(())
    }

    pub(crate) fn precheck_second_exchange(&mut self) -> SchemeResult<()> {
        self.check_completeness_required_actions()?;
        if !self.is_initialized {
            return Err(SchemeError::NotInitialized);
        }
        assert!(
            !self.is_time_window_complete,
            "second_exchange called twice within one advance"
        );
        Ok(())
    }

    /// Tentative window increment at the start of an exchange; undone when
    /// an implicit window does not converge.
    pub(crate) fn increment_time_windows(&mut self) {
        self.time_windows += 1;
    }

    /// Window and iteration bookkeeping after the schedule exchanged the
    /// second data set.
    pub(crate) fn finish_window_or_iteration(&mut self) -> SchemeResult<()> {
        if self.is_implicit() {
            if !self.has_converged {
                debug!("no convergence achieved, repeating the time window");
                self.ledger.require(Action::ReadCheckpoint);
                assert!(
                    math::greater(self.time(), self.window_start_time()),
                    "an iteration must make strictly positive progress"
                );
                self.time_windows -= 1;
                self.is_time_window_complete = false;
                // Let the solver rewrite its part of the window from the
                // start; the freshly received iterate stays.
                self.retreat_send_data_to_window_start();
            } else {
                debug!("convergence achieved");
                self.advance_writers()?;
                info!(window = self.time_windows - 1, "time window completed");
                self.is_time_window_complete = true;
                if self.is_coupling_ongoing() {
                    self.ledger.require(Action::WriteCheckpoint);
                }
            }
            self.total_iterations += 1;
            if self.has_converged {
                self.iterations = 1;
            } else {
                self.iterations += 1;
            }
        } else {
            info!(window = self.time_windows - 1, "time window completed");
            self.is_time_window_complete = true;
        }

        if self.is_coupling_ongoing() {
            assert!(
                self.has_data_been_received,
                "an exchange completed without receiving data"
            );
        }

        if self.is_time_window_complete {
            let performed = self.time() - self.window_start_time();
            if self.has_time_window_size() && math::equals(performed, self.time_window_size) {
                self.window_start.add(self.time_window_size);
            } else if !self.has_time_window_size() {
                // This participant dictates the cadence; the performed part
                // is the window.
                self.window_start.add(performed);
            } else {
                // The final window is truncated by max-time.
                self.window_start.add(performed);
                assert!(self.has_max_time(), "truncated window without a max-time");
                assert!(
                    math::equals(self.max_time, self.time()),
                    "a truncated window must end exactly at max-time"
                );
            }
        }

        // Back to the window start: a rollback for a repeated iteration, or
        // the start of the next window.
        self.time.reset(self.window_start_time());
        self.time_window_size = self.next_time_window_size;

        if self.is_implicit() {
            self.store_iteration();
        }
        Ok(())
    }

    fn retreat_send_data_to_window_start(&mut self) {
        let window_start = self.window_start_time();
        for datum in self.all_data.values() {
            let mut datum = datum.borrow_mut();
            if datum.direction() == Direction::Send {
                datum.retreat_to(window_start);
            }
        }
    }

    // ── Iteration and convergence tables ─────────────────────────────

    pub(crate) fn initialize_writers(&mut self) -> SchemeResult<()> {
        if self.is_secondary_rank() {
            return Ok(());
        }

        let mut iterations_writer = TableWriter::create(
            self.log_directory
                .join(format!("tandem-{}-iterations.log", self.local_participant)),
        )?;
        iterations_writer.add_column("TimeWindow", ColumnKind::Int);
        iterations_writer.add_column("TotalIterations", ColumnKind::Int);
        iterations_writer.add_column("Iterations", ColumnKind::Int);
        iterations_writer.add_column("Convergence", ColumnKind::Int);

        if !self.does_first_step {
            let mut convergence_writer = TableWriter::create(
                self.log_directory
                    .join(format!("tandem-{}-convergence.log", self.local_participant)),
            )?;
            convergence_writer.add_column("TimeWindow", ColumnKind::Int);
            convergence_writer.add_column("Iteration", ColumnKind::Int);
            for context in self.convergence.iter() {
                if context.does_logging {
                    convergence_writer.add_column(context.log_header(), ColumnKind::Double);
                }
            }
            self.convergence_writer = Some(convergence_writer);

            if self.acceleration.is_some() {
                iterations_writer.add_column("QNColumns", ColumnKind::Int);
                iterations_writer.add_column("DeletedQNColumns", ColumnKind::Int);
                iterations_writer.add_column("DroppedQNColumns", ColumnKind::Int);
            }
        }

        self.iterations_writer = Some(iterations_writer);
        Ok(())
    }

    fn advance_writers(&mut self) -> SchemeResult<()> {
        if self.is_secondary_rank() {
            return Ok(());
        }
        let Some(writer) = self.iterations_writer.as_mut() else {
            return Ok(());
        };

        writer.write_int("TimeWindow", self.time_windows - 1)?;
        writer.write_int("TotalIterations", self.total_iterations)?;
        writer.write_int("Iterations", self.iterations)?;
        let converged = self.iterations >= self.min_iterations
            && (self.max_iterations < 0 || self.iterations < self.max_iterations);
        writer.write_int("Convergence", i32::from(converged))?;

        if !self.does_first_step {
            if let Some(acceleration) = self.acceleration.as_ref() {
                let stats = acceleration.column_stats();
                writer.write_int("QNColumns", stats.active)?;
                writer.write_int("DeletedQNColumns", stats.deleted)?;
                writer.write_int("DroppedQNColumns", stats.dropped)?;
            }
        }
        Ok(())
    }

    // ── State description ────────────────────────────────────────────

    /// One-line human-readable coupling state.
    pub fn describe_state(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        if self.is_implicit() {
            write!(out, "iteration: {}", self.iterations).unwrap();
            if self.max_iterations != UNDEFINED_MAX_ITERATIONS
                && self.max_iterations != INFINITE_MAX_ITERATIONS
            {
                write!(out, " of {}", self.max_iterations).unwrap();
            }
            if self.min_iterations != UNDEFINED_MIN_ITERATIONS {
                write!(out, " (min {})", self.min_iterations).unwrap();
            }
            out.push_str(", ");
        }
        write!(out, "time-window: {}", self.time_windows).unwrap();
        if self.max_time_windows != UNDEFINED_TIME_WINDOWS {
            write!(out, " of {}", self.max_time_windows).unwrap();
        }
        write!(out, ", time: {}", self.time()).unwrap();
        if self.has_max_time() {
            write!(out, " of {}", self.max_time).unwrap();
        }
        if self.has_time_window_size() {
            write!(out, ", time-window-size: {}", self.time_window_size).unwrap();
        }
        if self.has_time_window_size() || self.has_max_time() {
            write!(out, ", max-time-step-size: {}", self.next_time_step_max_size()).unwrap();
        }
        write!(
            out,
            ", ongoing: {}",
            if self.is_coupling_ongoing() { "yes" } else { "no" }
        )
        .unwrap();
        write!(
            out,
            ", time-window-complete: {}",
            if self.is_time_window_complete { "yes" } else { "no" }
        )
        .unwrap();
        for action in self.ledger.pending() {
            write!(out, ", {action}").unwrap();
        }
        out
    }
}
