//! The capability set of concrete schemes and the adapter-facing facade.

use tandem_transport::Channel;
use tandem_types::{Action, CouplingMode, DataId, Direction, MeshId, TimesteppingMethod};

use crate::data::{DataSpec, SharedDatum};
use crate::error::{SchemeError, SchemeResult};
use crate::multi::{MultiSchedule, PeerLink};
use crate::parallel::ParallelSchedule;
use crate::serial::SerialSchedule;
use crate::state_machine::{SchemeConfig, SchemeCore};

/// What distinguishes one concrete coupling scheme from another.
///
/// The state machine ([`SchemeCore`]) is a concrete object; a schedule owns
/// the channel(s) and the send/receive sets and decides who talks when in
/// each phase. All bookkeeping goes back through the core so the invariants
/// stay in one place.
pub trait ExchangeSchedule {
    /// Names of the coupling partners.
    fn partners(&self) -> Vec<String>;

    /// Adds a registered datum to the send set (of `peer`, where relevant).
    fn register_send(&mut self, id: DataId, peer: Option<&str>) -> SchemeResult<()>;

    /// Adds a registered datum to the receive set (of `peer`, where
    /// relevant).
    fn register_receive(&mut self, id: DataId, peer: Option<&str>) -> SchemeResult<()>;

    /// Seeds receive-side storage before the initial exchange.
    fn initialize_receive_storage(&mut self, core: &mut SchemeCore) -> SchemeResult<()>;

    /// One-shot initial data handshake.
    fn exchange_initial_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()>;

    /// Receives the peer's first-window result right after initialization.
    ///
    /// Only meaningful for the second participant of a serial schedule;
    /// the default does nothing.
    fn receive_result_of_first_advance(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        let _ = core;
        Ok(())
    }

    /// Send-side half of the window exchange.
    fn exchange_first_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()>;

    /// Receive-side half of the window exchange, including convergence in
    /// implicit mode.
    fn exchange_second_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()>;

    /// Data the acceleration module operates on.
    fn acceleration_data(&self) -> Vec<DataId>;
}

/// A coupling scheme as driven by a solver adapter.
///
/// Constructed from a [`SchemeConfig`] and an [`ExchangeSchedule`], then
/// driven per step: `add_computed_time`, `first_synchronization`,
/// `first_exchange`, `second_synchronization`, `second_exchange` (or
/// [`CouplingScheme::advance`] for all four phases at once).
pub struct CouplingScheme {
    core: SchemeCore,
    schedule: Box<dyn ExchangeSchedule>,
}

impl CouplingScheme {
    pub fn new(config: SchemeConfig, schedule: Box<dyn ExchangeSchedule>) -> SchemeResult<Self> {
        Ok(Self {
            core: SchemeCore::new(config)?,
            schedule,
        })
    }

    /// Serial schedule: the participants take turns within one window.
    pub fn serial(
        config: SchemeConfig,
        partner: impl Into<String>,
        channel: Box<dyn Channel>,
    ) -> SchemeResult<Self> {
        Self::new(config, Box::new(SerialSchedule::new(partner, channel)))
    }

    /// Parallel schedule: both participants compute the same window
    /// concurrently.
    pub fn parallel(
        config: SchemeConfig,
        partner: impl Into<String>,
        channel: Box<dyn Channel>,
    ) -> SchemeResult<Self> {
        if config.timestepping == TimesteppingMethod::FirstParticipant {
            return Err(SchemeError::InvalidConfiguration(
                "the first-participant timestepping method requires a serial schedule".into(),
            ));
        }
        Self::new(config, Box::new(ParallelSchedule::new(partner, channel)))
    }

    /// Multi schedule: a star of participants around a controller.
    pub fn multi(config: SchemeConfig, peers: Vec<PeerLink>) -> SchemeResult<Self> {
        if config.coupling_mode == CouplingMode::Explicit {
            return Err(SchemeError::InvalidConfiguration(
                "multi coupling is only defined for implicit mode".into(),
            ));
        }
        if config.timestepping == TimesteppingMethod::FirstParticipant {
            return Err(SchemeError::InvalidConfiguration(
                "the first-participant timestepping method requires a serial schedule".into(),
            ));
        }
        Self::new(config, Box::new(MultiSchedule::new(peers)))
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Registers a field this participant sends.
    pub fn add_send_data(&mut self, spec: DataSpec) -> SchemeResult<SharedDatum> {
        let datum = self.core.register_data(spec, Direction::Send)?;
        self.schedule.register_send(datum.borrow().id(), None)?;
        Ok(datum)
    }

    /// Registers a field this participant receives.
    pub fn add_receive_data(&mut self, spec: DataSpec) -> SchemeResult<SharedDatum> {
        let datum = self.core.register_data(spec, Direction::Receive)?;
        self.schedule.register_receive(datum.borrow().id(), None)?;
        Ok(datum)
    }

    /// Registers a field sent to a specific peer of a multi schedule.
    pub fn add_send_data_for(
        &mut self,
        peer: &str,
        spec: DataSpec,
    ) -> SchemeResult<SharedDatum> {
        let datum = self.core.register_data(spec, Direction::Send)?;
        self.schedule.register_send(datum.borrow().id(), Some(peer))?;
        Ok(datum)
    }

    /// Registers a field received from a specific peer of a multi schedule.
    pub fn add_receive_data_for(
        &mut self,
        peer: &str,
        spec: DataSpec,
    ) -> SchemeResult<SharedDatum> {
        let datum = self.core.register_data(spec, Direction::Receive)?;
        self.schedule
            .register_receive(datum.borrow().id(), Some(peer))?;
        Ok(datum)
    }

    pub fn add_convergence_measure(
        &mut self,
        data_id: DataId,
        suffices: bool,
        strict: bool,
        measure: Box<dyn crate::convergence::ConvergenceMeasure>,
        does_logging: bool,
    ) -> SchemeResult<()> {
        self.core
            .add_convergence_measure(data_id, suffices, strict, measure, does_logging)
    }

    pub fn set_acceleration(&mut self, acceleration: Box<dyn crate::acceleration::Acceleration>) {
        self.core.set_acceleration(acceleration);
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Initializes time state, seeds receive storage, and runs the initial
    /// data handshake.
    pub fn initialize(&mut self, start_time: f64, start_time_window: i32) -> SchemeResult<()> {
        self.core.begin_initialization(start_time, start_time_window)?;
        self.schedule.initialize_receive_storage(&mut self.core)?;

        if self.core.is_implicit() {
            self.core.store_iteration();
            if !self.core.does_first_step() {
                let acceleration_data = self.schedule.acceleration_data();
                self.core.initialize_acceleration(&acceleration_data)?;
            }
            self.core.require_action(Action::WriteCheckpoint);
            self.core.initialize_writers()?;
        }

        self.schedule.exchange_initial_data(&mut self.core)?;
        self.core.set_initialized();
        Ok(())
    }

    /// Receives the first-advance result where the schedule needs it; call
    /// directly after [`CouplingScheme::initialize`].
    pub fn receive_result_of_first_advance(&mut self) -> SchemeResult<()> {
        if !self.core.is_initialized() {
            return Err(SchemeError::NotInitialized);
        }
        self.schedule.receive_result_of_first_advance(&mut self.core)
    }

    /// Advances the computed time; returns true when the step reached the
    /// end of the current window.
    pub fn add_computed_time(&mut self, dt: f64) -> SchemeResult<bool> {
        self.core.add_computed_time(dt)
    }

    /// All four advance phases in order.
    pub fn advance(&mut self) -> SchemeResult<()> {
        self.first_synchronization(&[])?;
        self.first_exchange()?;
        self.second_synchronization()?;
        self.second_exchange()
    }

    /// Phase 1: synchronizes mesh changes. The base schedules support no
    /// local changes and report none from remote.
    pub fn first_synchronization(&mut self, changes: &[MeshId]) -> SchemeResult<Vec<MeshId>> {
        assert!(
            changes.is_empty(),
            "mesh changes are not supported by this coupling scheme"
        );
        Ok(Vec::new())
    }

    /// Phase 2: action completeness check, then the send-side exchange if
    /// the window end was reached.
    pub fn first_exchange(&mut self) -> SchemeResult<()> {
        self.core.precheck_first_exchange()?;
        if self.core.reached_end_of_time_window() {
            // Tentative: undone again if this iteration does not converge.
            self.core.increment_time_windows();
            self.schedule.exchange_first_data(&mut self.core)?;
        }
        Ok(())
    }

    /// Phase 3: remote mesh changes of the second step; none for the base
    /// schedules.
    pub fn second_synchronization(&mut self) -> SchemeResult<Vec<MeshId>> {
        Ok(Vec::new())
    }

    /// Phase 4: receive-side exchange, convergence, and window bookkeeping.
    pub fn second_exchange(&mut self) -> SchemeResult<()> {
        self.core.precheck_second_exchange()?;
        if self.core.reached_end_of_time_window() {
            self.schedule.exchange_second_data(&mut self.core)?;
            self.core.finish_window_or_iteration()?;
        }
        Ok(())
    }

    /// Final action check at the end of the coupled simulation.
    pub fn finalize(&mut self) -> SchemeResult<()> {
        self.core.check_completeness_required_actions()?;
        if !self.core.is_initialized() {
            return Err(SchemeError::NotInitialized);
        }
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn partners(&self) -> Vec<String> {
        self.schedule.partners()
    }

    pub fn datum(&self, id: DataId) -> SchemeResult<SharedDatum> {
        self.core.datum(id)
    }

    pub fn is_initialized(&self) -> bool {
        self.core.is_initialized()
    }

    pub fn is_implicit(&self) -> bool {
        self.core.is_implicit()
    }

    pub fn is_coupling_ongoing(&self) -> bool {
        self.core.is_coupling_ongoing()
    }

    pub fn is_time_window_complete(&self) -> bool {
        self.core.is_time_window_complete()
    }

    pub fn has_converged(&self) -> bool {
        self.core.has_converged()
    }

    pub fn has_data_been_received(&self) -> bool {
        self.core.has_data_been_received()
    }

    pub fn sends_initialized_data(&self) -> bool {
        self.core.sends_initialized_data()
    }

    pub fn receives_initialized_data(&self) -> bool {
        self.core.receives_initialized_data()
    }

    pub fn time(&self) -> f64 {
        self.core.time()
    }

    pub fn window_start_time(&self) -> f64 {
        self.core.window_start_time()
    }

    pub fn time_windows(&self) -> i32 {
        self.core.time_windows()
    }

    pub fn has_time_window_size(&self) -> bool {
        self.core.has_time_window_size()
    }

    pub fn time_window_size(&self) -> f64 {
        self.core.time_window_size()
    }

    pub fn next_time_step_max_size(&self) -> f64 {
        self.core.next_time_step_max_size()
    }

    pub fn will_data_be_exchanged(&self, last_solver_dt: f64) -> bool {
        self.core.will_data_be_exchanged(last_solver_dt)
    }

    pub fn iterations(&self) -> i32 {
        self.core.iterations()
    }

    pub fn total_iterations(&self) -> i32 {
        self.core.total_iterations()
    }

    pub fn requires_substeps(&self) -> bool {
        self.core.requires_substeps()
    }

    pub fn is_action_required(&self, action: Action) -> bool {
        self.core.is_action_required(action)
    }

    pub fn mark_action_fulfilled(&mut self, action: Action) -> SchemeResult<()> {
        self.core.mark_action_fulfilled(action)
    }
}

impl std::fmt::Display for CouplingScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.core.describe_state())
    }
}
