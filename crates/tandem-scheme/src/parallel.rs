//! Parallel schedule: both participants compute the same window
//! concurrently.
//!
//! The first participant sends in phase two's first half and receives the
//! peer's result in the second; the second participant mirrors this. In
//! implicit mode the second participant decides convergence and announces
//! it before the data leg.

use tandem_transport::Channel;
use tandem_types::DataId;

use crate::error::SchemeResult;
use crate::scheme::ExchangeSchedule;
use crate::state_machine::SchemeCore;

pub struct ParallelSchedule {
    partner: String,
    channel: Box<dyn Channel>,
    send: Vec<DataId>,
    receive: Vec<DataId>,
}

impl ParallelSchedule {
    pub fn new(partner: impl Into<String>, channel: Box<dyn Channel>) -> Self {
        Self {
            partner: partner.into(),
            channel,
            send: Vec::new(),
            receive: Vec::new(),
        }
    }
}

impl ExchangeSchedule for ParallelSchedule {
    fn partners(&self) -> Vec<String> {
        vec![self.partner.clone()]
    }

    fn register_send(&mut self, id: DataId, _peer: Option<&str>) -> SchemeResult<()> {
        if !self.send.contains(&id) {
            self.send.push(id);
        }
        Ok(())
    }

    fn register_receive(&mut self, id: DataId, _peer: Option<&str>) -> SchemeResult<()> {
        if !self.receive.contains(&id) {
            self.receive.push(id);
        }
        Ok(())
    }

    fn initialize_receive_storage(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        core.seed_receive_storage(&self.receive)
    }

    fn exchange_initial_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        if core.does_first_step() {
            if core.sends_initialized_data() {
                core.send_data(self.channel.as_mut(), &self.send)?;
            }
            if core.receives_initialized_data() {
                core.receive_data(self.channel.as_mut(), &self.receive)?;
                core.notify_data_received();
            }
        } else {
            if core.receives_initialized_data() {
                core.receive_data(self.channel.as_mut(), &self.receive)?;
                core.notify_data_received();
            }
            if core.sends_initialized_data() {
                core.send_data(self.channel.as_mut(), &self.send)?;
            }
        }
        Ok(())
    }

    fn exchange_first_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        if core.does_first_step() {
            core.send_data(self.channel.as_mut(), &self.send)?;
        } else {
            core.receive_data(self.channel.as_mut(), &self.receive)?;
            core.notify_data_received();
        }
        Ok(())
    }

    fn exchange_second_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        if core.is_explicit() {
            if core.does_first_step() {
                core.receive_data(self.channel.as_mut(), &self.receive)?;
                core.notify_data_received();
            } else {
                core.send_data(self.channel.as_mut(), &self.send)?;
            }
            core.move_to_next_window();
        } else if core.does_first_step() {
            core.receive_convergence(self.channel.as_mut())?;
            if core.has_converged() {
                core.move_to_next_window();
            }
            core.receive_data(self.channel.as_mut(), &self.receive)?;
            core.notify_data_received();
        } else {
            core.do_implicit_step(&self.acceleration_data())?;
            core.send_convergence(self.channel.as_mut())?;
            if core.has_converged() {
                core.move_to_next_window();
            }
            core.send_data(self.channel.as_mut(), &self.send)?;
        }
        Ok(())
    }

    fn acceleration_data(&self) -> Vec<DataId> {
        // Parallel schemes accelerate everything they exchange.
        let mut ids = self.send.clone();
        for id in &self.receive {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}
