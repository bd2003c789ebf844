//! Serial schedule: the participants take turns within each window.
//!
//! The first participant computes a window and sends; the second computes
//! with that data, decides convergence in implicit mode, sends its result
//! back, and already receives the peer's next window while coupling is
//! ongoing. Received window-end data is stamped at the end of the window it
//! will be used in.

use tandem_transport::Channel;
use tandem_types::{DataId, TimesteppingMethod};

use crate::error::SchemeResult;
use crate::scheme::ExchangeSchedule;
use crate::state_machine::SchemeCore;

pub struct SerialSchedule {
    partner: String,
    channel: Box<dyn Channel>,
    send: Vec<DataId>,
    receive: Vec<DataId>,
}

impl SerialSchedule {
    pub fn new(partner: impl Into<String>, channel: Box<dyn Channel>) -> Self {
        Self {
            partner: partner.into(),
            channel,
            send: Vec::new(),
            receive: Vec::new(),
        }
    }

    fn dictates_window_size(core: &SchemeCore) -> bool {
        core.timestepping() == TimesteppingMethod::FirstParticipant
    }
}

impl ExchangeSchedule for SerialSchedule {
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

    fn receive_result_of_first_advance(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        if core.does_first_step() {
            return Ok(());
        }
        core.reset_data_received();
        if Self::dictates_window_size(core) {
            core.receive_window_size(self.channel.as_mut())?;
        }
        core.receive_data_for_window_end(self.channel.as_mut(), &self.receive)?;
        core.notify_data_received();
        Ok(())
    }

    fn exchange_first_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        if core.does_first_step() {
            if Self::dictates_window_size(core) {
                core.send_window_size(self.channel.as_mut())?;
            }
            core.send_data(self.channel.as_mut(), &self.send)?;
        }
        // The second participant is passive in the first phase.
        Ok(())
    }

    fn exchange_second_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        if core.does_first_step() {
            if core.is_implicit() {
                core.receive_convergence(self.channel.as_mut())?;
            }
            if core.is_explicit() || core.has_converged() {
                core.move_to_next_window();
                // The peer's result is used during the next window.
                core.receive_data_for_window_end(self.channel.as_mut(), &self.receive)?;
            } else {
                core.receive_data(self.channel.as_mut(), &self.receive)?;
            }
            core.notify_data_received();
        } else {
            if core.is_implicit() {
                core.do_implicit_step(&self.acceleration_data())?;
                core.send_convergence(self.channel.as_mut())?;
            }
            let window_done = core.is_explicit() || core.has_converged();
            if window_done {
                core.move_to_next_window();
            }
            core.send_data(self.channel.as_mut(), &self.send)?;

            // The first participant's next window (or repeated iteration)
            // is already on the wire whenever the coupling continues.
            let will_iterate = core.is_implicit() && !core.has_converged();
            if will_iterate || core.is_coupling_ongoing() {
                if Self::dictates_window_size(core) {
                    core.receive_window_size(self.channel.as_mut())?;
                }
                if window_done {
                    core.receive_data_for_window_end(self.channel.as_mut(), &self.receive)?;
                } else {
                    core.receive_data(self.channel.as_mut(), &self.receive)?;
                }
                core.notify_data_received();
            }
        }
        Ok(())
    }

    fn acceleration_data(&self) -> Vec<DataId> {
        // The deciding participant accelerates the data it receives.
        self.receive.clone()
    }
}
