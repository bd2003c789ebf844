//! Multi schedule: a star of participants around a controller.
//!
//! Every non-controller couples to the controller only. Per window the
//! non-controllers send first; the controller receives from all, decides
//! convergence over the combined data set, and sends the decision and its
//! data back to every peer. Implicit mode only.

use tandem_transport::Channel;
use tandem_types::DataId;

use crate::error::{SchemeError, SchemeResult};
use crate::scheme::ExchangeSchedule;
use crate::state_machine::SchemeCore;

/// Connection to one peer of a multi schedule, with its own data sets.
pub struct PeerLink {
    name: String,
    channel: Box<dyn Channel>,
    send: Vec<DataId>,
    receive: Vec<DataId>,
}

impl PeerLink {
    pub fn new(name: impl Into<String>, channel: Box<dyn Channel>) -> Self {
        Self {
            name: name.into(),
            channel,
            send: Vec::new(),
            receive: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct MultiSchedule {
    peers: Vec<PeerLink>,
}

impl MultiSchedule {
    pub fn new(peers: Vec<PeerLink>) -> Self {
        Self { peers }
    }

    fn peer_mut(&mut self, name: Option<&str>) -> SchemeResult<&mut PeerLink> {
        let name = name.ok_or_else(|| {
            SchemeError::UnknownPartner("(multi schedules register data per peer)".into())
        })?;
        self.peers
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| SchemeError::UnknownPartner(name.to_string()))
    }

    /// The controller is the participant that decides convergence.
    fn is_controller(core: &SchemeCore) -> bool {
        !core.does_first_step()
    }
}

impl ExchangeSchedule for MultiSchedule {
    fn partners(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.name.clone()).collect()
    }

    fn register_send(&mut self, id: DataId, peer: Option<&str>) -> SchemeResult<()> {
        let peer = self.peer_mut(peer)?;
        if !peer.send.contains(&id) {
            peer.send.push(id);
        }
        Ok(())
    }

    fn register_receive(&mut self, id: DataId, peer: Option<&str>) -> SchemeResult<()> {
        let peer = self.peer_mut(peer)?;
        if !peer.receive.contains(&id) {
            peer.receive.push(id);
        }
        Ok(())
    }

    fn initialize_receive_storage(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        for peer in &self.peers {
            core.seed_receive_storage(&peer.receive)?;
        }
        Ok(())
    }

    fn exchange_initial_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        if Self::is_controller(core) {
            if core.receives_initialized_data() {
                for peer in &mut self.peers {
                    core.receive_data(peer.channel.as_mut(), &peer.receive)?;
                }
                core.notify_data_received();
            }
            if core.sends_initialized_data() {
                for peer in &mut self.peers {
                    core.send_data(peer.channel.as_mut(), &peer.send)?;
                }
            }
        } else {
            if core.sends_initialized_data() {
                for peer in &mut self.peers {
                    core.send_data(peer.channel.as_mut(), &peer.send)?;
                }
            }
            if core.receives_initialized_data() {
                for peer in &mut self.peers {
                    core.receive_data(peer.channel.as_mut(), &peer.receive)?;
                }
                core.notify_data_received();
            }
        }
        Ok(())
    }

    fn exchange_first_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        if Self::is_controller(core) {
            for peer in &mut self.peers {
                core.receive_data(peer.channel.as_mut(), &peer.receive)?;
            }
            core.notify_data_received();
        } else {
            for peer in &mut self.peers {
                core.send_data(peer.channel.as_mut(), &peer.send)?;
            }
        }
        Ok(())
    }

    fn exchange_second_data(&mut self, core: &mut SchemeCore) -> SchemeResult<()> {
        if Self::is_controller(core) {
            core.do_implicit_step(&self.acceleration_data())?;
            for peer in &mut self.peers {
                core.send_convergence(peer.channel.as_mut())?;
            }
            if core.has_converged() {
                core.move_to_next_window();
            }
            for peer in &mut self.peers {
                core.send_data(peer.channel.as_mut(), &peer.send)?;
            }
        } else {
            for peer in &mut self.peers {
                core.receive_convergence(peer.channel.as_mut())?;
            }
            if core.has_converged() {
                core.move_to_next_window();
            }
            for peer in &mut self.peers {
                core.receive_data(peer.channel.as_mut(), &peer.receive)?;
            }
            core.notify_data_received();
        }
        Ok(())
    }

    fn acceleration_data(&self) -> Vec<DataId> {
        let mut ids = Vec::new();
        for peer in &self.peers {
            for id in peer.send.iter().chain(peer.receive.iter()) {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        ids
    }
}
