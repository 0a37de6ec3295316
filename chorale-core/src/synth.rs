//! OSC client for the external synthesis engine.
//!
//! One UDP message per voice command: `/voice/freq slot hz`,
//! `/voice/play slot`, `/voice/stop slot`. Commands are fire-and-forget
//! — a failed send is logged and superseded by the next event, never
//! retried.

use std::net::UdpSocket;

use rosc::{OscMessage, OscPacket, OscType};

use crate::allocator::VoiceCommand;
use chorale_types::pitch::note_to_hz_a4;

/// Seam between the router and the synthesis engine, so tests can
/// record commands instead of opening sockets.
pub trait SynthControl {
    fn apply(&self, commands: &[VoiceCommand]);
}

pub struct SynthClient {
    socket: UdpSocket,
    server_addr: String,
    tuning_a4: f64,
}

impl SynthClient {
    pub fn new(server_addr: &str, tuning_a4: f64) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            server_addr: server_addr.to_string(),
            tuning_a4,
        })
    }

    fn send_message(&self, addr: &str, args: Vec<OscType>) -> std::io::Result<()> {
        let msg = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let buf = rosc::encoder::encode(&msg)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        self.socket.send_to(&buf, &self.server_addr)?;
        Ok(())
    }

    /// /voice/freq slot hz
    pub fn set_frequency(&self, slot: usize, hz: f64) -> std::io::Result<()> {
        self.send_message(
            "/voice/freq",
            vec![OscType::Int(slot as i32), OscType::Float(hz as f32)],
        )
    }

    /// /voice/play slot
    pub fn play(&self, slot: usize) -> std::io::Result<()> {
        self.send_message("/voice/play", vec![OscType::Int(slot as i32)])
    }

    /// /voice/stop slot
    pub fn stop(&self, slot: usize) -> std::io::Result<()> {
        self.send_message("/voice/stop", vec![OscType::Int(slot as i32)])
    }
}

impl SynthControl for SynthClient {
    fn apply(&self, commands: &[VoiceCommand]) {
        for command in commands {
            let result = match *command {
                VoiceCommand::Retune { slot, note } => {
                    self.set_frequency(slot, note_to_hz_a4(f64::from(note), self.tuning_a4))
                }
                VoiceCommand::Play { slot } => self.play(slot),
                VoiceCommand::Stop { slot } => self.stop(slot),
            };
            if let Err(e) = result {
                log::warn!(target: "synth", "dropping voice command {:?}: {}", command, e);
            }
        }
    }
}
