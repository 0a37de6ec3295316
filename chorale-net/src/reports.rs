//! Outbound OSC reports to the remote controller.

use std::net::UdpSocket;

use rosc::{OscMessage, OscPacket, OscType};

use chorale_core::router::ReportSink;
use chorale_types::PerformerId;

pub struct ReportSender {
    socket: UdpSocket,
    controller_addr: String,
}

impl ReportSender {
    pub fn new(controller_addr: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            controller_addr: controller_addr.to_string(),
        })
    }

    fn send_message(&self, addr: &str, args: Vec<OscType>) -> std::io::Result<()> {
        let msg = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let buf = rosc::encoder::encode(&msg)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        self.socket.send_to(&buf, &self.controller_addr)?;
        Ok(())
    }

    /// /error_realtime e1..eN — per-tick stream, singing slots only.
    pub fn send_realtime(&self, errors: &[(usize, f64)]) -> std::io::Result<()> {
        let args = errors
            .iter()
            .map(|&(_, error)| OscType::Float(error as f32))
            .collect();
        self.send_message("/error_realtime", args)
    }

    /// /error e1..eN — per-measure averages, one per slot.
    pub fn send_measure(&self, errors: &[f64]) -> std::io::Result<()> {
        let args = errors
            .iter()
            .map(|&error| OscType::Float(error as f32))
            .collect();
        self.send_message("/error", args)
    }

    /// /send target address args... — addressed envelope for unicast or
    /// broadcast to a named or numbered participant.
    pub fn send_to_performer(
        &self,
        target: &PerformerId,
        address: &str,
        args: Vec<OscType>,
    ) -> std::io::Result<()> {
        let mut wrapped = vec![
            match target {
                PerformerId::Number(n) => OscType::Int(*n),
                PerformerId::Name(name) => OscType::String(name.clone()),
            },
            OscType::String(address.to_string()),
        ];
        wrapped.extend(args);
        self.send_message("/send", wrapped)
    }

    pub fn send_meter_changed(&self) -> std::io::Result<()> {
        self.send_message("/meter_changed", vec![])
    }

    pub fn send_tempo(&self, bpm: f64) -> std::io::Result<()> {
        self.send_message("/tempo", vec![OscType::Float(bpm as f32)])
    }

    pub fn send_start(&self) -> std::io::Result<()> {
        self.send_message("/start", vec![])
    }
}

/// Report emission is best-effort: a dropped datagram is superseded by
/// the next tick, so failures are logged and never propagated.
impl ReportSink for ReportSender {
    fn realtime_errors(&self, errors: &[(usize, f64)]) {
        if let Err(e) = self.send_realtime(errors) {
            log::warn!(target: "net::reports", "dropping realtime report: {}", e);
        }
    }

    fn measure_errors(&self, errors: &[f64]) {
        if let Err(e) = self.send_measure(errors) {
            log::warn!(target: "net::reports", "dropping measure report: {}", e);
        }
    }

    fn meter_changed(&self) {
        if let Err(e) = self.send_meter_changed() {
            log::warn!(target: "net::reports", "dropping meter change: {}", e);
        }
    }

    fn tempo(&self, bpm: f64) {
        if let Err(e) = self.send_tempo(bpm) {
            log::warn!(target: "net::reports", "dropping tempo report: {}", e);
        }
    }

    fn start(&self) {
        if let Err(e) = self.send_start() {
            log::warn!(target: "net::reports", "dropping start cue: {}", e);
        }
    }

    fn performer_freq(&self, target: &PerformerId, hz: f64) {
        let args = vec![OscType::Float(hz as f32)];
        if let Err(e) = self.send_to_performer(target, "/freq", args) {
            log::warn!(target: "net::reports", "dropping freq cue for {}: {}", target, e);
        }
    }

    fn performer_mute(&self, target: &PerformerId) {
        if let Err(e) = self.send_to_performer(target, "/mute", vec![]) {
            log::warn!(target: "net::reports", "dropping mute cue for {}: {}", target, e);
        }
    }
}
