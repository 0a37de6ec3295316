use midir::{MidiInput, MidiInputConnection};
use std::sync::mpsc::{self, Receiver, Sender};

/// A normalized MIDI event tagged with the input device that produced
/// it. Device indices are assigned in connection order; the dual-pair
/// allocation policy keys its pairs off them.
#[derive(Debug, Clone, Copy)]
pub struct DeviceEvent {
    pub device: usize,
    pub kind: MidiEventKind,
}

/// The event kinds the coordinator consumes. Anything else on the wire
/// is dropped at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

/// Information about an available MIDI port.
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// MIDI input manager holding one connection per physical device, all
/// funneling into a single channel polled by the run loop.
pub struct MidiInputManager {
    connections: Vec<MidiInputConnection<()>>,
    connected_port_names: Vec<String>,
    event_receiver: Receiver<DeviceEvent>,
    event_sender: Sender<DeviceEvent>,
}

impl MidiInputManager {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            connections: Vec::new(),
            connected_port_names: Vec::new(),
            event_receiver: rx,
            event_sender: tx,
        }
    }

    /// List the MIDI input ports currently visible to the system.
    pub fn available_ports() -> Vec<MidiPortInfo> {
        let Ok(midi_in) = MidiInput::new("chorale") else {
            return Vec::new();
        };
        let ports = midi_in.ports();
        ports
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .ok()
                    .map(|name| MidiPortInfo { index, name })
            })
            .collect()
    }

    /// Connect to a port by system index. Returns the device index
    /// assigned to this connection.
    pub fn connect(&mut self, port_index: usize) -> Result<usize, String> {
        let midi_in = MidiInput::new("chorale").map_err(|e| e.to_string())?;
        let ports = midi_in.ports();

        if port_index >= ports.len() {
            return Err(format!("Invalid port index: {}", port_index));
        }

        let port = &ports[port_index];
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let device = self.connections.len();
        let tx = self.event_sender.clone();
        let connection = midi_in
            .connect(
                port,
                "chorale-input",
                move |_timestamp, message, _| {
                    if let Some(kind) = parse_midi_message(message) {
                        let _ = tx.send(DeviceEvent { device, kind });
                    }
                },
                (),
            )
            .map_err(|e| e.to_string())?;

        self.connections.push(connection);
        self.connected_port_names.push(port_name.clone());
        log::info!(target: "midi", "connected device {} to '{}'", device, port_name);
        Ok(device)
    }

    /// Auto-connect up to `max_devices` of the first available ports.
    /// Returns how many connected.
    pub fn connect_all(&mut self, max_devices: usize) -> usize {
        let ports = Self::available_ports();
        for info in ports.iter().take(max_devices) {
            if let Err(e) = self.connect(info.index) {
                log::warn!(target: "midi", "could not connect '{}': {}", info.name, e);
            }
        }
        self.connections.len()
    }

    pub fn device_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connected_port_names(&self) -> &[String] {
        &self.connected_port_names
    }

    /// Poll for pending MIDI events (non-blocking).
    pub fn poll_events(&self) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_receiver.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn disconnect_all(&mut self) {
        for connection in self.connections.drain(..) {
            connection.close();
        }
        self.connected_port_names.clear();
    }
}

impl Default for MidiInputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

/// Parse a raw MIDI message into the kinds the coordinator handles.
/// Unrecognized status bytes and runt messages yield `None` and are
/// dropped by the caller.
pub fn parse_midi_message(data: &[u8]) -> Option<MidiEventKind> {
    if data.is_empty() {
        return None;
    }

    let status = data[0];
    let channel = status & 0x0F;
    let message_type = status & 0xF0;

    match message_type {
        0x80 => {
            if data.len() >= 3 {
                Some(MidiEventKind::NoteOff {
                    channel,
                    note: data[1],
                })
            } else {
                None
            }
        }
        0x90 => {
            // Note On with velocity 0 is a Note Off
            if data.len() >= 3 {
                let velocity = data[2];
                if velocity == 0 {
                    Some(MidiEventKind::NoteOff {
                        channel,
                        note: data[1],
                    })
                } else {
                    Some(MidiEventKind::NoteOn {
                        channel,
                        note: data[1],
                        velocity,
                    })
                }
            } else {
                None
            }
        }
        0xB0 => {
            if data.len() >= 3 {
                Some(MidiEventKind::ControlChange {
                    channel,
                    controller: data[1],
                    value: data[2],
                })
            } else {
                None
            }
        }
        _ => None,
    }
}
