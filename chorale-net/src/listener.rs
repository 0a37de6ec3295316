//! Inbound OSC listener: roster updates and pitch-detector estimates.
//!
//! A background thread decodes datagrams from the controller. Roster
//! updates are queued on a channel for the run loop; pitch estimates go
//! into the lock-free `PitchMonitor` the scorer samples on every tick.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use rosc::{OscPacket, OscType};

use chorale_core::scorer::PitchSource;
use chorale_types::pitch::hz_to_note_a4;
use chorale_types::PerformerId;

/// Latest pitch-detector estimate per slot, shared between the recv
/// thread and the scoring tick. Values are f32 bits in atomics so reads
/// never block the listener; 0.0 means silent/untracked.
#[derive(Clone)]
pub struct PitchMonitor {
    slots: Arc<Vec<AtomicU32>>,
    tuning_a4: f64,
}

impl PitchMonitor {
    pub fn new(voices: usize, tuning_a4: f64) -> Self {
        Self {
            slots: Arc::new((0..voices).map(|_| AtomicU32::new(0)).collect()),
            tuning_a4,
        }
    }

    pub fn store_hz(&self, slot: usize, hz: f32) {
        if let Some(cell) = self.slots.get(slot) {
            cell.store(hz.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn hz(&self, slot: usize) -> f32 {
        self.slots
            .get(slot)
            .map(|cell| f32::from_bits(cell.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }
}

impl PitchSource for PitchMonitor {
    fn detected_note(&self, slot: usize) -> Option<f64> {
        let hz = self.hz(slot);
        if hz > 0.0 {
            Some(hz_to_note_a4(f64::from(hz), self.tuning_a4))
        } else {
            None
        }
    }
}

pub struct NetListener {
    local_addr: SocketAddr,
    roster_rx: Receiver<Vec<PerformerId>>,
    monitor: PitchMonitor,
    shutdown: Arc<AtomicBool>,
    recv_thread: Option<JoinHandle<()>>,
}

impl NetListener {
    pub fn bind(addr: &str, voices: usize, tuning_a4: f64) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        let local_addr = socket.local_addr()?;
        socket.set_read_timeout(Some(Duration::from_millis(50)))?;

        let (roster_tx, roster_rx) = crossbeam_channel::unbounded();
        let monitor = PitchMonitor::new(voices, tuning_a4);
        let thread_monitor = monitor.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        // The 50ms read timeout bounds how long teardown waits for the
        // thread to notice the flag.
        let handle = thread::Builder::new()
            .name("net-listener".into())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                while !thread_shutdown.load(Ordering::Relaxed) {
                    match socket.recv(&mut buf) {
                        Ok(n) => {
                            if let Ok((_, packet)) = rosc::decoder::decode_udp(&buf[..n]) {
                                handle_packet(&packet, &roster_tx, &thread_monitor);
                            }
                        }
                        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                        Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                        Err(_) => break,
                    }
                }
            })?;

        Ok(Self {
            local_addr,
            roster_rx,
            monitor,
            shutdown,
            recv_thread: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Pending roster update, if any (non-blocking).
    pub fn try_recv_roster(&self) -> Option<Vec<PerformerId>> {
        self.roster_rx.try_recv().ok()
    }

    /// Handle to the shared pitch estimates, for the scoring tick.
    pub fn monitor(&self) -> PitchMonitor {
        self.monitor.clone()
    }
}

impl Drop for NetListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.recv_thread.take() {
            let _ = handle.join();
        }
    }
}

fn handle_packet(
    packet: &OscPacket,
    roster_tx: &Sender<Vec<PerformerId>>,
    monitor: &PitchMonitor,
) {
    match packet {
        OscPacket::Message(msg) => {
            if msg.addr == "/players" {
                let ids = parse_roster(&msg.args);
                let _ = roster_tx.send(ids);
            } else if msg.addr == "/pitch" && msg.args.len() >= 2 {
                let slot = match msg.args.first() {
                    Some(OscType::Int(v)) => *v as usize,
                    Some(OscType::Float(v)) => *v as usize,
                    _ => return,
                };
                let hz = match msg.args.get(1) {
                    Some(OscType::Float(v)) => *v,
                    Some(OscType::Double(v)) => *v as f32,
                    Some(OscType::Int(v)) => *v as f32,
                    _ => return,
                };
                monitor.store_hz(slot, hz);
            }
        }
        OscPacket::Bundle(bundle) => {
            for p in &bundle.content {
                handle_packet(p, roster_tx, monitor);
            }
        }
    }
}

/// Convert raw roster arguments into performer ids. Unparseable
/// arguments are dropped; sentinel filtering happens in the allocator.
fn parse_roster(args: &[OscType]) -> Vec<PerformerId> {
    args.iter()
        .filter_map(|arg| match arg {
            OscType::Int(v) => Some(PerformerId::Number(*v)),
            OscType::Long(v) => Some(PerformerId::Number(*v as i32)),
            OscType::Float(v) => Some(PerformerId::Number(*v as i32)),
            OscType::String(s) => Some(PerformerId::Name(s.clone())),
            _ => None,
        })
        .collect()
}
