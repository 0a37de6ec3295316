use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::allocator::AllocationPolicy;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    performance: PerformanceConfig,
    #[serde(default)]
    network: NetworkConfig,
}

#[derive(Deserialize, Default)]
struct PerformanceConfig {
    voices: Option<usize>,
    policy: Option<String>,
    tick_ms: Option<u64>,
    tuning_a4: Option<f64>,
    trigger_channel: Option<u8>,
    midi_devices: Option<usize>,
}

#[derive(Deserialize, Default)]
struct NetworkConfig {
    synth_addr: Option<String>,
    report_addr: Option<String>,
    listen_port: Option<u16>,
}

pub struct Config {
    performance: PerformanceConfig,
    network: NetworkConfig,
}

impl Config {
    pub fn load() -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => {
                            merge_performance(&mut base.performance, user.performance);
                            merge_network(&mut base.network, user.network);
                        }
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config {
            performance: base.performance,
            network: base.network,
        }
    }

    /// Number of reference voice slots (clamped to 1..=16).
    pub fn voices(&self) -> usize {
        self.performance.voices.unwrap_or(4).clamp(1, 16)
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.performance
            .policy
            .as_deref()
            .and_then(parse_policy)
            .unwrap_or_default()
    }

    /// Realtime scoring period (clamped to 10ms..=10s).
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.performance.tick_ms.unwrap_or(100).clamp(10, 10_000))
    }

    pub fn tuning_a4(&self) -> f64 {
        self.performance.tuning_a4.unwrap_or(440.0)
    }

    /// MIDI channel carrying measure-boundary and conductor-cue events.
    pub fn trigger_channel(&self) -> u8 {
        self.performance.trigger_channel.unwrap_or(4) & 0x0F
    }

    /// How many MIDI input devices to auto-connect.
    pub fn midi_devices(&self) -> usize {
        self.performance.midi_devices.unwrap_or(2).clamp(1, 8)
    }

    pub fn synth_addr(&self) -> String {
        self.network
            .synth_addr
            .clone()
            .unwrap_or_else(|| "127.0.0.1:57120".to_string())
    }

    pub fn report_addr(&self) -> String {
        self.network
            .report_addr
            .clone()
            .unwrap_or_else(|| "127.0.0.1:5901".to_string())
    }

    pub fn listen_port(&self) -> u16 {
        self.network.listen_port.unwrap_or(5900)
    }

    /// Apply command-line overrides on top of the file configuration.
    pub fn override_policy(&mut self, policy: &str) {
        if parse_policy(policy).is_some() {
            self.performance.policy = Some(policy.to_string());
        } else {
            log::warn!(target: "config", "unknown policy '{}', keeping configured value", policy);
        }
    }

    pub fn override_voices(&mut self, voices: usize) {
        self.performance.voices = Some(voices);
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chorale").join("config.toml"))
}

fn merge_performance(base: &mut PerformanceConfig, user: PerformanceConfig) {
    if user.voices.is_some() {
        base.voices = user.voices;
    }
    if user.policy.is_some() {
        base.policy = user.policy;
    }
    if user.tick_ms.is_some() {
        base.tick_ms = user.tick_ms;
    }
    if user.tuning_a4.is_some() {
        base.tuning_a4 = user.tuning_a4;
    }
    if user.trigger_channel.is_some() {
        base.trigger_channel = user.trigger_channel;
    }
    if user.midi_devices.is_some() {
        base.midi_devices = user.midi_devices;
    }
}

fn merge_network(base: &mut NetworkConfig, user: NetworkConfig) {
    if user.synth_addr.is_some() {
        base.synth_addr = user.synth_addr;
    }
    if user.report_addr.is_some() {
        base.report_addr = user.report_addr;
    }
    if user.listen_port.is_some() {
        base.listen_port = user.listen_port;
    }
}

pub fn parse_policy(s: &str) -> Option<AllocationPolicy> {
    match s.to_lowercase().as_str() {
        "ordered" => Some(AllocationPolicy::Ordered),
        "dual-pair" | "dual_pair" | "pairs" => Some(AllocationPolicy::DualPair),
        "random" => Some(AllocationPolicy::Random),
        _ => None,
    }
}
