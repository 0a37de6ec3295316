use std::fs::File;
use std::time::Duration;

use crossbeam_channel::{select, tick};

use chorale_core::allocator::VoiceAllocator;
use chorale_core::config::Config;
use chorale_core::midi::MidiInputManager;
use chorale_core::router::EventRouter;
use chorale_core::scorer::IntonationScorer;
use chorale_core::synth::SynthClient;
use chorale_net::{NetListener, ReportSender};

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("chorale")
        .join("chorale.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path).unwrap_or_else(|_| {
        File::create("/tmp/chorale.log").expect("Cannot create log file")
    });

    WriteLogger::init(log_level, simplelog::Config::default(), log_file)
        .expect("Failed to initialize logger");

    log::info!("chorale starting (log level: {:?})", log_level);
}

/// Value of a `--flag value` pair, if present.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let mut config = Config::load();
    if let Some(policy) = flag_value(&args, "--policy") {
        config.override_policy(&policy);
    }
    if let Some(voices) = flag_value(&args, "--voices").and_then(|v| v.parse().ok()) {
        config.override_voices(voices);
    }
    let synth_addr = flag_value(&args, "--synth").unwrap_or_else(|| config.synth_addr());
    let report_addr = flag_value(&args, "--controller").unwrap_or_else(|| config.report_addr());
    let listen_port = flag_value(&args, "--listen")
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| config.listen_port());

    let voices = config.voices();
    log::info!(
        "{} voices, {:?} policy, tick {:?}",
        voices,
        config.policy(),
        config.tick_period()
    );

    let router = EventRouter::new(
        VoiceAllocator::new(voices, config.policy()),
        IntonationScorer::new(voices),
        config.trigger_channel(),
        config.tuning_a4(),
    );

    let synth = SynthClient::new(&synth_addr, config.tuning_a4())?;
    let reports = ReportSender::new(&report_addr)?;
    let listener = NetListener::bind(
        &format!("0.0.0.0:{}", listen_port),
        voices,
        config.tuning_a4(),
    )?;
    let monitor = listener.monitor();

    let mut midi_input = MidiInputManager::new();
    let connected = midi_input.connect_all(config.midi_devices());
    if connected == 0 {
        log::warn!("no MIDI input devices available; listening for network events only");
    } else {
        for name in midi_input.connected_port_names() {
            log::info!("MIDI input: {}", name);
        }
    }

    let ticker = tick(config.tick_period());
    loop {
        select! {
            recv(ticker) -> _ => {
                router.tick(&monitor, &reports);
            }
            default(Duration::from_millis(2)) => {}
        }

        for event in midi_input.poll_events() {
            router.handle_midi(&event, &synth, &reports);
        }

        while let Some(ids) = listener.try_recv_roster() {
            router.handle_roster(ids, &synth, &reports);
        }
    }
}
