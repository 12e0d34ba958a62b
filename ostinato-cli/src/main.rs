mod commands;

use std::fs::File;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ostinato_audio::{AudioStream, Engine};
use ostinato_core::config::{user_config_path, Config};
use ostinato_core::dispatch::StatusLevel;
use ostinato_core::midi::{MidiInputManager, MidiOutputManager, MidiOutputThread};
use ostinato_core::EngineContext;

use commands::{parse_line, Line, HELP};

const TELEMETRY_INTERVAL: Duration = Duration::from_secs(10);

struct Args {
    verbose: bool,
    config: Option<PathBuf>,
    no_audio: bool,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args {
        verbose: false,
        config: None,
        no_audio: false,
    };
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--verbose" | "-v" => parsed.verbose = true,
            "--no-audio" => parsed.no_audio = true,
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            other => return Err(format!("Unknown argument '{}'", other)),
        }
    }
    Ok(parsed)
}

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ostinato")
        .join("ostinato.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let installed = match File::create(&log_path) {
        Ok(file) => WriteLogger::init(log_level, Config::default(), file).is_ok(),
        Err(_) => false,
    };
    if !installed && SimpleLogger::init(log_level, Config::default()).is_err() {
        eprintln!("could not initialise logging");
    }

    log::info!("ostinato starting (log level: {:?})", log_level);
}

/// Periodically log audio telemetry and anything the audio thread dropped.
fn spawn_telemetry(engine: Arc<Engine>, stop: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("ostinato-telemetry".into())
        .spawn(move || {
            let mut waited = Duration::ZERO;
            let mut last = (0, 0, 0, 0, 0);
            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(250));
                waited += Duration::from_millis(250);
                if waited < TELEMETRY_INTERVAL {
                    continue;
                }
                waited = Duration::ZERO;
                let t = engine.controls.telemetry();
                let dropped = engine.midi_out.dropped();
                let rec_dropped = engine.rec_queue.dropped();
                let actions_dropped = engine.controls.dropped_actions();
                log::debug!(
                    target: "telemetry",
                    "callback avg={}us p95={}us max={}us",
                    t.avg_us,
                    t.p95_us,
                    t.max_us
                );
                let now = (t.overruns, t.lock_misses, dropped, rec_dropped, actions_dropped);
                if now != last {
                    log::warn!(
                        target: "telemetry",
                        "overruns={} lock_misses={} midi_out_dropped={} rec_dropped={} actions_dropped={}",
                        t.overruns,
                        t.lock_misses,
                        dropped,
                        rec_dropped,
                        actions_dropped
                    );
                    last = now;
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("Failed to spawn telemetry thread: {}", e);
    }
}

/// Print learn completions as they arrive from the MIDI thread.
fn spawn_learn_reporter(ctx: &Arc<EngineContext>) {
    let done = ctx.dispatcher().learn_done();
    let spawned = std::thread::Builder::new()
        .name("ostinato-learn".into())
        .spawn(move || {
            for d in done.iter() {
                println!("learned {:?} = 0x{:08X}", d.target, d.value);
            }
        });
    if let Err(e) = spawned {
        log::warn!("Failed to spawn learn reporter: {}", e);
    }
}

fn print_status(ctx: &EngineContext) {
    let engine = ctx.engine();
    let clock = &engine.clock;
    println!(
        "{} | bpm {} | {} beats / {} bars | quantize {} | frame {}/{}{}{}",
        if clock.is_running() { "playing" } else { "stopped" },
        clock.bpm(),
        clock.beats(),
        clock.bars(),
        clock.quantize(),
        clock.current_frame(),
        clock.total_frames(),
        if engine.controls.action_rec() { " | REC" } else { "" },
        if engine.controls.input_recording() { " | INPUT REC" } else { "" },
    );
    for info in engine.channel_infos() {
        println!(
            "  [{}] {:<12} {:?} {:<8} {:<14} vol {:.2}{}{}{}{}",
            info.id,
            info.name,
            info.kind,
            info.status.name(),
            info.mode.map_or("-", |m| m.name()),
            info.volume,
            if info.mute { " M" } else { "" },
            if info.solo { " S" } else { "" },
            if info.armed { " A" } else { "" },
            if info.has_actions { " *" } else { "" },
        );
    }
    if let Some(target) = ctx.dispatcher().learn_target() {
        println!("  waiting to learn {:?}", target);
    }
}

fn print_ports(midi_in: &mut MidiInputManager) {
    midi_in.refresh_ports();
    println!("MIDI inputs:");
    for p in midi_in.list_ports() {
        println!("  {}: {}", p.index, p.name);
    }
    let mut midi_out = MidiOutputManager::new();
    midi_out.refresh_ports();
    println!("MIDI outputs:");
    for p in midi_out.list_ports() {
        println!("  {}: {}", p.index, p.name);
    }
    let (outputs, inputs) = ostinato_audio::stream::list_devices();
    println!("audio outputs: {}", outputs.join(", "));
    println!("audio inputs: {}", inputs.join(", "));
}

/// Run one line. Returns false when the loop should end.
fn handle_line(line: &str, ctx: &EngineContext, midi_in: &mut MidiInputManager) -> bool {
    let parsed = match parse_line(line) {
        Ok(Some(l)) => l,
        Ok(None) => return true,
        Err(e) => {
            println!("error: {}", e);
            return true;
        }
    };
    match parsed {
        Line::Command(command) => {
            let result = ctx.dispatch(command);
            for s in &result.status {
                match s.level {
                    StatusLevel::Info => println!("{}", s.message),
                    StatusLevel::Error => println!("error: {}", s.message),
                }
            }
            if let Some(id) = result.channel {
                println!("channel {}", id);
            }
        }
        Line::Learn(target) => {
            ctx.dispatcher().start_learn(target);
            println!("waiting for MIDI...");
        }
        Line::LearnCancel => ctx.dispatcher().stop_learn(),
        Line::LearnClear => match ctx.dispatcher().clear_learn(ctx.engine()) {
            Some(_) => {}
            None => println!("no learn in progress"),
        },
        Line::Ports => print_ports(midi_in),
        Line::Status => print_status(ctx),
        Line::Help => println!("{}", HELP),
        Line::Quit => return false,
    }
    true
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();
    let args = match parse_args(&argv) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: ostinato [--verbose] [--config PATH] [--no-audio]");
            return ExitCode::FAILURE;
        }
    };
    init_logging(args.verbose);

    let config = Config::load_from(args.config.or_else(user_config_path).as_deref());
    let ctx = Arc::new(EngineContext::new(&config));

    let _audio = if args.no_audio {
        None
    } else {
        match AudioStream::start(ctx.mixer(), &config.stream_options()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                log::error!("{}", e);
                eprintln!("audio disabled: {}", e);
                None
            }
        }
    };

    let mut midi_in = MidiInputManager::new();
    if let Some(port) = config.midi_input_port() {
        match midi_in.connect_by_name(port) {
            Ok(()) => {
                if let Some(rx) = midi_in.receiver() {
                    if let Err(e) = ctx.spawn_midi_dispatch(rx) {
                        log::error!("{}", e);
                    }
                }
            }
            Err(e) => {
                log::warn!("{}", e);
                eprintln!("MIDI input disabled: {}", e);
            }
        }
    }

    let mut _midi_out: Option<MidiOutputThread> = None;
    if let Some(port) = config.midi_output_port() {
        let mut output = MidiOutputManager::new();
        let started = output
            .connect_by_name(port)
            .and_then(|()| MidiOutputThread::spawn(Arc::clone(ctx.engine()), output));
        match started {
            Ok(thread) => _midi_out = Some(thread),
            Err(e) => {
                log::warn!("{}", e);
                eprintln!("MIDI output disabled: {}", e);
            }
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    if let Err(e) = ctx.spawn_recorder_sync(Arc::clone(&stop)) {
        log::error!("{}", e);
    }
    spawn_telemetry(Arc::clone(ctx.engine()), Arc::clone(&stop));
    spawn_learn_reporter(&ctx);

    println!("ostinato ready; type 'help' for commands");
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if !handle_line(&line, &ctx, &mut midi_in) {
                    break;
                }
            }
            Err(e) => {
                log::error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    stop.store(true, Ordering::Relaxed);
    midi_in.disconnect();
    ctx.engine().stop_transport();
    log::info!("ostinato exiting");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("ostinato")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let a = parse_args(&argv(&["--verbose", "--config", "/tmp/o.toml", "--no-audio"])).unwrap();
        assert!(a.verbose);
        assert!(a.no_audio);
        assert_eq!(a.config, Some(PathBuf::from("/tmp/o.toml")));
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&argv(&["--config"])).is_err());
        assert!(parse_args(&argv(&["--loud"])).is_err());
    }

    #[test]
    fn lines_drive_the_engine() {
        let ctx = EngineContext::with_settings(ostinato_audio::EngineSettings::default());
        let mut midi_in = MidiInputManager::new();
        assert!(handle_line("add sample", &ctx, &mut midi_in));
        assert!(handle_line("mode 1 loop-basic", &ctx, &mut midi_in));
        assert!(handle_line("bpm 90", &ctx, &mut midi_in));
        assert_eq!(ctx.engine().clock.bpm(), 90.0);
        assert_eq!(
            ctx.engine().channel_infos()[0].mode,
            Some(ostinato_types::ChannelMode::LoopBasic)
        );
        assert!(handle_line("learn-master metronome", &ctx, &mut midi_in));
        assert!(ctx.dispatcher().learn_target().is_some());
        assert!(!handle_line("quit", &ctx, &mut midi_in));
    }
}
