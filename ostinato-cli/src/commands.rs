//! Parsing of the interactive command lines.

use std::path::PathBuf;

use ostinato_types::{
    ChannelCommand, ChannelId, ChannelKind, ChannelMode, ChannelParam, Command, IoCommand,
    KeyMods, LearnTarget, MasterParam, TransportCommand,
};

pub const HELP: &str = "\
commands:
  add sample|midi          del <ch>             load <ch> <wav>     save <ch> <wav>
  press <ch>               release <ch>         kill <ch>
  mute <ch>                solo <ch>            arm <ch>
  mode <ch> <mode>         vol <ch> <0..1>
  play                     rewind               bpm <n>
  beats <b> <bars> [expand]                     quantize <0..8>
  rec                      inrec                metro
  learn <ch> <param>       learn-master <param> learn-cancel        learn-clear
  ports                    status               help                quit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Command(Command),
    Learn(LearnTarget),
    LearnCancel,
    LearnClear,
    Ports,
    Status,
    Help,
    Quit,
}

impl From<Command> for Line {
    fn from(c: Command) -> Self {
        Line::Command(c)
    }
}

/// Parse one line. Blank lines and `#` comments give `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Line>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let argc = |n: usize| -> Result<(), String> {
        if args.len() < n {
            Err(format!("'{}' needs {} argument(s); try 'help'", verb, n))
        } else {
            Ok(())
        }
    };

    let parsed: Line = match verb {
        "add" => {
            argc(1)?;
            let kind = match args[0] {
                "sample" => ChannelKind::Sample,
                "midi" => ChannelKind::Midi,
                other => return Err(format!("Unknown channel kind '{}'", other)),
            };
            Command::from(ChannelCommand::Add(kind)).into()
        }
        "del" => {
            argc(1)?;
            Command::from(ChannelCommand::Delete(channel(args[0])?)).into()
        }
        "load" | "save" => {
            argc(2)?;
            let channel = channel(args[0])?;
            // paths may contain spaces
            let path = PathBuf::from(args[1..].join(" "));
            let cmd = if verb == "load" {
                ChannelCommand::LoadWave { channel, path }
            } else {
                ChannelCommand::SaveWave { channel, path }
            };
            Command::from(cmd).into()
        }
        "press" => {
            argc(1)?;
            Command::from(IoCommand::KeyPress {
                channel: channel(args[0])?,
                mods: KeyMods::NONE,
                velocity: 127,
            })
            .into()
        }
        "release" => {
            argc(1)?;
            Command::from(IoCommand::KeyRelease {
                channel: channel(args[0])?,
                mods: KeyMods::NONE,
            })
            .into()
        }
        "kill" => {
            argc(1)?;
            Command::from(IoCommand::Kill(channel(args[0])?)).into()
        }
        "mute" => {
            argc(1)?;
            Command::from(ChannelCommand::ToggleMute(channel(args[0])?)).into()
        }
        "solo" => {
            argc(1)?;
            Command::from(ChannelCommand::ToggleSolo(channel(args[0])?)).into()
        }
        "arm" => {
            argc(1)?;
            Command::from(ChannelCommand::ToggleArm(channel(args[0])?)).into()
        }
        "mode" => {
            argc(2)?;
            let mode = ChannelMode::parse(&dashes(args[1]))
                .ok_or_else(|| format!("Unknown mode '{}'", args[1]))?;
            Command::from(ChannelCommand::SetMode {
                channel: channel(args[0])?,
                mode,
            })
            .into()
        }
        "vol" => {
            argc(2)?;
            Command::from(ChannelCommand::SetVolume {
                channel: channel(args[0])?,
                value: number(args[1])?,
            })
            .into()
        }
        "play" => Command::from(TransportCommand::StartStop).into(),
        "rewind" => Command::from(TransportCommand::Rewind).into(),
        "bpm" => {
            argc(1)?;
            Command::from(TransportCommand::SetBpm(number(args[0])?)).into()
        }
        "beats" => {
            argc(2)?;
            Command::from(TransportCommand::SetBeats {
                beats: number(args[0])?,
                bars: number(args[1])?,
                expand: args.get(2) == Some(&"expand"),
            })
            .into()
        }
        "quantize" => {
            argc(1)?;
            Command::from(TransportCommand::SetQuantize(number(args[0])?)).into()
        }
        "rec" => Command::from(IoCommand::ToggleActionRec).into(),
        "inrec" => Command::from(IoCommand::ToggleInputRec).into(),
        "metro" => Command::from(TransportCommand::ToggleMetronome).into(),
        "learn" => {
            argc(2)?;
            let param = ChannelParam::parse(&dashes(args[1]))
                .ok_or_else(|| format!("Unknown channel control '{}'", args[1]))?;
            Line::Learn(LearnTarget::Channel {
                channel: channel(args[0])?,
                param,
            })
        }
        "learn-master" => {
            argc(1)?;
            let param = MasterParam::parse(&dashes(args[0]))
                .ok_or_else(|| format!("Unknown master control '{}'", args[0]))?;
            Line::Learn(LearnTarget::Master(param))
        }
        "learn-cancel" => Line::LearnCancel,
        "learn-clear" => Line::LearnClear,
        "ports" => Line::Ports,
        "status" => Line::Status,
        "help" | "?" => Line::Help,
        "quit" | "exit" => Line::Quit,
        other => return Err(format!("Unknown command '{}'; try 'help'", other)),
    };
    Ok(Some(parsed))
}

fn channel(s: &str) -> Result<ChannelId, String> {
    s.parse::<u32>()
        .map(ChannelId::new)
        .map_err(|_| format!("'{}' is not a channel number", s))
}

/// `loop-once` and `loop_once` both name the same mode.
fn dashes(s: &str) -> String {
    s.replace('-', "_")
}

fn number<T: std::str::FromStr>(s: &str) -> Result<T, String> {
    s.parse().map_err(|_| format!("'{}' is not a valid number", s))
}
