//! MIDI output: a midir port plus the thread that drains the engine's
//! outbound queue into it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use midir::{MidiOutput, MidiOutputConnection};
use ostinato_audio::Engine;

use super::{find_port, MidiPortInfo, CLIENT_NAME};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct MidiOutputManager {
    connection: Option<MidiOutputConnection>,
    connected_port_name: Option<String>,
    available_ports: Vec<MidiPortInfo>,
}

impl MidiOutputManager {
    pub fn new() -> Self {
        Self {
            connection: None,
            connected_port_name: None,
            available_ports: Vec::new(),
        }
    }

    pub fn refresh_ports(&mut self) {
        self.available_ports.clear();
        let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) else {
            return;
        };
        for (index, port) in midi_out.ports().iter().enumerate() {
            if let Ok(name) = midi_out.port_name(port) {
                self.available_ports.push(MidiPortInfo { index, name });
            }
        }
    }

    pub fn list_ports(&self) -> &[MidiPortInfo] {
        &self.available_ports
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connected_port_name(&self) -> Option<&str> {
        self.connected_port_name.as_deref()
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), String> {
        self.disconnect();
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| format!("Failed to open MIDI output: {}", e))?;
        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| format!("Invalid port index: {}", port_index))?;
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());
        let connection = midi_out
            .connect(port, "ostinato-output")
            .map_err(|e| format!("Failed to connect MIDI output: {}", e))?;
        log::info!(target: "midi", "output connected to {}", port_name);
        self.connection = Some(connection);
        self.connected_port_name = Some(port_name);
        Ok(())
    }

    pub fn connect_by_name(&mut self, name: &str) -> Result<(), String> {
        self.refresh_ports();
        let index = find_port(&self.available_ports, name)
            .ok_or_else(|| format!("No MIDI output port matching '{}'", name))?;
        self.connect(index)
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            log::info!(target: "midi", "output disconnected");
        }
        self.connected_port_name = None;
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<(), String> {
        match self.connection.as_mut() {
            Some(conn) => conn
                .send(bytes)
                .map_err(|e| format!("Failed to send MIDI: {}", e)),
            None => Err("MIDI output not connected".to_string()),
        }
    }
}

impl Default for MidiOutputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiOutputManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The thread forwarding the engine's outbound queue to a port.
pub struct MidiOutputThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MidiOutputThread {
    /// Queue the midimap init commands, then forward everything the engine
    /// sends until [`stop`](Self::stop) is called.
    pub fn spawn(engine: Arc<Engine>, mut output: MidiOutputManager) -> Result<Self, String> {
        let stop = Arc::new(AtomicBool::new(false));
        let rx = engine.midi_out.receiver();
        engine.midimap.send_init(&engine.midi_out);

        let flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("ostinato-midi-out".into())
            .spawn(move || {
                let mut failures = 0u64;
                while !flag.load(Ordering::Relaxed) {
                    match rx.recv_timeout(POLL_INTERVAL) {
                        Ok(msg) => {
                            if let Err(e) = output.send(msg.as_bytes()) {
                                failures += 1;
                                // one line per burst is enough
                                if failures == 1 || failures % 1000 == 0 {
                                    log::warn!(target: "midi", "{} ({} failed)", e, failures);
                                }
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| format!("Failed to spawn MIDI output thread: {}", e))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!(target: "midi", "MIDI output thread panicked");
            }
        }
    }
}

impl Drop for MidiOutputThread {
    fn drop(&mut self) {
        self.stop();
    }
}
