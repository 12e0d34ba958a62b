pub mod dispatcher;
pub mod learn;
pub mod output;

pub use dispatcher::{MasterBindings, MidiDispatcher, Routed};
pub use learn::{LearnDone, LearnSession};
pub use output::{MidiOutputManager, MidiOutputThread};

use crossbeam_channel::{unbounded, Receiver};
use midir::{MidiInput, MidiInputConnection};
use ostinato_types::MidiEvent;

const CLIENT_NAME: &str = "ostinato";

/// Information about an available MIDI port
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// Index of the first port whose name contains `name`, ignoring case.
pub fn find_port(ports: &[MidiPortInfo], name: &str) -> Option<usize> {
    let needle = name.to_lowercase();
    ports
        .iter()
        .find(|p| p.name.to_lowercase().contains(&needle))
        .map(|p| p.index)
}

/// MIDI input manager
pub struct MidiInputManager {
    midi_in: Option<MidiInput>,
    connection: Option<MidiInputConnection<()>>,
    event_receiver: Option<Receiver<MidiEvent>>,
    connected_port_name: Option<String>,
    available_ports: Vec<MidiPortInfo>,
}

impl MidiInputManager {
    pub fn new() -> Self {
        let midi_in = MidiInput::new(CLIENT_NAME).ok();
        Self {
            midi_in,
            connection: None,
            event_receiver: None,
            connected_port_name: None,
            available_ports: Vec::new(),
        }
    }

    /// Refresh the list of available MIDI input ports
    pub fn refresh_ports(&mut self) {
        self.available_ports.clear();

        if let Some(ref midi_in) = self.midi_in {
            let ports = midi_in.ports();
            for (index, port) in ports.iter().enumerate() {
                if let Ok(name) = midi_in.port_name(port) {
                    self.available_ports.push(MidiPortInfo { index, name });
                }
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

    /// Connect to a MIDI input port by index
    pub fn connect(&mut self, port_index: usize) -> Result<(), String> {
        self.disconnect();

        // connecting consumes the MidiInput
        let midi_in = MidiInput::new(CLIENT_NAME)
            .map_err(|e| format!("Failed to open MIDI input: {}", e))?;
        let ports = midi_in.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| format!("Invalid port index: {}", port_index))?;
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let (tx, rx) = unbounded();
        self.event_receiver = Some(rx);

        let connection = midi_in
            .connect(
                port,
                "ostinato-input",
                move |_timestamp, message, _| {
                    if let Some(event) = parse_midi_message(message) {
                        let _ = tx.send(event);
                    }
                },
                (),
            )
            .map_err(|e| format!("Failed to connect MIDI input: {}", e))?;

        log::info!(target: "midi", "input connected to {}", port_name);
        self.connection = Some(connection);
        self.connected_port_name = Some(port_name);

        // Recreate MidiInput for future port listing
        self.midi_in = MidiInput::new(CLIENT_NAME).ok();

        Ok(())
    }

    /// Connect to the first port whose name contains `name`.
    pub fn connect_by_name(&mut self, name: &str) -> Result<(), String> {
        self.refresh_ports();
        let index = find_port(&self.available_ports, name)
            .ok_or_else(|| format!("No MIDI input port matching '{}'", name))?;
        self.connect(index)
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            log::info!(target: "midi", "input disconnected");
        }
        self.event_receiver = None;
        self.connected_port_name = None;
    }

    /// Receiving end for a dispatch thread. `None` until connected.
    pub fn receiver(&self) -> Option<Receiver<MidiEvent>> {
        self.event_receiver.clone()
    }

    /// Poll for pending MIDI events (non-blocking)
    pub fn poll_events(&self) -> Vec<MidiEvent> {
        match self.event_receiver {
            Some(ref rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl Default for MidiInputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Keep three-byte channel voice messages; drop everything else.
fn parse_midi_message(data: &[u8]) -> Option<MidiEvent> {
    let status = *data.first()?;
    if status >= 0xF0 {
        if status < 0xF8 {
            log::debug!(target: "midi", "dropped system message {:02X?}", data);
        }
        return None;
    }
    if status < 0x80 || data.len() < 3 {
        log::debug!(target: "midi", "dropped short or malformed message {:02X?}", data);
        return None;
    }
    MidiEvent::from_slice(data)
}
