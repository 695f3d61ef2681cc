use log::{info, warn};

use lora_core::LinkResult;

/// Send one AT command and collect whatever the module answered after `wait_ms`.
pub trait AtCommand {
    fn command(&mut self, cmd: &str, wait_ms: u64) -> LinkResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Transmitter,
    Receiver,
}

impl Role {
    /// Pause between setup commands.
    pub fn pacing_ms(&self) -> u64 {
        match self {
            Role::Transmitter => 800,
            Role::Receiver => 1000,
        }
    }
}

const STOP_RECEIVE: &str = "AT+PRECV=0";
/// Receive continuously until the next command.
const CONTINUOUS_RECEIVE: &str = "AT+PRECV=65534";
const RECEIVE_SWITCH_MS: u64 = 1000;

/// P2P radio parameters. Both ends must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioSettings {
    pub frequency_hz: u32,
    pub spreading_factor: u8,
    pub bandwidth_khz: u16,
    /// 0 = 4/5, 1 = 4/6 ... in the module's numbering.
    pub coding_rate: u8,
    pub preamble_len: u16,
    pub tx_power_dbm: u8,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            frequency_hz: 868_000_000,
            spreading_factor: 7,
            bandwidth_khz: 125,
            coding_rate: 1,
            preamble_len: 8,
            tx_power_dbm: 20,
        }
    }
}

impl RadioSettings {
    pub fn commands(&self) -> Vec<String> {
        vec![
            "AT+NWM=0".to_string(),
            format!("AT+PFREQ={}", self.frequency_hz),
            format!("AT+PSF={}", self.spreading_factor),
            format!("AT+PBW={}", self.bandwidth_khz),
            format!("AT+PCR={}", self.coding_rate),
            format!("AT+PPL={}", self.preamble_len),
            format!("AT+PTP={}", self.tx_power_dbm),
        ]
    }
}

/// `OK`, or silence, counts as accepted.
pub fn is_accepted(response: &str) -> bool {
    let response = response.trim();
    response.is_empty() || response.contains("OK")
}

/// Stops receive mode, applies `settings` and, for the receiver,
/// re-enables continuous receive. Returns the commands the module refused.
pub fn configure(radio: &mut dyn AtCommand, settings: &RadioSettings, role: Role) -> LinkResult<Vec<String>> {
    info!(">>> Configuring RAK3172 as {:?}", role);
    let mut refused = Vec::new();

    let response = radio.command(STOP_RECEIVE, RECEIVE_SWITCH_MS)?;
    if !is_accepted(&response) {
        warn!("{} -> {}", STOP_RECEIVE, response);
    }

    for cmd in settings.commands() {
        let response = radio.command(&cmd, role.pacing_ms())?;
        if is_accepted(&response) {
            info!("{} ok", cmd);
        } else {
            warn!("{} -> {}", cmd, response);
            refused.push(cmd);
        }
    }

    if role == Role::Receiver {
        let response = radio.command(CONTINUOUS_RECEIVE, RECEIVE_SWITCH_MS)?;
        if !is_accepted(&response) {
            warn!("{} -> {}", CONTINUOUS_RECEIVE, response);
            refused.push(CONTINUOUS_RECEIVE.to_string());
        }
        info!("Continuous receive enabled");
    }
    Ok(refused)
}

pub fn configure_transmitter(radio: &mut dyn AtCommand, settings: &RadioSettings) -> LinkResult<Vec<String>> {
    configure(radio, settings, Role::Transmitter)
}

pub fn configure_receiver(radio: &mut dyn AtCommand, settings: &RadioSettings) -> LinkResult<Vec<String>> {
    configure(radio, settings, Role::Receiver)
}
