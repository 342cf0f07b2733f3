//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Seeded holding-register windows served by the simulator."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use bytes::Bytes;

/// One contiguous block of holding registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWindow {
    pub start: u16,
    words: Vec<u16>,
}

impl RegisterWindow {
    pub fn new(start: u16, words: Vec<u16>) -> Self {
        Self { start, words }
    }

    pub fn len(&self) -> u16 {
        u16::try_from(self.words.len()).unwrap_or(u16::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, address: u16) -> bool {
        address >= self.start && usize::from(address - self.start) < self.words.len()
    }

    /// Whether `quantity` registers from `address` fit inside this window.
    pub fn covers(&self, address: u16, quantity: u16) -> bool {
        quantity > 0
            && self.contains(address)
            && usize::from(address - self.start) + usize::from(quantity) <= self.words.len()
    }

    /// Big-endian bytes for `quantity` registers starting at `address`.
    /// Callers check [`covers`](Self::covers) first.
    pub fn slice(&self, address: u16, quantity: u16) -> Bytes {
        let from = usize::from(address - self.start);
        let to = from + usize::from(quantity);
        let mut out = Vec::with_capacity(usize::from(quantity) * 2);
        for word in &self.words[from..to] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        Bytes::from(out)
    }

    pub fn get(&self, address: u16) -> Option<u16> {
        if self.contains(address) {
            Some(self.words[usize::from(address - self.start)])
        } else {
            None
        }
    }

    pub fn set(&mut self, address: u16, raw: u16) -> bool {
        if !self.contains(address) {
            return false;
        }
        self.words[usize::from(address - self.start)] = raw;
        true
    }
}

/// Line voltages V12..V31 and phase currents I1..I3.
pub const INSTANT_START: u16 = 257;
pub const INSTANT_DEFAULTS: [u16; 6] = [6888, 6890, 6853, 3457, 3524, 3469];

/// Power factors L1..L3, the unused register 275, then real, reactive and
/// apparent power.
pub const POWER_START: u16 = 272;
pub const POWER_DEFAULTS: [u16; 7] = [9989, 9989, 9984, 0, 6034, 6036, 1160];

/// Harmonic distortion.
pub const THD_START: u16 = 296;
pub const THD_DEFAULTS: [u16; 6] = [17, 19, 16, 30, 39, 38];

pub fn seeded_windows() -> Vec<RegisterWindow> {
    vec![
        RegisterWindow::new(INSTANT_START, INSTANT_DEFAULTS.to_vec()),
        RegisterWindow::new(POWER_START, POWER_DEFAULTS.to_vec()),
        RegisterWindow::new(THD_START, THD_DEFAULTS.to_vec()),
    ]
}
