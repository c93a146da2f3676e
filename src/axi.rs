//! AXI4 channel payloads and the wire bundle between master and device.

use std::fmt;

use crate::signal::Signal;
use crate::sim::Sim;

/// Response status, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Resp {
    #[default]
    Okay = 0,
    ExOkay = 1,
    SlvErr = 2,
    DecErr = 3,
}

impl Resp {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Resp::Okay,
            1 => Resp::ExOkay,
            2 => Resp::SlvErr,
            _ => Resp::DecErr,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Resp::Okay | Resp::ExOkay)
    }
}

impl fmt::Display for Resp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resp::Okay => "OKAY",
            Resp::ExOkay => "EXOKAY",
            Resp::SlvErr => "SLVERR",
            Resp::DecErr => "DECERR",
        };
        f.write_str(name)
    }
}

/// Address phase of an INCR burst (AW or AR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxiAddr {
    pub id: u32,
    pub addr: u64,
    /// Beats minus one.
    pub len: u8,
    /// log2 of bytes per beat.
    pub size: u8,
}

impl AxiAddr {
    pub fn beats(&self) -> usize {
        self.len as usize + 1
    }

    pub fn bytes_per_beat(&self) -> u64 {
        1 << self.size
    }

    /// Size-aligned byte window carried by beat `k`.
    pub fn beat_window(&self, k: usize) -> std::ops::Range<u64> {
        let nb = self.bytes_per_beat();
        let lo = (self.addr & !(nb - 1)) + k as u64 * nb;
        lo..lo + nb
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxiW {
    /// One byte per lane.
    pub data: Vec<u8>,
    pub strb: u32,
    pub last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxiB {
    pub id: u32,
    pub resp: Resp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxiR {
    pub id: u32,
    pub data: Vec<u8>,
    pub resp: Resp,
    pub last: bool,
}

/// One ready/valid channel. `payload` is `None` whenever valid is low.
pub struct Channel<T> {
    name: String,
    pub valid: Signal<bool>,
    pub ready: Signal<bool>,
    pub payload: Signal<Option<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            valid: self.valid.clone(),
            ready: self.ready.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Channel<T> {
    pub fn new(sim: &Sim, name: &str) -> Self {
        Self {
            name: name.to_string(),
            valid: Signal::new(sim, &format!("{}valid", name), false),
            ready: Signal::new(sim, &format!("{}ready", name), false),
            payload: Signal::new(sim, name, None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if valid and ready were both high at the last edge.
    pub fn fired(&self) -> bool {
        self.valid.get() && self.ready.get()
    }

    /// The payload transferred at the last edge, if any.
    pub fn handshake(&self) -> Option<T> {
        if self.fired() {
            self.payload.get()
        } else {
            None
        }
    }
}

/// The five channels of one AXI4 port plus its reset.
#[derive(Clone)]
pub struct AxiBus {
    pub rst: Signal<bool>,
    pub aw: Channel<AxiAddr>,
    pub w: Channel<AxiW>,
    pub b: Channel<AxiB>,
    pub ar: Channel<AxiAddr>,
    pub r: Channel<AxiR>,
}

impl AxiBus {
    /// Channel signals are named `<prefix>_awvalid`, `<prefix>_wready`, ...
    pub fn new(sim: &Sim, prefix: &str) -> Self {
        Self {
            rst: Signal::new(sim, &format!("{}_rst", prefix), false),
            aw: Channel::new(sim, &format!("{}_aw", prefix)),
            w: Channel::new(sim, &format!("{}_w", prefix)),
            b: Channel::new(sim, &format!("{}_b", prefix)),
            ar: Channel::new(sim, &format!("{}_ar", prefix)),
            r: Channel::new(sim, &format!("{}_r", prefix)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resp_encoding() {
        for bits in 0..4u8 {
            assert_eq!(Resp::from_bits(bits).bits(), bits);
        }
        assert!(Resp::Okay.is_ok());
        assert!(Resp::ExOkay.is_ok());
        assert!(!Resp::SlvErr.is_ok());
        assert_eq!(Resp::Okay.max(Resp::DecErr), Resp::DecErr);
        assert_eq!(Resp::SlvErr.to_string(), "SLVERR");
    }

    #[test]
    fn beat_windows_follow_size_alignment() {
        let aw = AxiAddr {
            id: 0,
            addr: 0x103,
            len: 2,
            size: 2,
        };
        assert_eq!(aw.beats(), 3);
        assert_eq!(aw.beat_window(0), 0x100..0x104);
        assert_eq!(aw.beat_window(2), 0x108..0x10c);
    }

    #[test]
    fn handshake_needs_both_signals() {
        let sim = Sim::new(10);
        let ch: Channel<u8> = Channel::new(&sim, "t");
        ch.valid.set(true);
        ch.payload.set(Some(9));
        sim.advance();
        assert_eq!(ch.handshake(), None);
        ch.ready.set(true);
        sim.advance();
        assert_eq!(ch.handshake(), Some(9));
        assert_eq!(ch.valid.name(), "tvalid");
    }
}
