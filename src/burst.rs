//! Splitting a byte range into protocol-legal INCR bursts.

use std::ops::Range;

use crate::axi::{AxiAddr, AxiW};
use crate::config::BusConfig;
use crate::{TbError, TbResult};

/// One burst of a transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Burst {
    /// Address presented in the address phase. Only the first burst of a
    /// request may be unaligned.
    pub addr: u64,
    /// `addr` rounded down to the beat size.
    pub aligned: u64,
    pub beats: usize,
    /// log2 of bytes per beat.
    pub size: u8,
    /// Index of the first request byte carried by this burst.
    pub offset: usize,
    /// Request bytes carried by this burst.
    pub bytes: usize,
}

impl Burst {
    pub fn bytes_per_beat(&self) -> u64 {
        1 << self.size
    }

    /// Byte range of the request covered by this burst.
    pub fn range(&self) -> Range<u64> {
        self.addr..self.addr + self.bytes as u64
    }

    /// Request bytes carried by beat `k`.
    pub fn beat_span(&self, k: usize) -> Range<u64> {
        let lo = self.aligned + k as u64 * self.bytes_per_beat();
        let hi = lo + self.bytes_per_beat();
        lo.max(self.addr)..hi.min(self.range().end)
    }

    pub fn address_phase(&self, id: u32) -> AxiAddr {
        AxiAddr {
            id,
            addr: self.addr,
            len: (self.beats - 1) as u8,
            size: self.size,
        }
    }

    /// Builds the data phase from the request payload.
    pub fn write_beats(&self, bus: &BusConfig, data: &[u8]) -> Vec<AxiW> {
        (0..self.beats)
            .map(|k| {
                let mut lanes = vec![0u8; bus.byte_lanes()];
                let mut strb = 0u32;
                for a in self.beat_span(k) {
                    let lane = bus.lane(a);
                    lanes[lane] = data[self.offset + (a - self.addr) as usize];
                    strb |= 1 << lane;
                }
                AxiW {
                    data: lanes,
                    strb,
                    last: k + 1 == self.beats,
                }
            })
            .collect()
    }

    /// Copies the bytes of read beat `k` into the request buffer.
    pub fn extract_beat(&self, bus: &BusConfig, k: usize, lanes: &[u8], out: &mut [u8]) {
        for a in self.beat_span(k) {
            let idx = self.offset + (a - self.addr) as usize;
            out[idx] = lanes.get(bus.lane(a)).copied().unwrap_or(0);
        }
    }
}

/// Resolves an optional transfer size against the bus, defaulting to the
/// full data width.
pub fn resolve_size(bus: &BusConfig, size: Option<u8>) -> TbResult<u8> {
    match size {
        None => Ok(bus.max_size()),
        Some(s) if s <= bus.max_size() => Ok(s),
        Some(s) => Err(TbError::InvalidRequest(format!(
            "transfer size of {} bytes exceeds the {}-bit data bus",
            1u64 << s.min(63),
            bus.data_width()
        ))),
    }
}

/// Splits `length` bytes at `addr` into bursts in address order. Each burst
/// is as long as the per-burst beat limit and the 4 KiB boundary allow.
pub fn split(bus: &BusConfig, addr: u64, length: usize, size: Option<u8>) -> TbResult<Vec<Burst>> {
    let size = resolve_size(bus, size)?;
    if length == 0 {
        return Err(TbError::InvalidRequest("zero-length transfer".into()));
    }
    let end = addr
        .checked_add(length as u64)
        .filter(|&end| end <= bus.addr_space())
        .ok_or_else(|| {
            TbError::InvalidRequest(format!(
                "{} bytes at {:#x} exceed the {}-bit address space",
                length,
                addr,
                bus.addr_width()
            ))
        })?;

    let nb = 1u64 << size;
    let boundary = bus.boundary();
    let mut bursts = Vec::new();
    let mut cur = addr;
    let mut offset = 0usize;
    while cur < end {
        let aligned = cur & !(nb - 1);
        let beats_left = (end - aligned).div_ceil(nb);
        let to_boundary = (boundary - aligned % boundary) / nb;
        let beats = beats_left
            .min(bus.max_burst_len() as u64)
            .min(to_boundary) as usize;
        let burst_end = end.min(aligned + beats as u64 * nb);
        let bytes = (burst_end - cur) as usize;
        bursts.push(Burst {
            addr: cur,
            aligned,
            beats,
            size,
            offset,
            bytes,
        });
        offset += bytes;
        cur = burst_end;
    }
    Ok(bursts)
}
