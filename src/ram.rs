//! Memory-backed AXI4 slave standing in for the PIM device.
//!
//! Only the bus contract is modelled: bytes written to an address come back
//! unchanged from a later read of the same address.

use log::{debug, warn};
use std::ops::Range;

use crate::axi::{AxiAddr, AxiB, AxiBus, AxiR, AxiW, Resp};
use crate::channel::{ChannelSink, ChannelSource};
use crate::config::BusConfig;
use crate::sim::Sim;
use crate::stall::PauseGenerator;
use crate::tb_obj::TbObj;
use crate::utils::clock_cycles;
use crate::TbResult;

/// Cycles the read process keeps collecting AR beats before answering them
/// in reverse order.
const REORDER_WINDOW: u32 = 8;

/// Deliberate protocol breakage, for exercising the master's error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamFault {
    /// `last` on the first beat of every multi-beat read burst.
    EarlyLast,
    /// `last` never set on read data.
    MissingLast,
    /// Read data carries an id that was never issued.
    WrongReadId,
    /// Write responses carry an id that was never issued.
    WrongWriteId,
    /// B is answered as soon as AW is taken, before any W beat.
    EarlyWriteResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RamOptions {
    /// Answer pending read bursts last-accepted first.
    pub reorder_reads: bool,
    /// Accesses touching this window answer SLVERR.
    pub error_window: Option<Range<u64>>,
    pub fault: Option<RamFault>,
}

#[derive(Clone)]
pub struct AxiRam {
    sim: Sim,
    cfg: BusConfig,
    mem: TbObj<Vec<u8>>,
    options: TbObj<RamOptions>,
    aw: ChannelSink<AxiAddr>,
    w: ChannelSink<AxiW>,
    b: ChannelSource<AxiB>,
    ar: ChannelSink<AxiAddr>,
    r: ChannelSource<AxiR>,
}

impl AxiRam {
    pub fn new(sim: &Sim, cfg: BusConfig, bus: &AxiBus, size: usize) -> Self {
        let rst = &bus.rst;
        let ram = Self {
            sim: sim.clone(),
            cfg,
            mem: TbObj::new(vec![0; size]),
            options: TbObj::new(RamOptions::default()),
            aw: ChannelSink::new(sim, bus.aw.clone(), rst.clone()),
            w: ChannelSink::new(sim, bus.w.clone(), rst.clone()),
            b: ChannelSource::new(sim, bus.b.clone(), rst.clone()),
            ar: ChannelSink::new(sim, bus.ar.clone(), rst.clone()),
            r: ChannelSource::new(sim, bus.r.clone(), rst.clone()),
        };
        sim.spawn("ram write", ram.clone().write_process());
        sim.spawn("ram read", ram.clone().read_process());
        ram
    }

    pub fn set_options(&self, options: RamOptions) {
        self.options.with_mut(|o| *o = options);
    }

    /// Device-side ready stalls on AW, W and AR.
    pub fn set_backpressure_generator(&self, generator: &PauseGenerator) {
        self.aw.set_pause_generator(generator.pattern(10));
        self.w.set_pause_generator(generator.pattern(11));
        self.ar.set_pause_generator(generator.pattern(12));
    }

    /// Device-side valid stalls on B and R.
    pub fn set_idle_generator(&self, generator: &PauseGenerator) {
        self.b.set_pause_generator(generator.pattern(13));
        self.r.set_pause_generator(generator.pattern(14));
    }

    pub fn size(&self) -> usize {
        self.mem.get().len()
    }

    /// Backdoor read, bypassing the bus. Out-of-range bytes read as zero.
    pub fn read_mem(&self, addr: u64, length: usize) -> Vec<u8> {
        let mem = self.mem.get();
        (addr..addr + length as u64)
            .map(|a| mem.get(a as usize).copied().unwrap_or(0))
            .collect()
    }

    /// Backdoor write, bypassing the bus. Out-of-range bytes are dropped.
    pub fn write_mem(&self, addr: u64, data: &[u8]) {
        self.mem.with_mut(|mem| {
            for (a, &byte) in (addr..).zip(data) {
                if let Some(slot) = mem.get_mut(a as usize) {
                    *slot = byte;
                }
            }
        });
    }

    fn window_resp(&self, window: &Range<u64>) -> Resp {
        if window.end > self.size() as u64 {
            return Resp::DecErr;
        }
        let overlaps = self.options.with_mut(|o| {
            o.error_window
                .as_ref()
                .map_or(false, |e| e.start < window.end && window.start < e.end)
        });
        if overlaps {
            Resp::SlvErr
        } else {
            Resp::Okay
        }
    }

    fn store(&self, aw: &AxiAddr, k: usize, w: &AxiW) -> Resp {
        let window = aw.beat_window(k);
        let resp = self.window_resp(&window);
        if resp != Resp::Okay {
            return resp;
        }
        let lanes = self.cfg.byte_lanes() as u64;
        let base = window.start & !(lanes - 1);
        self.mem.with_mut(|mem| {
            for lane in 0..lanes {
                let a = base + lane;
                if w.strb & (1 << lane) != 0 && window.contains(&a) {
                    mem[a as usize] = w.data.get(lane as usize).copied().unwrap_or(0);
                }
            }
        });
        Resp::Okay
    }

    fn load(&self, ar: &AxiAddr, k: usize) -> (Vec<u8>, Resp) {
        let window = ar.beat_window(k);
        let mut data = vec![0u8; self.cfg.byte_lanes()];
        let resp = self.window_resp(&window);
        if resp != Resp::DecErr {
            let mem = self.mem.get();
            for a in window {
                data[self.cfg.lane(a)] = mem[a as usize];
            }
        }
        (data, resp)
    }

    fn foreign_id(&self, id: u32) -> u32 {
        id ^ (1 << (self.cfg.id_width() - 1))
    }

    async fn write_process(self) -> TbResult<()> {
        loop {
            let aw = self.aw.accept().await;
            debug!(
                "[{}] ram AW id={} addr={:#x} len={}",
                self.sim.cycle(),
                aw.id,
                aw.addr,
                aw.len
            );
            let fault = self.options.get().fault;
            if fault == Some(RamFault::EarlyWriteResponse) {
                self.b.offer(AxiB {
                    id: aw.id,
                    resp: Resp::Okay,
                });
            }
            let beats = aw.beats();
            let mut resp = Resp::Okay;
            for k in 0..beats {
                let w = self.w.accept().await;
                if w.last != (k + 1 == beats) {
                    warn!(
                        "[{}] ram: write beat {} of {} for id {} has last={}",
                        self.sim.cycle(),
                        k,
                        beats,
                        aw.id,
                        w.last
                    );
                    resp = resp.max(Resp::SlvErr);
                }
                resp = resp.max(self.store(&aw, k, &w));
            }
            let id = match fault {
                Some(RamFault::WrongWriteId) => self.foreign_id(aw.id),
                Some(RamFault::EarlyWriteResponse) => continue,
                _ => aw.id,
            };
            self.b.offer(AxiB { id, resp });
        }
    }

    async fn read_process(self) -> TbResult<()> {
        loop {
            let first = self.ar.accept().await;
            let mut pending = vec![first];
            let reorder = self.options.get().reorder_reads;
            if reorder {
                for _ in 0..REORDER_WINDOW {
                    clock_cycles(&self.sim, 1).await;
                    while let Some(ar) = self.ar.try_accept() {
                        pending.push(ar);
                    }
                }
                pending.reverse();
            }
            for ar in pending {
                self.respond(&ar);
            }
        }
    }

    fn respond(&self, ar: &AxiAddr) {
        debug!(
            "[{}] ram AR id={} addr={:#x} len={}",
            self.sim.cycle(),
            ar.id,
            ar.addr,
            ar.len
        );
        let fault = self.options.get().fault;
        let beats = ar.beats();
        for k in 0..beats {
            let (data, resp) = self.load(ar, k);
            let last = match fault {
                Some(RamFault::EarlyLast) if beats > 1 => k == 0,
                Some(RamFault::MissingLast) => false,
                _ => k + 1 == beats,
            };
            let id = match fault {
                Some(RamFault::WrongReadId) => self.foreign_id(ar.id),
                _ => ar.id,
            };
            self.r.offer(AxiR {
                id,
                data,
                resp,
                last,
            });
        }
    }
}
