//! AXI4 burst master: turns flat byte transfers into bursts on the bus and
//! correlates responses by id.

use intmap::IntMap;
use log::{debug, warn};

use crate::axi::{AxiAddr, AxiB, AxiBus, AxiR, AxiW, Resp};
use crate::burst::{split, Burst};
use crate::channel::{ChannelSink, ChannelSource};
use crate::config::BusConfig;
use crate::error::ProtocolError;
use crate::sim::Sim;
use crate::stall::PauseGenerator;
use crate::tb_obj::TbObj;
use crate::TbResult;

/// Life cycle of one burst. Error responses end in `Complete` with a
/// failing status rather than being dropped. Read bursts go from
/// `DataInFlight` straight to `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstState {
    AddrPending,
    AddrAccepted,
    DataInFlight,
    RespPending,
    Complete(Resp),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResp {
    pub addr: u64,
    pub length: usize,
    pub resp: Resp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResp {
    pub addr: u64,
    pub data: Vec<u8>,
    pub resp: Resp,
}

/// Hands out ids that are not currently in flight, rotating across
/// transactions.
#[derive(Clone)]
struct IdPool(TbObj<u32>);

impl IdPool {
    fn new() -> Self {
        IdPool(TbObj::new(0))
    }

    fn alloc(&self, bus: &BusConfig, inflight: &IntMap<usize>) -> u32 {
        self.0.with_mut(|next| {
            let count = bus.id_count();
            let mut id = *next % count;
            while inflight.contains_key(id as u64) {
                id = (id + 1) % count;
            }
            *next = (id + 1) % count;
            id
        })
    }
}

struct WriteBurst {
    burst: Burst,
    id: u32,
    state: BurstState,
    aw_seq: u64,
    w_first: u64,
    w_last: u64,
}

impl WriteBurst {
    fn advance(&mut self, aw_accepted: u64, w_accepted: u64) {
        loop {
            let next = match self.state {
                BurstState::AddrPending if aw_accepted >= self.aw_seq => BurstState::AddrAccepted,
                BurstState::AddrAccepted if w_accepted >= self.w_first => BurstState::DataInFlight,
                BurstState::DataInFlight if w_accepted >= self.w_last => BurstState::RespPending,
                _ => return,
            };
            self.state = next;
        }
    }
}

/// Write half of the master: AW and W sources, B sink.
#[derive(Clone)]
pub struct AxiMasterWrite {
    sim: Sim,
    cfg: BusConfig,
    pub aw_channel: ChannelSource<AxiAddr>,
    pub w_channel: ChannelSource<AxiW>,
    pub b_channel: ChannelSink<AxiB>,
    ids: IdPool,
}

impl AxiMasterWrite {
    pub fn new(sim: &Sim, cfg: BusConfig, bus: &AxiBus) -> Self {
        Self {
            sim: sim.clone(),
            cfg,
            aw_channel: ChannelSource::new(sim, bus.aw.clone(), bus.rst.clone()),
            w_channel: ChannelSource::new(sim, bus.w.clone(), bus.rst.clone()),
            b_channel: ChannelSink::new(sim, bus.b.clone(), bus.rst.clone()),
            ids: IdPool::new(),
        }
    }

    /// Writes `data` at `addr`. Every burst is acknowledged before this
    /// returns; the first failing response is reported after the rest of
    /// the bursts have drained.
    pub async fn write(&self, addr: u64, data: &[u8], size: Option<u8>) -> TbResult<WriteResp> {
        let bursts = split(&self.cfg, addr, data.len(), size)?;
        debug!(
            "[{}] write {} bytes at {:#x} in {} burst(s)",
            self.sim.cycle(),
            data.len(),
            addr,
            bursts.len()
        );

        let mut table: Vec<WriteBurst> = Vec::with_capacity(bursts.len());
        let mut inflight: IntMap<usize> = IntMap::new();
        let mut pending = bursts.into_iter();
        let mut total = 0;
        let mut completed = 0;
        let mut resp = Resp::Okay;
        let mut failure: Option<ProtocolError> = None;

        loop {
            while inflight.len() < self.cfg.max_outstanding() {
                let Some(burst) = pending.next() else { break };
                let id = self.ids.alloc(&self.cfg, &inflight);
                let beats = burst.write_beats(&self.cfg, data);
                check_data_phase(id, &burst, &beats)?;

                let aw = burst.address_phase(id);
                debug!(
                    "[{}] AW id={} addr={:#x} len={} size={}",
                    self.sim.cycle(),
                    id,
                    aw.addr,
                    aw.len,
                    aw.size
                );
                let aw_seq = self.aw_channel.offer(aw);
                let mut w_last = 0;
                for beat in beats {
                    w_last = self.w_channel.offer(beat);
                }
                inflight.insert(id as u64, table.len());
                table.push(WriteBurst {
                    w_first: w_last + 1 - burst.beats as u64,
                    burst,
                    id,
                    state: BurstState::AddrPending,
                    aw_seq,
                    w_last,
                });
                total += 1;
            }
            if completed == total {
                break;
            }

            let b = self.b_channel.accept().await;
            let (aw_acc, w_acc) = (self.aw_channel.accepted(), self.w_channel.accepted());
            let index = inflight
                .remove(b.id as u64)
                .ok_or(ProtocolError::UnexpectedId { id: b.id })?;
            let entry = &mut table[index];
            entry.advance(aw_acc, w_acc);
            if entry.state != BurstState::RespPending {
                return Err(ProtocolError::EarlyResponse { id: b.id }.into());
            }
            entry.state = BurstState::Complete(b.resp);
            completed += 1;
            debug!("[{}] B id={} resp={}", self.sim.cycle(), b.id, b.resp);
            if !b.resp.is_ok() && failure.is_none() {
                warn!(
                    "[{}] write burst id={} at {:#x} failed with {}",
                    self.sim.cycle(),
                    b.id,
                    entry.burst.addr,
                    b.resp
                );
                failure = Some(ProtocolError::ErrorResponse {
                    id: entry.id,
                    addr: entry.burst.addr,
                    resp: b.resp,
                });
            }
            resp = resp.max(b.resp);
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(WriteResp {
                addr,
                length: data.len(),
                resp,
            }),
        }
    }
}

/// Self-check of the beats this master is about to drive. What actually
/// crosses the bus is checked by `WriteBurstMonitor`.
fn check_data_phase(id: u32, burst: &Burst, beats: &[AxiW]) -> TbResult<()> {
    let lasts = beats.iter().filter(|b| b.last).count();
    let last_at_end = beats.last().map_or(false, |b| b.last);
    if beats.len() != burst.beats || lasts != 1 || !last_at_end {
        return Err(ProtocolError::BeatCountMismatch {
            id,
            driven: beats.len(),
            declared: burst.beats,
        }
        .into());
    }
    Ok(())
}

struct ReadBurst {
    burst: Burst,
    state: BurstState,
    ar_seq: u64,
    received: usize,
    resp: Resp,
}

/// Read half of the master: AR source, R sink.
#[derive(Clone)]
pub struct AxiMasterRead {
    sim: Sim,
    cfg: BusConfig,
    pub ar_channel: ChannelSource<AxiAddr>,
    pub r_channel: ChannelSink<AxiR>,
    ids: IdPool,
}

impl AxiMasterRead {
    pub fn new(sim: &Sim, cfg: BusConfig, bus: &AxiBus) -> Self {
        Self {
            sim: sim.clone(),
            cfg,
            ar_channel: ChannelSource::new(sim, bus.ar.clone(), bus.rst.clone()),
            r_channel: ChannelSink::new(sim, bus.r.clone(), bus.rst.clone()),
            ids: IdPool::new(),
        }
    }

    /// Reads `length` bytes at `addr`. Beats are matched to bursts by id, so
    /// the device may answer bursts in any order.
    pub async fn read(&self, addr: u64, length: usize, size: Option<u8>) -> TbResult<ReadResp> {
        let bursts = split(&self.cfg, addr, length, size)?;
        debug!(
            "[{}] read {} bytes at {:#x} in {} burst(s)",
            self.sim.cycle(),
            length,
            addr,
            bursts.len()
        );

        let mut data = vec![0u8; length];
        let mut table: Vec<ReadBurst> = Vec::with_capacity(bursts.len());
        let mut inflight: IntMap<usize> = IntMap::new();
        let mut pending = bursts.into_iter();
        let mut total = 0;
        let mut completed = 0;
        let mut resp = Resp::Okay;
        let mut failure: Option<ProtocolError> = None;

        loop {
            while inflight.len() < self.cfg.max_outstanding() {
                let Some(burst) = pending.next() else { break };
                let id = self.ids.alloc(&self.cfg, &inflight);
                let ar = burst.address_phase(id);
                debug!(
                    "[{}] AR id={} addr={:#x} len={} size={}",
                    self.sim.cycle(),
                    id,
                    ar.addr,
                    ar.len,
                    ar.size
                );
                let ar_seq = self.ar_channel.offer(ar);
                inflight.insert(id as u64, table.len());
                table.push(ReadBurst {
                    burst,
                    state: BurstState::AddrPending,
                    ar_seq,
                    received: 0,
                    resp: Resp::Okay,
                });
                total += 1;
            }
            if completed == total {
                break;
            }

            let r = self.r_channel.accept().await;
            let ar_acc = self.ar_channel.accepted();
            let index = *inflight
                .get(r.id as u64)
                .ok_or(ProtocolError::UnexpectedId { id: r.id })?;
            let entry = &mut table[index];
            if entry.state == BurstState::AddrPending && ar_acc >= entry.ar_seq {
                entry.state = BurstState::AddrAccepted;
            }
            match entry.state {
                BurstState::AddrAccepted => entry.state = BurstState::DataInFlight,
                BurstState::DataInFlight => {}
                _ => return Err(ProtocolError::EarlyResponse { id: r.id }.into()),
            }

            let beats = entry.burst.beats;
            let beat = entry.received;
            if beat >= beats {
                return Err(ProtocolError::MissingLast { id: r.id, beat, beats }.into());
            }
            entry.burst.extract_beat(&self.cfg, beat, &r.data, &mut data);
            entry.received += 1;
            entry.resp = entry.resp.max(r.resp);
            if r.last && entry.received < beats {
                return Err(ProtocolError::EarlyLast { id: r.id, beat, beats }.into());
            }
            if entry.received < beats {
                continue;
            }
            if !r.last {
                return Err(ProtocolError::MissingLast { id: r.id, beat, beats }.into());
            }

            // the status rides on the data beats, reads have no response phase
            entry.state = BurstState::Complete(entry.resp);
            inflight.remove(r.id as u64);
            completed += 1;
            debug!("[{}] R id={} complete resp={}", self.sim.cycle(), r.id, entry.resp);
            if !entry.resp.is_ok() && failure.is_none() {
                warn!(
                    "[{}] read burst id={} at {:#x} failed with {}",
                    self.sim.cycle(),
                    r.id,
                    entry.burst.addr,
                    entry.resp
                );
                failure = Some(ProtocolError::ErrorResponse {
                    id: r.id,
                    addr: entry.burst.addr,
                    resp: entry.resp,
                });
            }
            resp = resp.max(entry.resp);
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(ReadResp { addr, data, resp }),
        }
    }
}

/// Full AXI4 master on one bus.
#[derive(Clone)]
pub struct AxiMaster {
    pub write_if: AxiMasterWrite,
    pub read_if: AxiMasterRead,
}

impl AxiMaster {
    pub fn new(sim: &Sim, cfg: BusConfig, bus: &AxiBus) -> Self {
        Self {
            write_if: AxiMasterWrite::new(sim, cfg, bus),
            read_if: AxiMasterRead::new(sim, cfg, bus),
        }
    }

    pub async fn write(&self, addr: u64, data: &[u8], size: Option<u8>) -> TbResult<WriteResp> {
        self.write_if.write(addr, data, size).await
    }

    pub async fn read(&self, addr: u64, length: usize, size: Option<u8>) -> TbResult<ReadResp> {
        self.read_if.read(addr, length, size).await
    }

    /// Withholds valid on AW, W and AR. Each channel gets its own instance.
    pub fn set_idle_generator(&self, generator: &PauseGenerator) {
        self.write_if.aw_channel.set_pause_generator(generator.pattern(0));
        self.write_if.w_channel.set_pause_generator(generator.pattern(1));
        self.read_if.ar_channel.set_pause_generator(generator.pattern(2));
    }

    /// Withholds ready on B and R.
    pub fn set_backpressure_generator(&self, generator: &PauseGenerator) {
        self.write_if.b_channel.set_pause_generator(generator.pattern(3));
        self.read_if.r_channel.set_pause_generator(generator.pattern(4));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_skip_inflight_and_wrap() {
        let cfg = BusConfig::new(8, 16, 2).unwrap();
        let pool = IdPool::new();
        let mut inflight = IntMap::new();
        inflight.insert(1, 0usize);
        assert_eq!(pool.alloc(&cfg, &inflight), 0);
        assert_eq!(pool.alloc(&cfg, &inflight), 2);
        assert_eq!(pool.alloc(&cfg, &inflight), 3);
        assert_eq!(pool.alloc(&cfg, &inflight), 0);
    }

    #[test]
    fn write_burst_state_follows_acceptance() {
        let cfg = BusConfig::new(8, 16, 8).unwrap();
        let burst = split(&cfg, 0, 4, None).unwrap().remove(0);
        let mut wb = WriteBurst {
            burst,
            id: 0,
            state: BurstState::AddrPending,
            aw_seq: 1,
            w_first: 1,
            w_last: 4,
        };
        wb.advance(0, 2);
        assert_eq!(wb.state, BurstState::AddrPending);
        wb.advance(1, 2);
        assert_eq!(wb.state, BurstState::DataInFlight);
        wb.advance(1, 4);
        assert_eq!(wb.state, BurstState::RespPending);
        assert_eq!(wb.id, 0);
    }

    #[test]
    fn data_phase_must_match_declared_length() {
        let cfg = BusConfig::new(8, 16, 8).unwrap();
        let burst = split(&cfg, 0, 3, None).unwrap().remove(0);
        let mut beats = burst.write_beats(&cfg, &[1, 2, 3]);
        assert!(check_data_phase(0, &burst, &beats).is_ok());
        beats.pop();
        assert!(matches!(
            check_data_phase(0, &burst, &beats),
            Err(crate::TbError::Protocol(ProtocolError::BeatCountMismatch {
                driven: 2,
                declared: 3,
                ..
            }))
        ));
    }
}
