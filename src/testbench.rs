use log::{error, warn};
use std::collections::VecDeque;

use crate::axi::{AxiAddr, AxiW, Channel};
use crate::error::{Mismatch, ProtocolError};
use crate::signal::Signal;
use crate::sim::Sim;
use crate::tb_obj::TbObj;
use crate::{TbError, TbResult};

/*
 * SCOREBOARD
 */
/// Pairs written data with read-back data in order and keeps every
/// mismatch, so a whole sweep can be reported at once.
#[derive(Clone)]
pub struct Scoreboard(TbObj<ScoreboardInner>);

impl Scoreboard {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(TbObj::new(ScoreboardInner {
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            mismatches: Vec::new(),
            expected: 0,
            received: 0,
            matched: 0,
        }))
    }

    pub fn add_exp(&self, addr: u64, data: Vec<u8>) {
        self.0.with_mut(|s| {
            s.exp_q.push_back((addr, data));
            s.expected += 1;
        });
        self.compare();
    }

    pub fn add_recv(&self, addr: u64, data: Vec<u8>) {
        self.0.with_mut(|s| {
            s.recv_q.push_back((addr, data));
            s.received += 1;
        });
        self.compare();
    }

    fn compare(&self) {
        let new = self.0.with_mut(|s| {
            let mut new = Vec::new();
            while !s.exp_q.is_empty() && !s.recv_q.is_empty() {
                let (Some((exp_addr, expected)), Some((addr, observed))) =
                    (s.exp_q.pop_front(), s.recv_q.pop_front())
                else {
                    break;
                };
                if exp_addr == addr && expected == observed {
                    s.matched += 1;
                } else {
                    let m = Mismatch {
                        addr: exp_addr,
                        expected,
                        observed,
                    };
                    new.push(m.clone());
                    s.mismatches.push(m);
                }
            }
            new
        });
        for m in new {
            error!("{}", m);
        }
    }

    pub fn mismatches(&self) -> Vec<Mismatch> {
        self.0.get().mismatches.clone()
    }

    pub fn passed(&self) -> bool {
        let inner = self.0.get();
        inner.expected > 0
            && inner.received == inner.expected
            && inner.matched == inner.received
            && inner.mismatches.is_empty()
            && inner.exp_q.is_empty()
            && inner.recv_q.is_empty()
    }

    pub fn result_str(&self) -> String {
        let inner = self.0.get();
        format!(
            "expected={}, received={}, matched={}, errors={}, expQ: {}, recvQ: {}",
            inner.expected,
            inner.received,
            inner.matched,
            inner.mismatches.len(),
            inner.exp_q.len(),
            inner.recv_q.len()
        )
    }

    /// `Ok` with the summary line, or every mismatch collected so far.
    pub fn result(&self) -> TbResult<String> {
        match self.passed() {
            true => Ok(self.result_str()),
            false => Err(TbError::DataMismatch {
                mismatches: self.mismatches(),
                summary: self.result_str(),
            }),
        }
    }
}

struct ScoreboardInner {
    exp_q: VecDeque<(u64, Vec<u8>)>,
    recv_q: VecDeque<(u64, Vec<u8>)>,
    mismatches: Vec<Mismatch>,
    expected: u32,
    received: u32,
    matched: u32,
}

/*
 * MONITOR
 */
/// Passive observer of one channel: counts beats and checks that valid is
/// held, with a stable payload, until the beat is taken.
pub struct ChannelMonitor<T>(TbObj<MonitorInner<T>>);

impl<T> Clone for ChannelMonitor<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

struct MonitorInner<T> {
    name: String,
    beats: u64,
    prev: Option<(bool, bool, Option<T>)>,
    violations: Vec<ProtocolError>,
}

impl<T: Clone + PartialEq + Send + 'static> ChannelMonitor<T> {
    pub fn new(sim: &Sim, channel: Channel<T>, reset: Signal<bool>) -> Self {
        let mon = Self(TbObj::new(MonitorInner {
            name: channel.name().to_string(),
            beats: 0,
            prev: None,
            violations: Vec::new(),
        }));
        sim.spawn(
            &format!("{} monitor", channel.name()),
            mon.clone().run(sim.clone(), channel, reset),
        );
        mon
    }

    pub fn beats(&self) -> u64 {
        self.0.get().beats
    }

    pub fn violations(&self) -> Vec<ProtocolError> {
        self.0.get().violations.clone()
    }

    /// First handshake violation seen, if any.
    pub fn check(&self) -> TbResult<()> {
        match self.0.get().violations.first() {
            Some(v) => Err(v.clone().into()),
            None => Ok(()),
        }
    }

    async fn run(self, sim: Sim, channel: Channel<T>, reset: Signal<bool>) -> TbResult<()> {
        loop {
            sim.rising_edge().await;
            let cycle = sim.cycle();
            if reset.get() {
                self.0.with_mut(|m| m.prev = None);
                continue;
            }
            let valid = channel.valid.get();
            let ready = channel.ready.get();
            let payload = channel.payload.get();
            self.0.with_mut(|m| {
                if let Some((prev_valid, prev_ready, prev_payload)) = m.prev.take() {
                    // a beat offered without ready must still be there, unchanged
                    let reason = if prev_valid && !prev_ready && !valid {
                        Some("valid withdrawn before the beat was accepted")
                    } else if prev_valid && !prev_ready && payload != prev_payload {
                        Some("payload changed while waiting for ready")
                    } else {
                        None
                    };
                    if let Some(reason) = reason {
                        warn!("{} at cycle {}: {}", m.name, cycle, reason);
                        m.violations.push(ProtocolError::HandshakeViolation {
                            channel: m.name.clone(),
                            cycle,
                            reason: reason.to_string(),
                        });
                    }
                }
                if valid && ready {
                    m.beats += 1;
                }
                m.prev = Some((valid, ready, payload));
            });
        }
    }
}

/// Passive observer of the write data phase: counts the W beats accepted
/// up to each `last` and checks the count against the length of the
/// matching AW beat. Bursts pair up in order.
#[derive(Clone)]
pub struct WriteBurstMonitor(TbObj<WriteBurstInner>);

struct WriteBurstInner {
    declared: VecDeque<(u32, usize)>,
    driven: VecDeque<usize>,
    current: usize,
    bursts: u64,
    violations: Vec<ProtocolError>,
}

impl WriteBurstMonitor {
    pub fn new(sim: &Sim, aw: Channel<AxiAddr>, w: Channel<AxiW>, reset: Signal<bool>) -> Self {
        let mon = Self(TbObj::new(WriteBurstInner {
            declared: VecDeque::new(),
            driven: VecDeque::new(),
            current: 0,
            bursts: 0,
            violations: Vec::new(),
        }));
        sim.spawn(
            &format!("{} burst monitor", w.name()),
            mon.clone().run(sim.clone(), aw, w, reset),
        );
        mon
    }

    /// Write bursts whose data phase has been checked.
    pub fn bursts(&self) -> u64 {
        self.0.get().bursts
    }

    pub fn check(&self) -> TbResult<()> {
        match self.0.get().violations.first() {
            Some(v) => Err(v.clone().into()),
            None => Ok(()),
        }
    }

    async fn run(
        self,
        sim: Sim,
        aw: Channel<AxiAddr>,
        w: Channel<AxiW>,
        reset: Signal<bool>,
    ) -> TbResult<()> {
        loop {
            sim.rising_edge().await;
            if reset.get() {
                continue;
            }
            let addr = aw.handshake();
            let data = w.handshake();
            self.0.with_mut(|m| {
                if let Some(addr) = addr {
                    m.declared.push_back((addr.id, addr.beats()));
                }
                if let Some(beat) = data {
                    m.current += 1;
                    if beat.last {
                        m.driven.push_back(m.current);
                        m.current = 0;
                    }
                }
                while !m.declared.is_empty() && !m.driven.is_empty() {
                    let (Some((id, declared)), Some(driven)) =
                        (m.declared.pop_front(), m.driven.pop_front())
                    else {
                        break;
                    };
                    m.bursts += 1;
                    if driven != declared {
                        warn!(
                            "write burst id {}: {} data beats for a {}-beat burst",
                            id, driven, declared
                        );
                        m.violations.push(ProtocolError::BeatCountMismatch {
                            id,
                            driven,
                            declared,
                        });
                    }
                }
            });
        }
    }
}
