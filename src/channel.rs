//! Ready/valid channel drivers.
//!
//! A [`ChannelSource`] owns the valid side of a channel and a
//! [`ChannelSink`] the ready side. Each runs as its own task, samples the
//! handshake on every rising edge and drives its output for the next one,
//! consulting its own stall pattern once per cycle.

use std::collections::VecDeque;

use crate::axi::Channel;
use crate::signal::Signal;
use crate::sim::Sim;
use crate::stall::StallPattern;
use crate::tb_obj::TbObj;
use crate::TbResult;

struct SourceState<T> {
    queue: VecDeque<T>,
    current: Option<T>,
    pattern: StallPattern,
    offered: u64,
    accepted: u64,
}

/// Drives valid and payload of one channel from a queue of offered items.
pub struct ChannelSource<T> {
    sim: Sim,
    channel: Channel<T>,
    state: TbObj<SourceState<T>>,
}

impl<T> Clone for ChannelSource<T> {
    fn clone(&self) -> Self {
        Self {
            sim: self.sim.clone(),
            channel: self.channel.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ChannelSource<T> {
    pub fn new(sim: &Sim, channel: Channel<T>, reset: Signal<bool>) -> Self {
        let source = Self {
            sim: sim.clone(),
            channel,
            state: TbObj::new(SourceState {
                queue: VecDeque::new(),
                current: None,
                pattern: StallPattern::never(),
                offered: 0,
                accepted: 0,
            }),
        };
        let name = format!("{} source", source.channel.name());
        sim.spawn(&name, source.clone().run(reset));
        source
    }

    pub fn set_pause_generator(&self, pattern: StallPattern) {
        self.state.with_mut(|s| s.pattern = pattern);
    }

    /// Queues `payload` and returns its sequence number. The item has been
    /// transferred once `accepted()` reaches that number.
    pub fn offer(&self, payload: T) -> u64 {
        self.state.with_mut(|s| {
            s.queue.push_back(payload);
            s.offered += 1;
            s.offered
        })
    }

    pub fn offered(&self) -> u64 {
        self.state.get().offered
    }

    pub fn accepted(&self) -> u64 {
        self.state.get().accepted
    }

    pub fn idle(&self) -> bool {
        let s = self.state.get();
        s.offered == s.accepted
    }

    /// Waits until everything offered so far has been accepted.
    pub async fn wait_idle(&self) {
        while !self.idle() {
            self.sim.rising_edge().await;
        }
    }

    async fn run(self, reset: Signal<bool>) -> TbResult<()> {
        loop {
            self.sim.rising_edge().await;
            if reset.get() {
                self.channel.valid.set(false);
                self.channel.payload.set(None);
                continue;
            }
            let fired = self.channel.fired();
            let drive = self.state.with_mut(|s| {
                let pause = s.pattern.next().unwrap_or(false);
                if fired {
                    s.current = None;
                    s.accepted += 1;
                }
                // once presented, an item stays valid until it is taken
                if s.current.is_none() && !pause {
                    s.current = s.queue.pop_front();
                }
                s.current.clone()
            });
            self.channel.valid.set(drive.is_some());
            self.channel.payload.set(drive);
        }
    }
}

struct SinkState<T> {
    queue: VecDeque<T>,
    pattern: StallPattern,
    depth: Option<usize>,
    received: u64,
}

/// Drives ready of one channel and collects every accepted payload.
pub struct ChannelSink<T> {
    sim: Sim,
    channel: Channel<T>,
    state: TbObj<SinkState<T>>,
}

impl<T> Clone for ChannelSink<T> {
    fn clone(&self) -> Self {
        Self {
            sim: self.sim.clone(),
            channel: self.channel.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ChannelSink<T> {
    pub fn new(sim: &Sim, channel: Channel<T>, reset: Signal<bool>) -> Self {
        let sink = Self {
            sim: sim.clone(),
            channel,
            state: TbObj::new(SinkState {
                queue: VecDeque::new(),
                pattern: StallPattern::never(),
                depth: None,
                received: 0,
            }),
        };
        let name = format!("{} sink", sink.channel.name());
        sim.spawn(&name, sink.clone().run(reset));
        sink
    }

    pub fn set_pause_generator(&self, pattern: StallPattern) {
        self.state.with_mut(|s| s.pattern = pattern);
    }

    /// Holds ready low while `depth` items are waiting to be taken.
    pub fn set_depth(&self, depth: Option<usize>) {
        self.state.with_mut(|s| s.depth = depth);
    }

    pub fn received(&self) -> u64 {
        self.state.get().received
    }

    pub fn try_accept(&self) -> Option<T> {
        self.state.with_mut(|s| s.queue.pop_front())
    }

    /// Suspends until a beat has been transferred, then returns it.
    pub async fn accept(&self) -> T {
        loop {
            if let Some(item) = self.try_accept() {
                return item;
            }
            self.sim.rising_edge().await;
        }
    }

    async fn run(self, reset: Signal<bool>) -> TbResult<()> {
        loop {
            self.sim.rising_edge().await;
            if reset.get() {
                self.channel.ready.set(false);
                continue;
            }
            let item = self.channel.handshake();
            let ready = self.state.with_mut(|s| {
                if let Some(item) = item {
                    s.queue.push_back(item);
                    s.received += 1;
                }
                let pause = s.pattern.next().unwrap_or(false);
                !pause && s.depth.map_or(true, |d| s.queue.len() < d)
            });
            self.channel.ready.set(ready);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stall::{cycle_pause, PauseGenerator};
    use crate::testbench::ChannelMonitor;
    use crate::utils::clock_cycles;

    fn transfer(idle: PauseGenerator, backpressure: PauseGenerator) -> (Vec<u32>, u64, u64) {
        let sim = Sim::new(10_000);
        let reset = Signal::new(&sim, "rst", false);
        let ch: Channel<u32> = Channel::new(&sim, "t");
        let source = ChannelSource::new(&sim, ch.clone(), reset.clone());
        let sink = ChannelSink::new(&sim, ch.clone(), reset.clone());
        let monitor = ChannelMonitor::new(&sim, ch, reset);
        source.set_pause_generator(idle.pattern(0));
        sink.set_pause_generator(backpressure.pattern(1));

        let got = TbObj::new(Vec::new());
        let out = got.clone();
        let s = sim.clone();
        let mon = monitor.clone();
        let cycles = sim
            .run("transfer", async move {
                for i in 0..50 {
                    source.offer(i);
                }
                for _ in 0..50 {
                    let v = sink.accept().await;
                    out.with_mut(|o| o.push(v));
                }
                source.wait_idle().await;
                clock_cycles(&s, 2).await;
                assert!(sink.try_accept().is_none());
                mon.check()
            })
            .unwrap();
        let got = got.get().clone();
        (got, monitor.beats(), cycles)
    }

    #[test]
    fn no_drop_or_duplicate_under_stalls() {
        let expected: Vec<u32> = (0..50).collect();
        let mut cycles = Vec::new();
        for idle in [PauseGenerator::None, cycle_pause()] {
            for bp in [PauseGenerator::None, cycle_pause(), PauseGenerator::random(0.6, 9)] {
                let (got, beats, n) = transfer(idle.clone(), bp.clone());
                assert_eq!(got, expected);
                assert_eq!(beats, 50);
                cycles.push(n);
            }
        }
        // stalls cost cycles, never data
        assert!(cycles[0] < cycles[4]);
    }

    #[test]
    fn bounded_sink_holds_ready_low() {
        let sim = Sim::new(1_000);
        let reset = Signal::new(&sim, "rst", false);
        let ch: Channel<u8> = Channel::new(&sim, "t");
        let source = ChannelSource::new(&sim, ch.clone(), reset.clone());
        let sink = ChannelSink::new(&sim, ch, reset);
        sink.set_depth(Some(2));
        let s = sim.clone();
        sim.run("bounded", async move {
            for i in 0..5 {
                source.offer(i);
            }
            clock_cycles(&s, 20).await;
            assert_eq!(sink.received(), 2);
            assert_eq!(source.accepted(), 2);
            assert_eq!(sink.try_accept(), Some(0));
            assert_eq!(sink.accept().await, 1);
            assert_eq!(sink.accept().await, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn reset_holds_outputs_low() {
        let sim = Sim::new(1_000);
        let reset = Signal::new(&sim, "rst", true);
        let ch: Channel<u8> = Channel::new(&sim, "t");
        let source = ChannelSource::new(&sim, ch.clone(), reset.clone());
        let sink = ChannelSink::new(&sim, ch.clone(), reset.clone());
        let s = sim.clone();
        sim.run("reset", async move {
            source.offer(1);
            clock_cycles(&s, 5).await;
            assert!(!ch.valid.get());
            assert!(!ch.ready.get());
            reset.set(false);
            assert_eq!(sink.accept().await, 1);
            Ok(())
        })
        .unwrap();
    }
}
