use log::{debug, warn};
use std::future::Future;
use std::task::Waker;

use crate::executor::{JoinHandle, ReadyQueue, Task};
use crate::signal::Commit;
use crate::tb_obj::TbObj;
use crate::trigger::RisingEdge;
use crate::{TbError, TbResult};

pub const DEFAULT_MAX_CYCLES: u64 = 1_000_000;

struct SimState {
    cycle: u64,
    max_cycles: u64,
    edge_waiters: Vec<Waker>,
    signals: Vec<Box<dyn Commit>>,
}

/// Handle to the cycle-based simulation kernel.
///
/// Every component gets its own clone; there is no process-wide simulator.
/// The kernel owns the clock: `run()` polls all ready tasks until they block,
/// then advances one rising edge (latching all driven signals first, waking
/// the edge waiters second) and repeats.
#[derive(Clone)]
pub struct Sim {
    state: TbObj<SimState>,
    ready: ReadyQueue,
}

impl Default for Sim {
    fn default() -> Self {
        Sim::new(DEFAULT_MAX_CYCLES)
    }
}

impl Sim {
    pub fn new(max_cycles: u64) -> Self {
        Sim {
            state: TbObj::new(SimState {
                cycle: 0,
                max_cycles,
                edge_waiters: Vec::new(),
                signals: Vec::new(),
            }),
            ready: ReadyQueue::new(),
        }
    }

    /// Number of rising edges so far.
    pub fn cycle(&self) -> u64 {
        self.state.get().cycle
    }

    pub fn rising_edge(&self) -> RisingEdge {
        RisingEdge::new(self.clone())
    }

    pub fn spawn(
        &self,
        name: &str,
        future: impl Future<Output = TbResult<()>> + Send + 'static,
    ) -> JoinHandle {
        Task::spawn_from_future(&self.ready, future, name)
    }

    pub(crate) fn register_signal(&self, signal: Box<dyn Commit>) {
        self.state.with_mut(|s| s.signals.push(signal));
    }

    pub(crate) fn wait_edge(&self, waker: &Waker) {
        self.state.with_mut(|s| {
            if !s.edge_waiters.iter().any(|w| w.will_wake(waker)) {
                s.edge_waiters.push(waker.clone());
            }
        });
    }

    pub(crate) fn advance(&self) {
        let waiters = self.state.with_mut(|s| {
            s.cycle += 1;
            for signal in s.signals.iter() {
                signal.commit();
            }
            std::mem::take(&mut s.edge_waiters)
        });
        for waker in waiters {
            waker.wake();
        }
    }

    /// Runs `main` to completion and returns the number of cycles it took.
    ///
    /// Every task still alive afterwards (channel drivers, device models) is
    /// torn down, so a `Sim` runs exactly one test.
    pub fn run<F>(&self, name: &str, main: F) -> TbResult<u64>
    where
        F: Future<Output = TbResult<()>> + Send + 'static,
    {
        let (start, max_cycles) = self.state.with_mut(|s| (s.cycle, s.max_cycles));
        let mut handle = self.spawn(name, main);
        let result = loop {
            self.ready.run_once();
            if let Some(result) = handle.try_result() {
                break result;
            }
            let (cycle, idle) = self.state.with_mut(|s| (s.cycle, s.edge_waiters.is_empty()));
            if cycle - start >= max_cycles {
                warn!("{}: cycle limit of {} reached", name, max_cycles);
                break Err(TbError::Timeout {
                    name: name.to_string(),
                    cycles: max_cycles,
                });
            }
            if idle {
                break Err(TbError::Deadlock {
                    name: name.to_string(),
                    cycle,
                });
            }
            self.advance();
        };
        let cycles = self.cycle() - start;
        debug!("{}: finished after {} cycles", name, cycles);
        self.tear_down();
        result.map(|()| cycles)
    }

    fn tear_down(&self) {
        // dropping the wakers drops the suspended tasks and the Sim clones they hold
        let waiters = self.state.with_mut(|s| std::mem::take(&mut s.edge_waiters));
        drop(waiters);
        self.ready.clear();
    }
}
