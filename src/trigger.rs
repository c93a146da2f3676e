use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::sim::Sim;

/// Resolves on the next rising clock edge after it is first polled.
///
/// A task can be polled without its edge having happened (it may have been
/// woken twice in one round), so the trigger remembers the cycle it waits for
/// and re-registers until that cycle is reached.
pub struct RisingEdge {
    sim: Sim,
    target: Option<u64>,
}

impl RisingEdge {
    pub(crate) fn new(sim: Sim) -> Self {
        RisingEdge { sim, target: None }
    }
}

impl Future for RisingEdge {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let now = self.sim.cycle();
        let target = *self.target.get_or_insert(now + 1);
        if now >= target {
            Poll::Ready(())
        } else {
            self.sim.wait_edge(cx.waker());
            Poll::Pending
        }
    }
}
