use futures::{
    future::{BoxFuture, FutureExt},
    task::{waker_ref, ArcWake, Context, Poll},
};
use futures_channel::oneshot;
use queues::{IsQueue, Queue};
use std::{future::Future, pin::Pin, sync::Arc};

use crate::tb_obj::TbObj;
use crate::{TbError, TbResult};

/// Tasks woken since the last poll round, in wake-up order.
#[derive(Clone)]
pub(crate) struct ReadyQueue(TbObj<Queue<Arc<Task>>>);

impl ReadyQueue {
    pub fn new() -> Self {
        ReadyQueue(TbObj::new(Queue::new()))
    }

    pub fn schedule(&self, task: Arc<Task>) {
        self.0.with_mut(|q| {
            // an unbounded queue never rejects
            let _ = q.add(task);
        });
    }

    fn next_task(&self) -> Option<Arc<Task>> {
        self.0.with_mut(|q| q.remove().ok())
    }

    /// Polls tasks until none is ready anymore.
    pub fn run_once(&self) {
        while let Some(task) = self.next_task() {
            process_task(task);
        }
    }

    pub fn clear(&self) {
        self.0.with_mut(|q| *q = Queue::new());
    }
}

fn process_task(task: Arc<Task>) {
    let mut fut_slot = task.future.get();
    // a finished task can still be woken by a stale waker
    if let Some(mut fut) = fut_slot.take() {
        let waker = waker_ref(&task);
        let context = &mut Context::from_waker(&waker);
        match fut.as_mut().poll(context) {
            Poll::Pending => *fut_slot = Some(fut),
            Poll::Ready(result) => {
                drop(fut_slot);
                if let Some(tx) = task.join_tx.with_mut(|tx| tx.take()) {
                    // nobody listening is fine, the result is simply dropped
                    let _ = tx.send(result);
                }
            }
        }
    }
}

pub(crate) struct Task {
    future: TbObj<Option<BoxFuture<'static, TbResult<()>>>>,
    name: String,
    join_tx: TbObj<Option<oneshot::Sender<TbResult<()>>>>,
    queue: ReadyQueue,
}

impl Task {
    pub(crate) fn spawn_from_future(
        queue: &ReadyQueue,
        future: impl Future<Output = TbResult<()>> + Send + 'static,
        name: &str,
    ) -> JoinHandle {
        let (task, join_handle) = Task::new(queue, future.boxed(), name);
        queue.schedule(task);
        join_handle
    }

    fn new(
        queue: &ReadyQueue,
        fut: BoxFuture<'static, TbResult<()>>,
        name: &str,
    ) -> (Arc<Self>, JoinHandle) {
        let (tx, rx) = oneshot::channel::<TbResult<()>>();
        let task = Arc::new(Self {
            future: TbObj::new(Some(fut)),
            name: name.to_string(),
            join_tx: TbObj::new(Some(tx)),
            queue: queue.clone(),
        });
        let join_handle = JoinHandle {
            join_rx: rx,
            name: task.name.clone(),
        };
        (task, join_handle)
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.queue.schedule(arc_self.clone());
    }
}

/// Resolves to the task's result. A task torn down before it finished
/// resolves to `TbError::TaskDropped`; tasks cannot be cancelled.
pub struct JoinHandle {
    join_rx: oneshot::Receiver<TbResult<()>>,
    name: String,
}

impl JoinHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Result of the task if it already finished, without waiting.
    pub(crate) fn try_result(&mut self) -> Option<TbResult<()>> {
        match self.join_rx.try_recv() {
            Ok(result) => result,
            Err(_) => Some(Err(TbError::TaskDropped(self.name.clone()))),
        }
    }
}

impl Future for JoinHandle {
    type Output = TbResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TbError::TaskDropped(self.name.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}
