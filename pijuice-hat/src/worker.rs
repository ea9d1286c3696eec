//! Async front for the blocking device interface
//!
//! [`PiJuiceHandle::spawn`] moves a [`PiJuice`] onto its own OS thread.
//! Callers send closures over a channel and await the result, so bus I/O
//! never blocks an async executor. The thread exits once every handle is
//! dropped.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::PiJuiceError;
use crate::{PiJuice, Result};

/// Requests waiting for the worker before `call` starts to wait
const REQUEST_QUEUE_SIZE: usize = 16;

type Job = Box<dyn FnOnce(&PiJuice) + Send>;

/// Cloneable handle to a HAT owned by a worker thread
#[derive(Clone)]
pub struct PiJuiceHandle {
    request_tx: mpsc::Sender<Job>,
}

impl PiJuiceHandle {
    pub fn spawn(pj: PiJuice) -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_SIZE);
        let name = format!("pijuice-{}", pj.location());
        std::thread::Builder::new()
            .name(name)
            .spawn(move || worker(pj, request_rx))?;
        Ok(Self { request_tx })
    }

    /// Run `f` on the worker thread and await its result
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&PiJuice) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        let job: Job = Box::new(move |pj| {
            let _ = response_tx.send(f(pj));
        });
        self.request_tx
            .send(job)
            .await
            .map_err(|_| PiJuiceError::WorkerStopped)?;
        response_rx.await.map_err(|_| PiJuiceError::WorkerStopped)?
    }
}

fn worker(pj: PiJuice, mut rx: mpsc::Receiver<Job>) {
    debug!("PiJuice worker started on {}", pj.location());
    while let Some(job) = rx.blocking_recv() {
        job(&pj);
    }
    debug!("PiJuice worker stopped");
}
