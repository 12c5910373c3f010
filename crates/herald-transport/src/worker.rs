use std::future::Future;
use std::rc::Rc;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::error::TransportError;
use crate::handle::TaskHandle;

type Job<C> = Box<dyn FnOnce(Rc<C>) + Send>;

/// Dedicated background executor owning the remote-transport client.
///
/// One OS thread runs a current-thread Tokio runtime inside a [`LocalSet`];
/// the client lives behind an `Rc` on that thread and is never touched from
/// anywhere else, so it may freely be `!Send`. Submitted operations are
/// spawned as local tasks: logically sequential submissions start in
/// submission order, while independent operations interleave cooperatively.
///
/// Dropping every `Worker` clone closes the channel and lets the thread
/// exit; operations still in flight at that point are abandoned and their
/// handles resolve to [`TransportError::WorkerGone`].
///
/// [`LocalSet`]: tokio::task::LocalSet
pub struct Worker<C> {
    tx: mpsc::UnboundedSender<Job<C>>,
}

impl<C> Clone for Worker<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C: 'static> Worker<C> {
    /// Start the worker thread. `make_client` runs once on that thread to
    /// construct the client it will own.
    pub fn spawn<F>(name: &str, make_client: F) -> std::io::Result<Self>
    where
        F: FnOnce() -> C + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<C>>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let thread_name = name.to_string();
        std::thread::Builder::new().name(thread_name.clone()).spawn(move || {
            let local = tokio::task::LocalSet::new();
            local.block_on(&runtime, async move {
                let client = Rc::new(make_client());
                while let Some(job) = rx.recv().await {
                    job(Rc::clone(&client));
                }
            });
            info!(worker = %thread_name, "transport worker exited");
        })?;

        Ok(Self { tx })
    }

    /// Submit an operation against the client and return a pollable handle.
    ///
    /// The closure runs on the worker thread; its future needs no `Send`
    /// bound because it never leaves that thread.
    pub fn submit<T, F, Fut>(&self, op: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(Rc<C>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TransportError>> + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job<C> = Box::new(move |client| {
            tokio::task::spawn_local(async move {
                let outcome = op(client).await;
                // Receiver may have been dropped by an uninterested caller.
                let _ = done_tx.send(outcome);
            });
        });
        // On a dead worker the job (and its oneshot sender) is dropped here,
        // which resolves the handle to WorkerGone.
        let _ = self.tx.send(job);
        TaskHandle::new(done_rx)
    }
}
