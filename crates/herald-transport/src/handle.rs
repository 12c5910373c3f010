use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::TransportError;

/// Pollable reference to the eventual outcome of a submitted operation.
///
/// The completed outcome is cached on first observation, so `is_done()` and
/// `wait()` may be called any number of times before `result()` consumes it.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TransportError>>,
    outcome: Option<Result<T, TransportError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, TransportError>>) -> Self {
        Self { rx, outcome: None }
    }

    /// Non-blocking completion check, callable from any thread.
    ///
    /// A worker that died before answering counts as completed with
    /// [`TransportError::WorkerGone`].
    pub fn is_done(&mut self) -> bool {
        if self.outcome.is_none() {
            match self.rx.try_recv() {
                Ok(outcome) => self.outcome = Some(outcome),
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.outcome = Some(Err(TransportError::WorkerGone));
                }
            }
        }
        self.outcome.is_some()
    }

    /// Await completion for at most `timeout`. Returns whether the operation
    /// finished; on `false` the handle stays pollable and the operation keeps
    /// running on the worker.
    pub async fn wait(&mut self, timeout: Duration) -> bool {
        if self.outcome.is_some() {
            return true;
        }
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => {
                self.outcome = Some(outcome);
                true
            }
            Ok(Err(_closed)) => {
                self.outcome = Some(Err(TransportError::WorkerGone));
                true
            }
            Err(_elapsed) => false,
        }
    }

    /// Take the outcome.
    ///
    /// Contract: only call after `is_done()` (or a successful `wait()`)
    /// reported completion. Calling earlier is a caller bug, not a condition
    /// the handle recovers from.
    ///
    /// # Panics
    ///
    /// Panics when the operation has not completed.
    pub fn result(mut self) -> Result<T, TransportError> {
        assert!(
            self.is_done(),
            "TaskHandle::result() called before completion"
        );
        self.outcome.take().expect("outcome present after is_done()")
    }
}
