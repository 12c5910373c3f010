//! Scriptable in-memory transport for engine tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use herald_core::types::{Destination, DestinationId, DestinationKind};
use herald_transport::{Transport, TransportError, TransportFacade, Worker};

/// What the mock does with one send attempt. Destinations with an exhausted
/// (or absent) script succeed.
#[derive(Clone)]
pub enum SendOutcome {
    Ok,
    RateLimited(u32),
    Fail(&'static str),
    /// Sleep before answering, to trip the engine's bounded wait.
    Hang(Duration),
}

pub struct SendRecord {
    pub destination: DestinationId,
    pub text: String,
    pub at: Instant,
}

#[derive(Default)]
pub struct MockScript {
    pub outcomes: HashMap<DestinationId, VecDeque<SendOutcome>>,
    pub destinations: Vec<Destination>,
}

pub struct MockTransport {
    script: RefCell<MockScript>,
    log: Arc<Mutex<Vec<SendRecord>>>,
}

#[async_trait(?Send)]
impl Transport for MockTransport {
    async fn connect(&self, _identity: Option<String>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, TransportError> {
        Ok(true)
    }

    async fn request_login_code(&self, _identity: String) -> Result<(), TransportError> {
        Ok(())
    }

    async fn complete_login(
        &self,
        _code: String,
        second_factor: Option<String>,
    ) -> Result<(), TransportError> {
        match second_factor {
            Some(_) => Ok(()),
            None => Err(TransportError::AuthChallenge),
        }
    }

    async fn list_destinations(&self) -> Result<Vec<Destination>, TransportError> {
        Ok(self.script.borrow().destinations.clone())
    }

    async fn send(&self, destination: DestinationId, text: String) -> Result<(), TransportError> {
        let outcome = self
            .script
            .borrow_mut()
            .outcomes
            .get_mut(&destination)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(SendOutcome::Ok);

        self.log.lock().unwrap().push(SendRecord {
            destination,
            text,
            at: Instant::now(),
        });

        match outcome {
            SendOutcome::Ok => Ok(()),
            SendOutcome::RateLimited(wait_secs) => Err(TransportError::RateLimited { wait_secs }),
            SendOutcome::Fail(reason) => Err(TransportError::SendFailed(reason.into())),
            SendOutcome::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

pub struct Fixture {
    pub facade: TransportFacade<MockTransport>,
    pub log: Arc<Mutex<Vec<SendRecord>>>,
}

/// Spin up a worker owning a scripted mock and return its facade plus the
/// shared send log.
pub fn mock_facade(script: MockScript) -> Fixture {
    let log = Arc::new(Mutex::new(Vec::new()));
    let worker_log = Arc::clone(&log);
    let worker = Worker::spawn("mock-transport", move || MockTransport {
        script: RefCell::new(script),
        log: worker_log,
    })
    .expect("spawn mock transport worker");

    Fixture {
        facade: TransportFacade::new(worker),
        log,
    }
}

pub fn dest(id: DestinationId, declared_cooldown: u32) -> Destination {
    Destination {
        id,
        title: format!("group-{id}"),
        kind: DestinationKind::Group,
        declared_cooldown_secs: declared_cooldown,
        cooldown_remaining_secs: 0,
        eligible: true,
        excluded: false,
    }
}
