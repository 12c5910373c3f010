use herald_core::types::{Destination, DestinationId};

use crate::handle::TaskHandle;
use crate::transport::Transport;
use crate::worker::Worker;

/// Submission facade over a [`Worker`]-owned [`Transport`] client.
///
/// Every method returns immediately with a [`TaskHandle`]; nothing here
/// blocks the caller. Cheap to clone — clones share the same worker.
pub struct TransportFacade<C: Transport + 'static> {
    worker: Worker<C>,
}

impl<C: Transport + 'static> Clone for TransportFacade<C> {
    fn clone(&self) -> Self {
        Self {
            worker: self.worker.clone(),
        }
    }
}

impl<C: Transport + 'static> TransportFacade<C> {
    pub fn new(worker: Worker<C>) -> Self {
        Self { worker }
    }

    pub fn connect(&self, identity: Option<String>) -> TaskHandle<()> {
        self.worker
            .submit(move |client| async move { client.connect(identity).await })
    }

    pub fn is_authorized(&self) -> TaskHandle<bool> {
        self.worker
            .submit(|client| async move { client.is_authorized().await })
    }

    pub fn request_login_code(&self, identity: String) -> TaskHandle<()> {
        self.worker
            .submit(move |client| async move { client.request_login_code(identity).await })
    }

    pub fn complete_login(&self, code: String, second_factor: Option<String>) -> TaskHandle<()> {
        self.worker
            .submit(move |client| async move { client.complete_login(code, second_factor).await })
    }

    pub fn list_destinations(&self) -> TaskHandle<Vec<Destination>> {
        self.worker
            .submit(|client| async move { client.list_destinations().await })
    }

    pub fn send(&self, destination: DestinationId, text: String) -> TaskHandle<()> {
        self.worker
            .submit(move |client| async move { client.send(destination, text).await })
    }
}
