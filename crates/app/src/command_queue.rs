//! Bounded command queue and the dispatcher draining it.
//!
//! Any producer (HTTP handler, fired rule, device follow-up) submits
//! [`SwitchRequest`]s; a single dispatcher task resolves the target names
//! and hands the request to each device, independently of the scheduler.

use std::sync::Arc;

use glowhub_domain::request::SwitchRequest;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::isolate::isolate;
use crate::registry::Registry;

/// Default number of requests the queue holds before producers wait.
pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("command queue is closed")]
    Closed,
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    sender: mpsc::Sender<SwitchRequest>,
}

/// Consumer side of the queue.
#[derive(Debug)]
pub struct CommandReceiver {
    receiver: mpsc::Receiver<SwitchRequest>,
}

/// Create a queue holding at most `capacity` pending requests.
#[must_use]
pub fn bounded(capacity: usize) -> (CommandQueue, CommandReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (CommandQueue { sender }, CommandReceiver { receiver })
}

impl CommandQueue {
    /// Enqueue a request, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the dispatcher is gone.
    pub async fn submit(&self, request: SwitchRequest) -> Result<(), QueueError> {
        debug!(request = %request, "request queued");
        self.sender
            .send(request)
            .await
            .map_err(|_| QueueError::Closed)
    }
}

impl CommandReceiver {
    pub async fn recv(&mut self) -> Option<SwitchRequest> {
        self.receiver.recv().await
    }
}

/// Hand `request` to every device it names.
///
/// Unknown names and rejected values are logged and skipped. Returns the
/// number of devices that accepted the request.
pub fn dispatch(registry: &Registry, request: &SwitchRequest) -> usize {
    let mut accepted = 0;
    for name in request.targets() {
        let Some(device) = registry.get(name) else {
            warn!(device = name, request = %request, "unknown device, request dropped");
            continue;
        };
        match isolate("process_request", name, || device.process_request(request)) {
            Some(Ok(())) => accepted += 1,
            Some(Err(err)) => warn!(device = name, error = %err, "request rejected"),
            None => {}
        }
    }
    accepted
}

/// Drains the queue into the registry.
pub struct Dispatcher {
    registry: Arc<Registry>,
    receiver: CommandReceiver,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<Registry>, receiver: CommandReceiver) -> Self {
        Self { registry, receiver }
    }

    /// Run until every producer handle is dropped.
    pub async fn run(mut self) {
        info!("dispatcher started");
        while let Some(request) = self.receiver.recv().await {
            dispatch(&self.registry, &request);
        }
        info!("dispatcher stopped, queue closed");
    }
}
