use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicUsize, Ordering},
};

use futures::Stream;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use super::ConfigChangeEvent;
use crate::config::{ConfigChangeFlags, ConfigError};

const COMMAND_QUEUE: usize = 100;

/// Commands sent to the broadcast actor task
pub enum BroadcastCommand {
    /// Subscribe to changes touching any aspect in `mask`
    Subscribe {
        id: usize,
        mask: ConfigChangeFlags,
        sender: UnboundedSender<ConfigChangeEvent>,
    },
    /// Remove a subscription by ID
    Unsubscribe { id: usize },
    /// Deliver a change to every interested subscriber
    Broadcast(ConfigChangeEvent),
}

struct ActorSubscription {
    id: usize,
    mask: ConfigChangeFlags,
    sender: UnboundedSender<ConfigChangeEvent>,
}

/// A subscription handle that unsubscribes when dropped.
pub struct Subscription {
    id: usize,
    service: BroadcastService,
    receiver: UnboundedReceiver<ConfigChangeEvent>,
}

/// Handle to the broadcast actor.
///
/// The actor task owns all subscriber state and processes commands
/// sequentially via message passing. It is started on the first
/// subscribe or broadcast, so a handle can be built outside a runtime.
#[derive(Clone)]
pub struct BroadcastService {
    command_tx: Arc<OnceLock<Sender<BroadcastCommand>>>,
    next_id: Arc<AtomicUsize>,
}

impl BroadcastService {
    /// Creates a new broadcast service handle.
    pub fn new() -> Self {
        Self {
            command_tx: Arc::new(OnceLock::new()),
            next_id: Arc::new(AtomicUsize::new(1)),
        }
    }

    // Only reached from async methods, so a runtime is always current.
    fn commands(&self) -> &Sender<BroadcastCommand> {
        self.command_tx.get_or_init(|| {
            let (command_tx, mut command_rx) = mpsc::channel(COMMAND_QUEUE);
            tokio::spawn(async move {
                broadcast_actor_loop(&mut command_rx).await;
            });
            command_tx
        })
    }

    /// Subscribe to changes intersecting `mask`.
    ///
    /// # Errors
    /// Returns `ConfigError::ServiceUnavailable` if the broadcast service is not running.
    pub async fn subscribe(&self, mask: ConfigChangeFlags) -> Result<Subscription, ConfigError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.commands()
            .send(BroadcastCommand::Subscribe {
                id,
                mask,
                sender: tx,
            })
            .await
            .map_err(|_| unavailable())?;

        Ok(Subscription {
            id,
            service: self.clone(),
            receiver: rx,
        })
    }

    /// Deliver a change to every subscriber whose mask intersects its flags.
    ///
    /// # Errors
    /// Returns `ConfigError::ServiceUnavailable` if the broadcast service is not running.
    pub async fn broadcast(&self, change: ConfigChangeEvent) -> Result<(), ConfigError> {
        self.commands()
            .send(BroadcastCommand::Broadcast(change))
            .await
            .map_err(|_| unavailable())
    }
}

impl Default for BroadcastService {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable() -> ConfigError {
    ConfigError::ServiceUnavailable {
        service: "broadcast".to_string(),
        details: "Broadcast service is not running".to_string(),
    }
}

impl Subscription {
    /// Receive the next change, `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<ConfigChangeEvent> {
        self.receiver.recv().await
    }

    /// Turn the subscription into a stream of changes.
    pub fn into_stream(self) -> impl Stream<Item = ConfigChangeEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let change = subscription.recv().await?;
            Some((change, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(commands) = self.service.command_tx.get() {
            let _ = commands.try_send(BroadcastCommand::Unsubscribe { id: self.id });
        }
    }
}

async fn broadcast_actor_loop(command_rx: &mut Receiver<BroadcastCommand>) {
    let mut subscriptions: Vec<ActorSubscription> = Vec::new();

    while let Some(command) = command_rx.recv().await {
        match command {
            BroadcastCommand::Subscribe { id, mask, sender } => {
                subscriptions.push(ActorSubscription { id, mask, sender });
            }

            BroadcastCommand::Unsubscribe { id } => {
                subscriptions.retain(|sub| sub.id != id);
            }

            BroadcastCommand::Broadcast(change) => {
                subscriptions.retain(|sub| {
                    if !change.affects(sub.mask) {
                        return true;
                    }
                    let delivered = sub.sender.send(change.clone()).is_ok();
                    if !delivered {
                        debug!(subscriber = sub.id, "Config subscriber gone");
                    }
                    delivered
                });
            }
        }
    }
}
