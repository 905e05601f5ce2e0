//! Groups forwarded messages into posts.
//!
//! When a user forwards a multi-part post, the parts arrive as separate
//! messages within a few milliseconds of each other. Every forwarded message
//! joins the pending batch of its sender and then waits for the debounce
//! window. Only the call whose message was the last one to arrive finalizes the
//! batch; every earlier call returns [`Outcome::Deferred`].
//!
//! The pending map is guarded by a short lock that is never held across an
//! await, so concurrent calls for the same sender only ever see one batch.

use std::{collections::HashMap, time::Duration};

use tokio::sync::Mutex;

use crate::{domain::SenderIdentity, message::InboundMessage};

/// Default quiet period after the most recent forwarded message.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Messages that make up one logical post, in ascending message id order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub sender: SenderIdentity,
    pub messages: Vec<InboundMessage>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A later message for the same sender took over the batch.
    Deferred,
    Finalized(Batch),
}

struct PendingBatch {
    generation: u64,
    messages: Vec<InboundMessage>,
}

/// Everything behind the lock. Generations are handed out here so that the
/// newest generation in a batch always belongs to the last append.
#[derive(Default)]
struct Pending {
    next_generation: u64,
    batches: HashMap<SenderIdentity, PendingBatch>,
}

impl Pending {
    fn append(&mut self, sender: SenderIdentity, msg: InboundMessage) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        let batch = self.batches.entry(sender).or_insert_with(|| PendingBatch {
            generation,
            messages: Vec::new(),
        });
        batch.generation = generation;
        batch.messages.push(msg);
        generation
    }

    fn take_if_current(&mut self, sender: SenderIdentity, generation: u64) -> Option<PendingBatch> {
        let current = self.batches.get(&sender)?.generation;
        if current != generation {
            return None;
        }
        self.batches.remove(&sender)
    }
}

pub struct Aggregator {
    debounce: Duration,
    pending: Mutex<Pending>,
}

impl Aggregator {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Add `msg` to its sender's batch and wait out the debounce window.
    ///
    /// Messages that are not forwarded bypass batching entirely.
    pub async fn handle(&self, sender: SenderIdentity, msg: InboundMessage) -> Outcome {
        if !msg.is_forwarded {
            return Outcome::Finalized(Batch {
                sender,
                messages: vec![msg],
            });
        }

        let generation = self.pending.lock().await.append(sender, msg);

        tokio::time::sleep(self.debounce).await;

        // Compare-and-remove: only the newest arrival may take the batch.
        let Some(batch) = self.pending.lock().await.take_if_current(sender, generation) else {
            return Outcome::Deferred;
        };

        let mut messages = batch.messages;
        messages.sort_by_key(|m| m.id);
        tracing::debug!(
            sender = sender.0 .0,
            messages = messages.len(),
            "forward batch finalized"
        );

        Outcome::Finalized(Batch { sender, messages })
    }

    /// Number of messages currently waiting for `sender`.
    pub async fn pending_len(&self, sender: SenderIdentity) -> usize {
        self.pending
            .lock()
            .await
            .batches
            .get(&sender)
            .map_or(0, |batch| batch.messages.len())
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
