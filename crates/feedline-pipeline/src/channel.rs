//! An in-process, partitioned post-created channel.
//!
//! Events are routed to a partition by author, so one author's events keep
//! their publish order. Each partition hands out at most one delivery at a
//! time and keeps the event at its head until it is acknowledged, which gives
//! at-least-once delivery within the life of the process. Nothing survives a
//! restart; use the SQLite event log when that matters.
//!
//! Leases never expire here. A consumer that drops a delivery without acking
//! or nacking it leaves that partition blocked, and `receive` will not return
//! `None` after `close` until the partition is settled. The SQLite log gives
//! such deliveries back after its lease timeout.

use std::{
  collections::VecDeque,
  sync::{Mutex, MutexGuard},
};

use feedline_core::{
  event::{Delivery, DeliveryId, NackOutcome},
  post::{PostCreatedEvent, UserId},
  store::{EventConsumer, EventPublisher},
};
use tokio::sync::Notify;

use crate::error::MemoryError;

fn partition_for(author_id: UserId, partitions: usize) -> usize {
  author_id.rem_euclid(partitions as i64) as usize
}

struct Pending {
  offset:   u64,
  attempts: u32,
  event:    PostCreatedEvent,
}

#[derive(Default)]
struct Partition {
  next_offset: u64,
  queue:       VecDeque<Pending>,
  in_flight:   bool,
}

impl Partition {
  /// The head entry, if it is the one currently delivered as `offset`.
  fn in_flight_head(&mut self, offset: u64) -> Option<&mut Pending> {
    if !self.in_flight {
      return None;
    }
    self.queue.front_mut().filter(|p| p.offset == offset)
  }
}

struct State {
  partitions:   Vec<Partition>,
  dead_letters: Vec<PostCreatedEvent>,
  /// Partition the next lease scan starts from, for fairness.
  cursor:       usize,
  closed:       bool,
}

impl State {
  fn lease_next(&mut self) -> Option<Delivery> {
    let n = self.partitions.len();
    for step in 0..n {
      let index = (self.cursor + step) % n;
      let partition = &mut self.partitions[index];
      if partition.in_flight {
        continue;
      }
      let Some(head) = partition.queue.front_mut() else {
        continue;
      };

      head.attempts += 1;
      let delivery = Delivery {
        id:      DeliveryId { partition: index as u32, offset: head.offset },
        attempt: head.attempts,
        event:   head.event.clone(),
      };
      partition.in_flight = true;
      self.cursor = (index + 1) % n;
      return Some(delivery);
    }
    None
  }

  fn is_drained(&self) -> bool { self.partitions.iter().all(|p| p.queue.is_empty()) }
}

/// In-memory [`EventPublisher`] + [`EventConsumer`].
pub struct MemoryChannel {
  state:          Mutex<State>,
  notify:         Notify,
  max_deliveries: u32,
}

impl MemoryChannel {
  /// A channel with `partitions` ordered logs (at least one) that
  /// dead-letters an event after `max_deliveries` unsuccessful deliveries.
  pub fn new(partitions: usize, max_deliveries: u32) -> Self {
    let partitions = partitions.max(1);
    Self {
      state: Mutex::new(State {
        partitions:   (0..partitions).map(|_| Partition::default()).collect(),
        dead_letters: Vec::new(),
        cursor:       0,
        closed:       false,
      }),
      notify: Notify::new(),
      max_deliveries: max_deliveries.max(1),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Events that exhausted their delivery budget, in the order they died.
  pub fn dead_letters(&self) -> Vec<PostCreatedEvent> { self.lock().dead_letters.clone() }

  /// Events published but not yet acknowledged or dead-lettered.
  pub fn backlog(&self) -> usize { self.lock().partitions.iter().map(|p| p.queue.len()).sum() }
}

impl EventPublisher for MemoryChannel {
  type Error = MemoryError;

  async fn publish(&self, event: PostCreatedEvent) -> Result<(), MemoryError> {
    {
      let mut state = self.lock();
      if state.closed {
        return Err(MemoryError::Closed);
      }
      let index = partition_for(event.author_id, state.partitions.len());
      let partition = &mut state.partitions[index];
      let offset = partition.next_offset;
      partition.next_offset += 1;
      partition.queue.push_back(Pending { offset, attempts: 0, event });
    }
    self.notify.notify_waiters();
    Ok(())
  }
}

impl EventConsumer for MemoryChannel {
  type Error = MemoryError;

  async fn receive(&self) -> Result<Option<Delivery>, MemoryError> {
    loop {
      // Registered before inspecting the state, so a publish that lands in
      // between still wakes us.
      let notified = self.notify.notified();
      {
        let mut state = self.lock();
        if let Some(delivery) = state.lease_next() {
          return Ok(Some(delivery));
        }
        if state.closed && state.is_drained() {
          return Ok(None);
        }
      }
      notified.await;
    }
  }

  async fn ack(&self, id: DeliveryId) -> Result<(), MemoryError> {
    {
      let mut state = self.lock();
      let partition = state
        .partitions
        .get_mut(id.partition as usize)
        .ok_or(MemoryError::UnknownDelivery(id))?;
      if partition.in_flight_head(id.offset).is_none() {
        return Err(MemoryError::UnknownDelivery(id));
      }
      partition.queue.pop_front();
      partition.in_flight = false;
    }
    self.notify.notify_waiters();
    Ok(())
  }

  async fn nack(&self, id: DeliveryId) -> Result<NackOutcome, MemoryError> {
    let outcome = {
      let mut state = self.lock();
      let max_deliveries = self.max_deliveries;
      let partition = state
        .partitions
        .get_mut(id.partition as usize)
        .ok_or(MemoryError::UnknownDelivery(id))?;
      let head = partition
        .in_flight_head(id.offset)
        .ok_or(MemoryError::UnknownDelivery(id))?;

      let exhausted = head.attempts >= max_deliveries;
      partition.in_flight = false;
      if exhausted {
        let dead = partition.queue.pop_front().map(|p| p.event);
        state.dead_letters.extend(dead);
        NackOutcome::DeadLettered
      } else {
        NackOutcome::Redeliver
      }
    };

    if outcome == NackOutcome::DeadLettered {
      tracing::warn!(
        partition = id.partition,
        offset = id.offset,
        max_deliveries = self.max_deliveries,
        "event exhausted its deliveries; dead-lettered"
      );
    }
    self.notify.notify_waiters();
    Ok(outcome)
  }

  fn close(&self) {
    self.lock().closed = true;
    self.notify.notify_waiters();
  }
}
