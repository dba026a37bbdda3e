//! Delivery envelopes handed out by an event channel.

use serde::{Deserialize, Serialize};

use crate::post::PostCreatedEvent;

/// Locates a delivered event inside its channel so it can be acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId {
  pub partition: u32,
  pub offset:    u64,
}

/// One delivery of an event. The same event may be delivered several times;
/// `attempt` starts at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
  pub id:      DeliveryId,
  pub attempt: u32,
  pub event:   PostCreatedEvent,
}

/// What the channel did with a negatively acknowledged delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
  /// The event will be delivered again.
  Redeliver,
  /// The redelivery budget is spent; the event was moved aside.
  DeadLettered,
}
