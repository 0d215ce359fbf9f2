//! Per-workload log distribution
//!
//! ```text
//! viewer ──► Registry.subscribe(id) ──► Hub (one per workload)
//!                                        ├─ ReplayBuffer (last N lines)
//!                                        ├─ subscribers (bounded queues)
//!                                        └─ reader task ◄── LogSource.open(id)
//! ```
//!
//! The reader appends each line to the buffer and offers it to every
//! subscriber under one lock. A subscriber whose queue is full is dropped;
//! nobody else waits on it.

pub mod buffer;
pub mod hub;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::ReplayBuffer;
pub use hub::{Delivery, EndReason, Hub, HubStats, HubStatus, SubscriberId, Subscription};
pub use registry::Registry;
pub use session::{Session, SessionEnd};
