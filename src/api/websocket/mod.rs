//! WebSocket handlers
//!
//! Per-viewer queues are bounded; a viewer that cannot keep up is
//! disconnected instead of stalling the broadcast.

pub mod logs;
