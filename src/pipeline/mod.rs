//! Record Pipeline Module
//!
//! The shared, internally synchronized structures that connect inbound framers
//! to outbound workers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  acquire   ┌─────────────┐  release   ┌─────────────┐
//! │   Framer    │<───────────│ BufferPool  │<───────────│   Worker    │
//! └──────┬──────┘            └─────────────┘            └──────▲──────┘
//!        │                                                     │
//!        │ enqueue          ┌─────────────────┐        dequeue │
//!        └─────────────────>│   RecordQueue   │────────────────┘
//!                           │ (bounded FIFO)  │
//!                           └─────────────────┘
//! ```
//!
//! Nothing else is shared between framers and workers.

pub mod pool;
pub mod queue;

// Re-export commonly used types
pub use pool::{BufferPool, PoolSnapshot};
pub use queue::{QueueClosed, QueueGauge, Record, RecordQueue, RecordReceiver, RecordSender};
