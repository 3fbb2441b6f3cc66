//! Outbound Worker Module
//!
//! Workers are the outbound half of the proxy. Each one owns a single
//! connection to one target at a time and is responsible for eventually
//! delivering every record it takes off the queue.
//!
//! ## Architecture
//!
//! ```text
//!              ┌──────────────────┐
//!              │   RecordQueue    │
//!              └────────┬─────────┘
//!                       │ dequeue
//!          ┌────────────┼────────────┐
//!          ▼            ▼            ▼
//!    ┌──────────┐ ┌──────────┐ ┌──────────┐
//!    │ worker-1 │ │ worker-2 │ │ worker-N │
//!    │  Link    │ │  Link    │ │  Link    │
//!    └────┬─────┘ └────┬─────┘ └────┬─────┘
//!         ▼            ▼            ▼
//!     target A     target B     target A      (primary = id % targets)
//! ```
//!
//! ## Failure Handling
//!
//! - Dial failures back off (2s → 30s) and move to a random target
//! - Write failures drop the connection and retry the same record
//! - Connections are recycled every 5 minutes, starting from the primary

pub mod backoff;
pub mod link;
pub mod manager;

// Re-export commonly used types
pub use backoff::Backoff;
pub use link::{Link, LinkError};
pub use manager::{Worker, WorkerConfig, WorkerState, WorkerSummary};
