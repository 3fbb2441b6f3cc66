//! Framing Module
//!
//! Converts raw inbound bytes into records. The proxy never looks inside a
//! record; the only thing it knows about the payload is where newlines are.
//!
//! ## Boundaries
//!
//! Boundaries are per read window, not per line: everything up to the last
//! newline of a window travels as one record. Downstream consumers that need
//! one line per write must split again themselves.
//!
//! ## Example
//!
//! ```
//! use linefan::framing::LineFramer;
//! use linefan::pipeline::BufferPool;
//! use std::sync::Arc;
//!
//! let mut framer = LineFramer::new(Arc::new(BufferPool::new()));
//!
//! let record = framer.push(b"a\nb\nc").unwrap();
//! assert_eq!(record.as_bytes(), b"a\nb\n");
//! assert_eq!(framer.residual(), b"c");
//! ```

pub mod framer;

pub use framer::{FramerSummary, LineFramer, StopReason, WINDOW_SIZE};
