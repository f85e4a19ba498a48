//! loralink-test-harness: test utilities and mock transports for loralink.
//!
//! Provides [`MockTransport`] for deterministic unit testing of the framing
//! and session layers without node hardware, plus [`MockController`], a
//! cloneable handle that keeps scripting and inspection access after the
//! transport itself has been handed to a session.

pub mod mock_link;

pub use mock_link::{MockController, MockTransport};
