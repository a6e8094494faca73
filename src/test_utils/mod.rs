//! Helpers shared by unit tests and, behind the `test-util` feature, by
//! the integration tests.

mod collecting_handler;
mod scripted_connector;
mod shared_buf;

pub use collecting_handler::CollectingHandler;
pub use scripted_connector::{ScriptedConnector, ScriptedWrite};
pub use shared_buf::SharedBuf;
