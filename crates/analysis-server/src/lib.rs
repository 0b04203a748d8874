// lib.rs - Library root for the analysis server.
//
// The binary in main.rs only parses arguments and hands off to `protocol`.
// Everything else lives here so tests/ and benches/ can use it directly.

pub mod config;
pub mod engine;
pub mod error;
pub mod notification;
pub mod operation;
pub mod perf;
pub mod protocol;
pub mod server;
pub mod source;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use config::ServerConfig;
pub use engine::{AnalysisContext, AnalysisEngine};
pub use error::{ServerError, ServerErrorCode};
pub use notification::{AnalysisServerListener, NotificationKind, SourceSet};
pub use server::AnalysisServer;
pub use source::Source;
