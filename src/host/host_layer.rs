// The host module contains adapters for the out-of-scope chat platform and
// external collaborators. Nothing here depends on a real network client;
// `LoggingChatApi` is the demo/test-double that lets the rest of the crate
// build and run without platform credentials.

#[path = "logging_client.rs"]
pub mod logging_client;

#[path = "tracing_spam_logger.rs"]
pub mod tracing_spam_logger;
