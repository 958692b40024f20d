//! HTTP server and reader/fetcher glue binding idlescope-core to the
//! outside world. Exposed as a library so integration tests can drive
//! the router directly.

pub mod cli;
pub mod fetcher;
pub mod reader;
pub mod server;
