//! HTTP probe engine.
//!
//! [`Checker::check`] performs one timed request and returns a fully
//! populated [`ProbeResult`]: DNS / TCP connect / TLS handshake / TTFB
//! sub-durations, status and content validation, bytes received and leaf
//! certificate metadata. The engine dials its own connections so each
//! phase can be timed individually; connections are kept in a bounded
//! per-host idle pool, and a probe served from the pool reports zero for
//! the phases it skipped.

mod checker;
mod conn;
mod result;

pub use checker::Checker;
pub use result::ProbeResult;
