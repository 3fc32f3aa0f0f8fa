//! `tn-ddp` — wire types for the TrueNAS middleware protocol.
//!
//! The middleware speaks a DDP-flavored JSON protocol over a single
//! duplexed channel: every frame is a JSON object tagged by a `msg`
//! field. Method calls carry a string correlation `id`; the matching
//! `result` frame echoes it back. Long-running methods answer with a
//! bare integer job id instead of a final value.
//!
//! This crate is pure data: serde types for the frames, the two call
//! parameter forms, the middleware error payload, and the job status
//! structures. All I/O lives in `tn-client`.

pub mod error;
pub mod job;
pub mod message;
pub mod params;

pub use error::RpcError;
pub use job::{JobId, JobProgress, JobSnapshot, JobState};
pub use message::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
pub use params::Params;
