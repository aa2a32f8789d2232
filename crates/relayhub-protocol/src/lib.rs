//! Wire-level plumbing shared by the executor and the transformers: byte
//! streams split into lines, and SSE frame encoding/decoding helpers.

pub mod lines;
pub mod sse;

pub use lines::LineBuffer;
pub use sse::{data_payload, encode_event, is_done_payload};
