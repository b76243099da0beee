//! Streaming chat relay.
//!
//! Admits a chat turn, forwards the conversation upstream and re-emits the
//! generated text to the caller as it arrives. The assistant reply is stored
//! only when the provider signals a clean end-of-stream.

mod frame;
mod pump;
mod service;

pub use frame::{Frame, FrameDecoder};
pub use pump::{StreamEnd, pump};
pub use service::{
    ChatRelay, ChatRequest, RelayError, RelayOutcome, RelayPolicy, RelayStream, ThrottleNotice,
};
