#![forbid(unsafe_code)]

pub mod decode;
pub mod event;
pub mod reply;

pub use decode::{DecodeError, decode_frame, decode_message, decode_user, decode_value};
pub use event::{Event, EventType, Ignored, NickChange, Ping, Snapshot};
pub use reply::PingReply;
