//! SRPC plumbing: packet framing and the call dispatcher.

pub mod codec;
pub mod dispatcher;

pub use codec::{Frame, FrameDecoder, encode_frame};
pub use dispatcher::Dispatcher;
