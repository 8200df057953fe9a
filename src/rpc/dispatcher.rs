//! RPC dispatcher — outbound call queue and inbound demultiplexer.
//!
//! The dispatcher sits between the session engine and a
//! [`Transport`](crate::transport::Transport). Outbound calls are encoded
//! eagerly into framed packets and drained through non-blocking writes
//! (partial writes are retained across ticks). Inbound bytes stream into
//! the [`FrameDecoder`] and surface as typed
//! [`ServerMessage`](crate::proto::messages::ServerMessage)s.
//!
//! Only the tick thread touches the dispatcher; application-thread APIs
//! communicate through dirty slots and queues drained on the next tick.

use std::collections::VecDeque;

use log::{debug, warn};

use super::codec::{FrameDecoder, encode_frame};
use crate::error::{Error, Result};
use crate::proto::PROTO_VERSION;
use crate::proto::messages::{DeviceMessage, ServerMessage};
use crate::transport::Transport;

pub struct Dispatcher {
    decoder: FrameDecoder,
    outbox: VecDeque<Vec<u8>>,
    /// Bytes of the front outbox frame already handed to the transport.
    front_written: usize,
    next_rr_id: u32,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            decoder: FrameDecoder::new(),
            outbox: VecDeque::new(),
            front_written: 0,
            next_rr_id: 1,
        }
    }

    fn alloc_rr_id(&mut self) -> u32 {
        let id = self.next_rr_id;
        self.next_rr_id = self.next_rr_id.wrapping_add(1);
        id
    }

    /// Encode and enqueue an outbound call.
    ///
    /// Acceptance here is the point at which a dirty slot may be marked
    /// clean: the frame is owned by the dispatcher and will be written as
    /// soon as the transport takes it.
    pub fn queue(&mut self, msg: &DeviceMessage) -> Result<()> {
        let payload = msg.encode();
        let rr_id = self.alloc_rr_id();
        let frame = encode_frame(PROTO_VERSION, rr_id, msg.call_id(), &payload)?;
        debug!("srpc: queue call_id={} rr_id={}", msg.call_id(), rr_id);
        self.outbox.push_back(frame);
        Ok(())
    }

    /// Write pending outbound bytes until the transport would block.
    pub fn flush(&mut self, link: &mut dyn Transport) -> Result<()> {
        while let Some(front) = self.outbox.front() {
            let n = link
                .send(&front[self.front_written..])
                .map_err(Error::Transport)?;
            if n == 0 {
                // Transport would block; retry next tick.
                break;
            }
            self.front_written += n;
            if self.front_written == front.len() {
                self.outbox.pop_front();
                self.front_written = 0;
            }
        }
        Ok(())
    }

    /// One dispatcher pass: flush pending writes, then drain all ready
    /// inbound frames into typed messages.
    ///
    /// An error return means the stream or transport is beyond recovery;
    /// the session treats it as connection loss.
    pub fn iterate(&mut self, link: &mut dyn Transport) -> Result<Vec<ServerMessage>> {
        self.flush(link)?;

        let mut buf = [0u8; 2048];
        loop {
            match link.recv(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.decoder.feed(&buf[..n])?,
                Err(e) => return Err(Error::Transport(e)),
            }
        }

        let mut messages = Vec::new();
        while let Some(frame) = self.decoder.pop() {
            match ServerMessage::decode(frame.call_id, &frame.data) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!("srpc: malformed payload for call_id={}: {e}", frame.call_id);
                    return Err(e);
                }
            }
        }
        Ok(messages)
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Drop all in-flight state (transport reconnect).
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.outbox.clear();
        self.front_written = 0;
    }
}
