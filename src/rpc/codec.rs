//! SRPC data-packet framing.
//!
//! Wire format:
//! ```text
//! ┌───────────┬─────────┬──────────┬───────────┬─────────────┬──────────┬───────────┐
//! │ "SUPLA"   │ Version │ RrId     │ CallId    │ DataSize    │ Data     │ "SUPLA"   │
//! │ (5B tag)  │ (1B)    │ (LE u32) │ (LE u32)  │ (LE u32)    │ (N B)    │ (5B tag)  │
//! └───────────┴─────────┴──────────┴───────────┴─────────────┴──────────┴───────────┘
//! ```
//!
//! The decoder is a resumable state machine fed from non-blocking reads:
//! bytes may arrive in any fragmentation and complete packets are queued
//! until popped. A malformed tag or an oversized length is unrecoverable —
//! the session layer tears the connection down and reconnects.

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Packet start/end marker.
pub const TAG: [u8; 5] = *b"SUPLA";

/// Header size: tag + version + rr_id + call_id + data_size.
const HEADER_SIZE: usize = 18;

/// Maximum packet payload size (protects against memory exhaustion).
pub const MAX_DATA_SIZE: usize = 10240;

/// One decoded SRPC packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub rr_id: u32,
    pub call_id: u32,
    pub data: Vec<u8>,
}

/// Encode one packet ready for the transport.
pub fn encode_frame(version: u8, rr_id: u32, call_id: u32, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > MAX_DATA_SIZE {
        return Err(Error::Codec("payload over maximum packet size"));
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + data.len() + TAG.len());
    out.extend_from_slice(&TAG);
    out.push(version);
    out.extend_from_slice(&rr_id.to_le_bytes());
    out.extend_from_slice(&call_id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(&TAG);
    Ok(out)
}

// ── Decoder ──────────────────────────────────────────────────

enum DecoderState {
    ReadingHeader {
        collected: usize,
    },
    ReadingPayload {
        expected: usize,
        collected: usize,
    },
    ReadingSuffix {
        collected: usize,
    },
}

/// Streaming packet decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload_buf: Vec<u8>,
    suffix_buf: [u8; 5],
    pending_meta: (u8, u32, u32),
    ready: VecDeque<Frame>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload_buf: Vec::new(),
            suffix_buf: [0; 5],
            pending_meta: (0, 0, 0),
            ready: VecDeque::new(),
        }
    }

    /// Feed raw transport bytes. Complete packets queue up for [`pop`].
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let needed = HEADER_SIZE - *collected;
                    let to_copy = needed.min(data.len() - offset);
                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        if self.header_buf[..5] != TAG {
                            return Err(Error::Codec("bad packet start tag"));
                        }
                        let version = self.header_buf[5];
                        let rr_id = u32::from_le_bytes(
                            self.header_buf[6..10].try_into().unwrap_or_default(),
                        );
                        let call_id = u32::from_le_bytes(
                            self.header_buf[10..14].try_into().unwrap_or_default(),
                        );
                        let data_size = u32::from_le_bytes(
                            self.header_buf[14..18].try_into().unwrap_or_default(),
                        ) as usize;

                        if data_size > MAX_DATA_SIZE {
                            return Err(Error::Codec("packet over maximum size"));
                        }

                        self.pending_meta = (version, rr_id, call_id);
                        self.payload_buf.clear();
                        if data_size == 0 {
                            self.state = DecoderState::ReadingSuffix { collected: 0 };
                        } else {
                            self.state = DecoderState::ReadingPayload {
                                expected: data_size,
                                collected: 0,
                            };
                        }
                    }
                }

                DecoderState::ReadingPayload {
                    expected,
                    collected,
                } => {
                    let needed = *expected - *collected;
                    let to_copy = needed.min(data.len() - offset);
                    self.payload_buf
                        .extend_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == *expected {
                        self.state = DecoderState::ReadingSuffix { collected: 0 };
                    }
                }

                DecoderState::ReadingSuffix { collected } => {
                    let needed = TAG.len() - *collected;
                    let to_copy = needed.min(data.len() - offset);
                    self.suffix_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == TAG.len() {
                        if self.suffix_buf != TAG {
                            return Err(Error::Codec("bad packet end tag"));
                        }
                        let (version, rr_id, call_id) = self.pending_meta;
                        self.ready.push_back(Frame {
                            version,
                            rr_id,
                            call_id,
                            data: std::mem::take(&mut self.payload_buf),
                        });
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                    }
                }
            }
        }

        Ok(())
    }

    /// Next complete packet, oldest first.
    pub fn pop(&mut self) -> Option<Frame> {
        self.ready.pop_front()
    }

    /// Drop partial state and queued packets (transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload_buf.clear();
        self.ready.clear();
    }
}

// ── Tests ────────────────────────────────────────────────────
