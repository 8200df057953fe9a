//! Scripted in-memory transport for session tests.
//!
//! [`MockServer`] is the test's handle: it scripts server frames, decodes
//! everything the device sent, and injects connect/link failures. The
//! [`Transport`] half handed to the device shares the same buffers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use libsupla::TransportError;
use libsupla::proto::PROTO_VERSION;
use libsupla::proto::messages::{DeviceMessage, ServerMessage};
use libsupla::rpc::{FrameDecoder, encode_frame};
use libsupla::transport::Transport;

#[derive(Default)]
struct Shared {
    /// Server → device bytes waiting to be read.
    inbound: VecDeque<u8>,
    /// Device → server bytes captured from `send`.
    outbound: Vec<u8>,
    connected: bool,
    fail_connects: u32,
    connect_count: u32,
    drop_link: bool,
}

/// Test-side handle over the shared link state.
#[derive(Clone, Default)]
pub struct MockServer {
    shared: Arc<Mutex<Shared>>,
}

#[allow(dead_code)]
impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transport half to install on the device under test.
    pub fn link(&self) -> MockLink {
        MockLink {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Script one server frame for the device's next read.
    pub fn push(&self, msg: &ServerMessage) {
        let frame = encode_frame(PROTO_VERSION, 0, msg.call_id(), &msg.encode())
            .expect("test frame encodes");
        self.shared.lock().unwrap().inbound.extend(frame);
    }

    /// Decode and drain everything the device sent so far.
    pub fn take_sent(&self) -> Vec<DeviceMessage> {
        let bytes = std::mem::take(&mut self.shared.lock().unwrap().outbound);
        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes).expect("device sends valid frames");

        let mut out = Vec::new();
        while let Some(frame) = decoder.pop() {
            out.push(
                DeviceMessage::decode(frame.call_id, &frame.data)
                    .expect("device sends known calls"),
            );
        }
        out
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.shared.lock().unwrap().fail_connects = n;
    }

    pub fn connect_count(&self) -> u32 {
        self.shared.lock().unwrap().connect_count
    }

    /// Simulate the peer closing the connection.
    pub fn drop_link(&self) {
        self.shared.lock().unwrap().drop_link = true;
    }
}

/// Device-side half of the scripted link.
pub struct MockLink {
    shared: Arc<Mutex<Shared>>,
}

impl Transport for MockLink {
    fn connect(&mut self) -> Result<(), TransportError> {
        let mut shared = self.shared.lock().unwrap();
        shared.connect_count += 1;
        if shared.fail_connects > 0 {
            shared.fail_connects -= 1;
            return Err(TransportError::Unreachable("mock".into()));
        }
        shared.connected = true;
        shared.drop_link = false;
        shared.inbound.clear();
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut shared = self.shared.lock().unwrap();
        if !shared.connected {
            return Err(TransportError::NotConnected);
        }
        shared.outbound.extend_from_slice(data);
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut shared = self.shared.lock().unwrap();
        if !shared.connected {
            return Err(TransportError::NotConnected);
        }
        if shared.drop_link {
            return Err(TransportError::Closed);
        }
        let mut n = 0;
        while n < buf.len() {
            match shared.inbound.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn disconnect(&mut self) {
        self.shared.lock().unwrap().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.shared.lock().unwrap().connected
    }
}
