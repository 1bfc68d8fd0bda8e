//! Ethernet transport: the abstract interface the controller drives, a UDP
//! broadcast implementation and an in-memory pair for tests.
//!
//! Wire format: a 2-byte big-endian word count, then that many big-endian
//! 16-bit words. Two further bytes are reserved in the receive buffer for a
//! checksum that is never transmitted.
//!
//! The UDP receiver runs on its own thread. The ring buffer is the only
//! structure shared between it and the CPU thread; one mutex guards every
//! access, including the `running` flag the thread polls to exit.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const UDP_PORT: u16 = 42424;
/// Ring capacity in bytes.
pub const RING_BYTES: usize = 8192;
/// Largest datagram accepted; bounds the ring's headroom check.
pub const MAX_PACKET_BYTES: usize = 1024;
/// Payload limit: 510 words fill a maximum packet with prefix and reserve.
pub const MAX_FRAME_WORDS: usize = 510;

/// What the Ethernet controller needs from a wire.
pub trait Transport: Send {
    fn clear_tx(&mut self);
    fn append_tx(&mut self, word: u16);
    /// Transmit the accumulated words as one frame and clear the buffer.
    fn send(&mut self);
    fn enable_rx(&mut self, enable: bool);
    fn clear_rx(&mut self);
    /// The next word of the current packet.
    fn get_rx_data(&mut self) -> u16;
    /// Unread payload bytes of the current packet.
    fn has_rx_data(&self) -> usize;
    /// Pop the next packet; returns its payload length in bytes (0 if none).
    fn receive(&mut self) -> usize;
}

/// Serialise the transmit buffer into a frame.
fn frame(words: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + words.len() * 2);
    out.extend_from_slice(&(words.len() as u16).to_be_bytes());
    for &w in words {
        out.extend_from_slice(&w.to_be_bytes());
    }
    out
}

/// One received packet being drained word by word. The count prefix is
/// skipped exactly once, on the first read.
#[derive(Default)]
struct RxPacket {
    bytes: Vec<u8>,
    pos: usize,
    prefix_skipped: bool,
}

impl RxPacket {
    /// Adopt a record (datagram plus checksum reserve). Returns the payload
    /// byte count.
    fn load(&mut self, record: Vec<u8>) -> usize {
        self.bytes = record;
        self.pos = 0;
        self.prefix_skipped = false;
        self.payload_len()
    }

    fn payload_len(&self) -> usize {
        // Prefix and checksum reserve are overhead.
        self.bytes.len().saturating_sub(4)
    }

    fn remaining(&self) -> usize {
        if self.bytes.is_empty() {
            return 0;
        }
        let consumed = if self.prefix_skipped { self.pos - 2 } else { 0 };
        self.payload_len().saturating_sub(consumed)
    }

    fn next_word(&mut self) -> u16 {
        if !self.prefix_skipped {
            debug_assert_eq!(self.pos, 0, "prefix skip after reading started");
            self.pos = 2;
            self.prefix_skipped = true;
        }
        if self.remaining() < 2 {
            return 0;
        }
        let word = u16::from_be_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
        self.pos += 2;
        word
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.pos = 0;
        self.prefix_skipped = false;
    }
}

/// Packet ring shared with the receive thread.
struct RxRing {
    packets: VecDeque<Vec<u8>>,
    bytes: usize,
    running: bool,
}

impl RxRing {
    fn new() -> Self {
        Self {
            packets: VecDeque::new(),
            bytes: 0,
            running: true,
        }
    }

    fn has_room(&self) -> bool {
        RING_BYTES - self.bytes >= MAX_PACKET_BYTES
    }

    fn push(&mut self, record: Vec<u8>) {
        self.bytes += record.len();
        self.packets.push_back(record);
    }

    fn pop(&mut self) -> Option<Vec<u8>> {
        let record = self.packets.pop_front()?;
        self.bytes -= record.len();
        Some(record)
    }
}

/// Broadcast UDP transport on port 42424.
pub struct UdpTransport {
    socket: UdpSocket,
    dest: SocketAddr,
    tx: Vec<u16>,
    ring: Arc<Mutex<RxRing>>,
    packet: RxPacket,
    rx_enabled: bool,
    handle: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// Bind the well-known port (falling back to an ephemeral one when it
    /// is taken, e.g. a second instance on the same host) and start the
    /// receive thread. Frames go to the local broadcast address.
    pub fn new() -> io::Result<Self> {
        Self::with_destination(SocketAddr::from((Ipv4Addr::BROADCAST, UDP_PORT)))
    }

    /// Like `new`, with an explicit destination (loopback in tests).
    pub fn with_destination(dest: SocketAddr) -> io::Result<Self> {
        let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, UDP_PORT)) {
            Ok(socket) => socket,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?
            }
            Err(e) => return Err(e),
        };
        socket.set_broadcast(true)?;

        let ring = Arc::new(Mutex::new(RxRing::new()));
        let thread_socket = socket.try_clone()?;
        thread_socket.set_read_timeout(Some(Duration::from_millis(10)))?;
        let thread_ring = Arc::clone(&ring);
        let handle = thread::spawn(move || receive_loop(&thread_socket, &thread_ring));

        Ok(Self {
            socket,
            dest,
            tx: Vec::new(),
            ring,
            packet: RxPacket::default(),
            rx_enabled: false,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.socket.local_addr().map_or(0, |a| a.port())
    }
}

fn receive_loop(socket: &UdpSocket, ring: &Arc<Mutex<RxRing>>) {
    let mut buf = [0u8; MAX_PACKET_BYTES];
    loop {
        {
            // A poisoned ring means the owner is gone; stop receiving.
            let guard = match ring.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            if !guard.running {
                return;
            }
            if !guard.has_room() {
                drop(guard);
                thread::sleep(Duration::from_millis(1));
                continue;
            }
        }

        let n = match socket.recv(&mut buf) {
            Ok(n) => n,
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(_) => return,
        };

        if n < 2 {
            eprintln!("ether: runt packet ({n} bytes), dropped");
            continue;
        }
        let count = usize::from(u16::from_be_bytes([buf[0], buf[1]]));
        if 2 + count * 2 != n || count > MAX_FRAME_WORDS {
            eprintln!("ether: bad word count {count} for {n}-byte packet, dropped");
            continue;
        }

        // Record: datagram plus two reserved checksum bytes.
        let mut record = Vec::with_capacity(n + 2);
        record.extend_from_slice(&buf[..n]);
        record.extend_from_slice(&[0, 0]);
        match ring.lock() {
            Ok(mut guard) => guard.push(record),
            Err(_) => return,
        }
    }
}

impl Transport for UdpTransport {
    fn clear_tx(&mut self) {
        self.tx.clear();
    }

    fn append_tx(&mut self, word: u16) {
        if self.tx.len() < MAX_FRAME_WORDS {
            self.tx.push(word);
        }
    }

    fn send(&mut self) {
        if self.tx.is_empty() {
            return;
        }
        if let Err(e) = self.socket.send_to(&frame(&self.tx), self.dest) {
            eprintln!("ether: send failed: {e}");
        }
        self.tx.clear();
    }

    fn enable_rx(&mut self, enable: bool) {
        self.rx_enabled = enable;
    }

    fn clear_rx(&mut self) {
        self.packet.clear();
        let mut ring = match self.ring.lock() {
            Ok(ring) => ring,
            Err(_) => return,
        };
        while ring.pop().is_some() {}
    }

    fn get_rx_data(&mut self) -> u16 {
        self.packet.next_word()
    }

    fn has_rx_data(&self) -> usize {
        self.packet.remaining()
    }

    fn receive(&mut self) -> usize {
        if !self.rx_enabled {
            return 0;
        }
        // A poisoned ring reads as an idle wire.
        let record = match self.ring.lock() {
            Ok(mut ring) => ring.pop(),
            Err(_) => None,
        };
        match record {
            Some(record) => self.packet.load(record),
            None => 0,
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.running = false;
        }
        // On a poisoned ring the thread exits at its next lock attempt.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// In-memory transport pair; frames cross over to the peer's queue.
pub struct MemTransport {
    tx: Vec<u16>,
    out: Arc<Mutex<VecDeque<Vec<u8>>>>,
    inbox: Arc<Mutex<VecDeque<Vec<u8>>>>,
    packet: RxPacket,
    rx_enabled: bool,
}

impl MemTransport {
    /// Two connected endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Mutex::new(VecDeque::new()));
        let b_to_a = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                tx: Vec::new(),
                out: Arc::clone(&a_to_b),
                inbox: b_to_a.clone(),
                packet: RxPacket::default(),
                rx_enabled: false,
            },
            Self {
                tx: Vec::new(),
                out: b_to_a,
                inbox: a_to_b,
                packet: RxPacket::default(),
                rx_enabled: false,
            },
        )
    }
}

impl Transport for MemTransport {
    fn clear_tx(&mut self) {
        self.tx.clear();
    }

    fn append_tx(&mut self, word: u16) {
        if self.tx.len() < MAX_FRAME_WORDS {
            self.tx.push(word);
        }
    }

    fn send(&mut self) {
        if self.tx.is_empty() {
            return;
        }
        let mut record = frame(&self.tx);
        record.extend_from_slice(&[0, 0]);
        if let Ok(mut queue) = self.out.lock() {
            queue.push_back(record);
        }
        self.tx.clear();
    }

    fn enable_rx(&mut self, enable: bool) {
        self.rx_enabled = enable;
    }

    fn clear_rx(&mut self) {
        self.packet.clear();
        if let Ok(mut queue) = self.inbox.lock() {
            queue.clear();
        }
    }

    fn get_rx_data(&mut self) -> u16 {
        self.packet.next_word()
    }

    fn has_rx_data(&self) -> usize {
        self.packet.remaining()
    }

    fn receive(&mut self) -> usize {
        if !self.rx_enabled {
            return 0;
        }
        let record = match self.inbox.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(_) => None,
        };
        match record {
            Some(record) => self.packet.load(record),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_pair_round_trips_words() {
        let (mut a, mut b) = MemTransport::pair();
        b.enable_rx(true);

        a.clear_tx();
        a.append_tx(0x1234);
        a.append_tx(0x5678);
        a.send();

        assert_eq!(b.receive(), 4);
        assert_eq!(b.has_rx_data(), 4);
        assert_eq!(b.get_rx_data(), 0x1234);
        assert_eq!(b.get_rx_data(), 0x5678);
        assert_eq!(b.has_rx_data(), 0);
    }

    #[test]
    fn longest_frame_survives() {
        let (mut a, mut b) = MemTransport::pair();
        b.enable_rx(true);
        for i in 0..MAX_FRAME_WORDS {
            a.append_tx(i as u16);
        }
        a.send();
        assert_eq!(b.receive(), MAX_FRAME_WORDS * 2);
        for i in 0..MAX_FRAME_WORDS {
            assert_eq!(b.get_rx_data(), i as u16);
        }
    }

    #[test]
    fn receive_without_enable_sees_nothing() {
        let (mut a, mut b) = MemTransport::pair();
        a.append_tx(1);
        a.send();
        assert_eq!(b.receive(), 0);
        b.enable_rx(true);
        assert_eq!(b.receive(), 2);
    }

    #[test]
    fn frame_layout_is_big_endian_with_count() {
        let bytes = frame(&[0x1234, 0x5678]);
        assert_eq!(bytes, vec![0x00, 0x02, 0x12, 0x34, 0x56, 0x78]);
    }
}
