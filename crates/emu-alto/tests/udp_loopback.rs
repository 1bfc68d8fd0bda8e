//! UDP transport loopback between two endpoints on this host.
//!
//! The receiver takes the well-known port; the sender falls back to an
//! ephemeral one and addresses loopback explicitly instead of broadcast.

use std::thread;
use std::time::Duration;

use emu_alto::Transport;
use emu_alto::transport::{UDP_PORT, UdpTransport};

#[test]
fn loopback_frame_round_trip() {
    let mut rx = UdpTransport::new().expect("bind receiver");
    let mut tx = UdpTransport::with_destination(
        format!("127.0.0.1:{UDP_PORT}").parse().expect("addr"),
    )
    .expect("bind sender");
    rx.enable_rx(true);

    tx.clear_tx();
    tx.append_tx(0x1234);
    tx.append_tx(0x5678);
    tx.send();

    // The receive thread needs a moment to pick the datagram up.
    let mut length = 0;
    for _ in 0..400 {
        length = rx.receive();
        if length > 0 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(length, 4, "no frame arrived over loopback");
    assert_eq!(rx.has_rx_data(), 4);
    assert_eq!(rx.get_rx_data(), 0x1234);
    assert_eq!(rx.get_rx_data(), 0x5678);
    assert_eq!(rx.has_rx_data(), 0);
}
