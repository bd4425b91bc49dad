//! Two loopback nodes bouncing a counter back and forth.
//!
//! Run with:
//!   cargo run --example ping-pong

use std::thread;
use std::time::{Duration, Instant};

use nowmsg::node::{Node, NodeConfig};
use nowmsg::transport::{InterfaceMode, LoopbackMedium, MacAddress};

const PING: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x01]);
const PONG: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x02]);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let medium = LoopbackMedium::new();
    let config = NodeConfig {
        verify_sender: true,
        ..NodeConfig::default()
    };
    let ping = Node::new(medium.station(PING)?, config.clone());
    let pong = Node::new(medium.station(PONG)?, config);

    ping.add_peer(2, PONG, 0, InterfaceMode::Station, None)?;
    pong.add_peer(1, PING, 0, InterfaceMode::Station, None)?;

    let mut counter = 0i32;
    for _ in 0..5 {
        ping.send(2, counter)?;
        // A successful send means the frame is already queued at the peer.
        let got: i32 = pong.receive()?.ok_or("pong queue empty")?;
        eprintln!("pong got {got}");

        pong.send(1, got + 1)?;
        counter = ping.receive()?.ok_or("ping queue empty")?;
        eprintln!("ping got {counter}");
    }

    ping.send_text(2, "bye")?;
    let deadline = Instant::now() + Duration::from_secs(1);
    while !pong.available() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if let Some(msg) = pong.receive_message() {
        eprintln!("pong got {:?}", msg.as_text()?);
    }

    eprintln!("inbound stats: {:?}", pong.inbound_stats());
    Ok(())
}
