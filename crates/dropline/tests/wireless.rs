use dropline::{
    checksum::{additive_checksum, crc_is_valid},
    packet::BUFFER_SIZE,
    wireless::{codec, Addressing},
    Packet, RadioBridge, RadioConfig, RadioLink, TransmitStatus, TxStep,
};
use mutex::raw_impls::cs::CriticalSectionRawMutex;
use stuff_acc::{Accumulator, FeedResult};

type Bridge = RadioBridge<CriticalSectionRawMutex, 4, 4>;

#[derive(Default)]
struct MockRadio {
    /// Polls of clear-to-send that still read deasserted.
    blocked_polls: usize,
    tx_irq: bool,
    enables: usize,
    disables: usize,
    watchdog: usize,
}

impl RadioLink for MockRadio {
    fn clear_to_send(&mut self) -> bool {
        if self.blocked_polls > 0 {
            self.blocked_polls -= 1;
            false
        } else {
            true
        }
    }

    fn enable_tx_interrupt(&mut self) {
        self.tx_irq = true;
        self.enables += 1;
    }

    fn disable_tx_interrupt(&mut self) {
        self.tx_irq = false;
        self.disables += 1;
    }

    fn service_watchdog(&mut self) {
        self.watchdog += 1;
    }
}

/// An escaped receive frame as the radio module would send it.
fn rx_frame(api_id: u8, rssi: u8, pkt: &[u8]) -> Vec<u8> {
    let addr_len = match Addressing::from_api_id(api_id).unwrap() {
        Addressing::Long => 8,
        Addressing::Short => 2,
    };
    let mut data = vec![api_id];
    data.extend(std::iter::repeat(0x11).take(addr_len));
    data.push(rssi);
    data.push(0x00);
    data.extend_from_slice(pkt);

    let len = (data.len() as u16).to_be_bytes();
    let mut raw = vec![0x7E, len[0], len[1]];
    raw.extend_from_slice(&data);
    raw.push(additive_checksum(&data));

    let mut out = vec![0u8; stuff_acc::max_encoded_len(raw.len())];
    let used = stuff_acc::encode(&raw, &mut out).unwrap();
    out.truncate(used);
    out
}

fn feed(bridge: &Bridge, wire: &[u8]) {
    for &b in wire {
        bridge.on_rx_byte(b, false);
    }
}

fn pop(bridge: &Bridge) -> Option<(Packet, u8)> {
    let mut buf = [0u8; BUFFER_SIZE];
    let got = bridge.rx_queue().pop(&mut buf).ok()?;
    Some((Packet::from_bytes(&buf[..got.len]).unwrap(), got.rssi))
}

#[test]
fn init_waits_for_module() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bridge = Bridge::new();
    let mut radio = MockRadio {
        blocked_polls: 5,
        ..Default::default()
    };
    bridge.init(&mut radio);
    assert_eq!(radio.blocked_polls, 0);
    assert_eq!(radio.watchdog, 5);
    assert!(!radio.tx_irq);
}

#[test]
fn short_address_frame_delivers_packet() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bridge = Bridge::new();
    // Payload full of bytes that need escaping
    let pkt = Packet::new(0xFF, 0x42, 0x7E, &[0x7D, 0x11, 0x13]).unwrap();
    let wire = rx_frame(0x81, 0x2C, pkt.as_bytes());

    let (last, head) = wire.split_last().unwrap();
    feed(&bridge, head);
    assert!(bridge.rx_queue().is_empty());
    bridge.on_rx_byte(*last, false);
    assert_eq!(bridge.rx_queue().depth(), 1);

    let (rx, rssi) = pop(&bridge).unwrap();
    assert_eq!(rx, pkt);
    assert_eq!(rssi, 0x2C);
    assert!(rx.accepts(0x03));
}

#[test]
fn long_address_frame_delivers_packet() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bridge = Bridge::new();
    let pkt = Packet::new(0x03, 0x42, b'S', &[1, 2, 3, 4, 5]).unwrap();
    feed(&bridge, &rx_frame(0x80, 0x51, pkt.as_bytes()));
    assert_eq!(pop(&bridge), Some((pkt, 0x51)));
}

#[test]
fn damaged_frames_are_dropped() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bridge = Bridge::new();
    let pkt = Packet::new(0xFF, 0x42, b'S', &[0x20]).unwrap();
    let good = rx_frame(0x81, 0x10, pkt.as_bytes());

    let mut bad_sum = good.clone();
    let n = bad_sum.len();
    bad_sum[n - 2] ^= 0x01;
    feed(&bridge, &bad_sum);
    assert!(bridge.rx_queue().is_empty());

    // Line error half way through
    let (front, back) = good.split_at(good.len() / 2);
    feed(&bridge, front);
    bridge.on_rx_byte(0x00, true);
    feed(&bridge, back);
    assert!(bridge.rx_queue().is_empty());

    // A delimiter in the middle of a frame starts over
    feed(&bridge, front);
    feed(&bridge, &good);
    assert_eq!(pop(&bridge), Some((pkt, 0x10)));
}

#[test]
fn other_api_frames_are_ignored() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bridge = Bridge::new();
    // Transmit status frame
    let data = [0x89, 0x01, 0x00];
    let mut raw = vec![0x7E, 0x00, data.len() as u8];
    raw.extend_from_slice(&data);
    raw.push(additive_checksum(&data));
    feed(&bridge, &raw);
    assert!(bridge.rx_queue().is_empty());
}

fn drain(bridge: &Bridge, radio: &mut MockRadio, blocked_before_each: usize) -> Vec<u8> {
    let mut out = vec![];
    loop {
        radio.blocked_polls = blocked_before_each;
        match bridge.on_tx_ready(radio) {
            TxStep::Byte(b) => {
                assert_eq!(radio.blocked_polls, 0);
                out.push(b);
            }
            TxStep::Final(b) => {
                assert_eq!(radio.blocked_polls, 0);
                out.push(b);
                break;
            }
            TxStep::Idle => panic!("sender ran dry before the final byte"),
        }
    }
    out
}

fn unwrap_tx_frame(wire: &[u8]) -> Vec<u8> {
    let mut acc = Accumulator::new([0u8; codec::FRAME_BUFFER_SIZE]);
    let mut frame = None;
    // The radio accepts its own sentinel, the accumulator wants a delimiter
    acc.feed(stuff_acc::START);
    for &b in &wire[1..] {
        if let FeedResult::Success(f) = acc.feed(b) {
            frame = Some(f.to_vec());
        }
    }
    frame.unwrap()
}

#[test]
fn transmit_frames_and_sends() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bridge = Bridge::new();
    let mut radio = MockRadio::default();

    assert_eq!(bridge.transmit(&mut radio), TransmitStatus::Idle);
    assert_eq!(radio.enables, 0);

    // CRC left blank
    let raw = [0xFF, 0x03, 7, b'A', 0x13, 0, 0];
    bridge.tx_queue().push(&raw, 0).unwrap();
    assert_eq!(bridge.transmit(&mut radio), TransmitStatus::Sent);
    assert!(bridge.tx_queue().is_empty());
    assert!(bridge.is_transmitting());
    assert!(radio.tx_irq);

    bridge.tx_queue().push(&raw, 0).unwrap();
    assert_eq!(bridge.transmit(&mut radio), TransmitStatus::Busy);

    let wire = drain(&bridge, &mut radio, 3);
    assert!(!radio.tx_irq);
    assert!(!bridge.is_transmitting());
    assert!(radio.watchdog >= 3);
    assert_eq!(wire[0], RadioConfig::DEFAULT.start_sentinel);

    let frame = unwrap_tx_frame(&wire);
    assert_eq!(&frame[..8], &[0x7E, 0x00, 12, 0x01, 0x00, 0xFF, 0xFF, 0x00]);
    assert_eq!(&frame[8..13], &raw[..5]);
    assert!(crc_is_valid(&frame[8..15]));

    // Spurious interrupt after the end
    assert_eq!(bridge.on_tx_ready(&mut radio), TxStep::Idle);
    assert!(!radio.tx_irq);

    // The second packet goes now
    assert_eq!(bridge.transmit(&mut radio), TransmitStatus::Sent);
}

#[test]
fn standard_delimiter_is_configurable() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bridge: Bridge = RadioBridge::with_config(RadioConfig {
        start_sentinel: stuff_acc::START,
    });
    let mut radio = MockRadio::default();
    let pkt = Packet::new(0x10, 0x03, b'B', &[]).unwrap();
    bridge.tx_queue().push(pkt.as_bytes(), 0).unwrap();
    assert_eq!(bridge.transmit(&mut radio), TransmitStatus::Sent);
    let wire = drain(&bridge, &mut radio, 0);
    assert_eq!(wire[0], 0x7E);
}

#[test]
fn malformed_packet_is_discarded() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bridge = Bridge::new();
    let mut radio = MockRadio::default();
    bridge.tx_queue().push(&[0xFF, 0x03, 2, b'A'], 0).unwrap();
    assert_eq!(bridge.transmit(&mut radio), TransmitStatus::Discarded);
    assert!(bridge.tx_queue().is_empty());
    assert!(!bridge.is_transmitting());
    assert_eq!(radio.enables, 0);
}
