//! Listen to bus traffic through a serial radio module, and broadcast a
//! ping now and then.
//!
//! The module must be in escaped API mode. Set `RADIO_PORT` and
//! `RADIO_BAUD` to override the defaults below.

use dropline::{
    packet::BUFFER_SIZE, Packet, RadioBridge, RadioLink, TransmitStatus, TxStep, BROADCAST,
};
use log::{info, warn};
use mutex::raw_impls::cs::CriticalSectionRawMutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, WriteHalf},
    time::interval,
};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use std::{env, io, time::Duration};

const DEFAULT_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD: u32 = 9600;

/// Our address on the bus.
const NODE_ADDR: u8 = 0xFE;
const PING_TYPE: u8 = b'A';
const PING_PERIOD: Duration = Duration::from_secs(5);

static BRIDGE: RadioBridge<CriticalSectionRawMutex, 8, 4> = RadioBridge::new();

/// The serial driver does the flow control on a host, so clear-to-send is
/// always asserted from our point of view.
struct HostRadio;

impl RadioLink for HostRadio {
    fn clear_to_send(&mut self) -> bool {
        true
    }

    fn enable_tx_interrupt(&mut self) {}

    fn disable_tx_interrupt(&mut self) {}
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let port = env::var("RADIO_PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
    let baud = env::var("RADIO_BAUD")
        .ok()
        .and_then(|b| b.parse().ok())
        .unwrap_or(DEFAULT_BAUD);

    let serial = tokio_serial::new(&port, baud).open_native_async()?;
    info!("listening on {port} at {baud} baud");
    let (mut rx, tx) = tokio::io::split(serial);

    BRIDGE.init(&mut HostRadio);
    tokio::task::spawn(async move {
        if let Err(e) = ping_loop(tx).await {
            warn!("ping loop stopped: {e:?}");
        }
    });

    let mut chunk = [0u8; 64];
    let mut pkt = [0u8; BUFFER_SIZE];
    loop {
        let used = rx.read(&mut chunk).await?;
        if used == 0 {
            info!("serial port closed");
            return Ok(());
        }
        for &b in &chunk[..used] {
            BRIDGE.on_rx_byte(b, false);
        }
        while let Ok(popped) = BRIDGE.rx_queue().pop(&mut pkt) {
            report(&pkt[..popped.len], popped.rssi);
        }
    }
}

fn report(raw: &[u8], rssi: u8) {
    let pkt = match Packet::from_bytes(raw) {
        Ok(pkt) => pkt,
        Err(e) => {
            warn!("unusable packet {raw:02X?}: {e:?}");
            return;
        }
    };
    if !pkt.crc_ok() {
        warn!("bad crc from {:02X}: {raw:02X?}", pkt.src());
        return;
    }
    let kind = pkt.kind();
    info!(
        "{:02X} -> {:02X} type '{}' rssi -{rssi}dBm payload {:02X?}{}",
        pkt.src(),
        pkt.dest(),
        kind.escape_ascii(),
        pkt.payload(),
        if pkt.accepts(NODE_ADDR) { "" } else { " (not for us)" },
    );
}

async fn ping_loop(mut tx: WriteHalf<SerialStream>) -> io::Result<()> {
    let mut ival = interval(PING_PERIOD);
    let mut radio = HostRadio;
    loop {
        ival.tick().await;
        let ping = match Packet::new(BROADCAST, NODE_ADDR, PING_TYPE, &[]) {
            Ok(ping) => ping,
            Err(e) => {
                warn!("cannot build ping: {e:?}");
                continue;
            }
        };
        if BRIDGE.tx_queue().push(ping.as_bytes(), 0).is_err() {
            warn!("tx queue full, skipping ping");
            continue;
        }

        loop {
            match BRIDGE.transmit(&mut radio) {
                TransmitStatus::Sent => {
                    let frame = drain(&mut radio);
                    tx.write_all(&frame).await?;
                }
                TransmitStatus::Discarded => continue,
                TransmitStatus::Idle | TransmitStatus::Busy => break,
            }
        }
    }
}

/// Play the transmit interrupt until the staged frame is out.
fn drain(radio: &mut HostRadio) -> Vec<u8> {
    let mut frame = vec![];
    loop {
        match BRIDGE.on_tx_ready(radio) {
            TxStep::Byte(b) => frame.push(b),
            TxStep::Final(b) => {
                frame.push(b);
                return frame;
            }
            TxStep::Idle => return frame,
        }
    }
}
