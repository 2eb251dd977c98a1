use std::collections::VecDeque;
use std::vec::Vec;

use crate::phy::{self, ChecksumCapabilities, Device, DeviceCapabilities};
use crate::time::Instant;
use crate::wire::*;

/// A testing device.
///
/// Datagrams queued in `rx_queue` are handed to the stack in FIFO order,
/// and everything the stack transmits lands in `tx_queue`.
#[derive(Debug)]
pub struct TestingDevice {
    pub(crate) rx_queue: VecDeque<Vec<u8>>,
    pub(crate) tx_queue: VecDeque<Vec<u8>>,
    /// Refuse to hand out transmit tokens.
    pub(crate) refuse_tx: bool,
    pub(crate) max_transmission_unit: usize,
}

#[allow(clippy::new_without_default)]
impl TestingDevice {
    pub fn new() -> Self {
        TestingDevice {
            rx_queue: VecDeque::new(),
            tx_queue: VecDeque::new(),
            refuse_tx: false,
            max_transmission_unit: 1500,
        }
    }

    /// Drain the transmitted datagrams, returning the IP header and IGMP
    /// message of each.
    pub fn sent(&mut self) -> Vec<(Ipv4Repr, Vec<u8>)> {
        self.tx_queue
            .drain(..)
            .map(|frame| {
                let packet = Ipv4Packet::new_checked(&frame[..]).unwrap();
                let ip_repr = Ipv4Repr::parse(&packet, &ChecksumCapabilities::default()).unwrap();
                (ip_repr, packet.payload().to_vec())
            })
            .collect()
    }
}

impl Device for TestingDevice {
    type RxToken<'a> = RxToken;
    type TxToken<'a> = TxToken<'a>;

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            max_transmission_unit: self.max_transmission_unit,
            ..DeviceCapabilities::default()
        }
    }

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        self.rx_queue.pop_front().map(move |buffer| {
            let rx = RxToken { buffer };
            let tx = TxToken {
                queue: &mut self.tx_queue,
            };
            (rx, tx)
        })
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        if self.refuse_tx {
            return None;
        }
        Some(TxToken {
            queue: &mut self.tx_queue,
        })
    }
}

#[doc(hidden)]
pub struct RxToken {
    buffer: Vec<u8>,
}

impl phy::RxToken for RxToken {
    fn consume<R, F>(self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(&self.buffer)
    }
}

#[doc(hidden)]
#[derive(Debug)]
pub struct TxToken<'a> {
    queue: &'a mut VecDeque<Vec<u8>>,
}

impl<'a> phy::TxToken for TxToken<'a> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buffer = vec![0; len];
        let result = f(&mut buffer);
        self.queue.push_back(buffer);
        result
    }
}

/// Build an IPv4 datagram carrying `repr`, as a router on the link would send it.
pub fn igmp_frame(
    src_addr: Ipv4Address,
    dst_addr: Ipv4Address,
    hop_limit: u8,
    repr: &IgmpRepr,
) -> Vec<u8> {
    let ip_repr = Ipv4Repr {
        src_addr,
        dst_addr,
        next_header: IpProtocol::Igmp,
        payload_len: repr.buffer_len(),
        hop_limit,
        tos: 0,
        router_alert: true,
    };
    let mut bytes = vec![0; ip_repr.buffer_len() + repr.buffer_len()];
    let mut packet = Ipv4Packet::new_unchecked(&mut bytes[..]);
    ip_repr.emit(&mut packet, &ChecksumCapabilities::default());
    let mut igmp = IgmpPacket::new_unchecked(packet.payload_mut());
    repr.emit(&mut igmp);
    bytes
}
