use crate::iface::dispatch::{self, Handler};
use crate::iface::Host;
use crate::phy::{ChecksumCapabilities, Device, RxToken};
use crate::time::{Duration, Instant};
use crate::wire::{IpProtocol, Ipv4Packet, Ipv4Repr};
use crate::Result;

/// A network interface running the IGMP host protocol.
///
/// The interface owns the [Host] state; the device is lent to it on every
/// call so the application can keep using it for other traffic in between.
#[derive(Debug)]
pub struct Interface<'a> {
    host: Host<'a>,
    last_tick: Option<Instant>,
}

impl<'a> Interface<'a> {
    pub fn new(host: Host<'a>) -> Interface<'a> {
        Interface {
            host,
            last_tick: None,
        }
    }

    pub fn host(&self) -> &Host<'a> {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut Host<'a> {
        &mut self.host
    }

    /// Receive the datagrams queued in the device, then run the host timers
    /// if a tick interval has elapsed.
    ///
    /// This function returns a boolean value indicating whether any datagram
    /// was received.
    pub fn poll<D>(&mut self, timestamp: Instant, device: &mut D) -> bool
    where
        D: Device + ?Sized,
    {
        self.poll_with(timestamp, device, &mut [])
    }

    /// Like [poll], and also hand every valid IGMP message to `handlers`
    /// after the host has seen it.
    ///
    /// [poll]: #method.poll
    pub fn poll_with<D>(
        &mut self,
        timestamp: Instant,
        device: &mut D,
        handlers: &mut [&mut dyn Handler],
    ) -> bool
    where
        D: Device + ?Sized,
    {
        let processed_any = self.ingress(timestamp, device, handlers);

        let tick_interval = self.host.config().tick_interval;
        let tick_due = self
            .last_tick
            .map_or(true, |last_tick| timestamp >= last_tick + tick_interval);
        if tick_due {
            self.last_tick = Some(timestamp);
            self.host.tick(timestamp, device);
        }

        processed_any
    }

    /// Return a _soft deadline_ for calling [poll] the next time.
    ///
    /// [poll]: #method.poll
    pub fn poll_at(&self, timestamp: Instant) -> Option<Instant> {
        let poll_at = self.host.poll_at(timestamp)?;
        match self.last_tick {
            Some(last_tick) => Some(poll_at.max(last_tick + self.host.config().tick_interval)),
            None => Some(poll_at),
        }
    }

    /// Return an _advisory wait time_ for calling [poll] the next time.
    ///
    /// [poll]: #method.poll
    pub fn poll_delay(&self, timestamp: Instant) -> Option<Duration> {
        match self.poll_at(timestamp) {
            Some(poll_at) if timestamp < poll_at => Some(poll_at - timestamp),
            Some(_) => Some(Duration::ZERO),
            _ => None,
        }
    }

    fn ingress<D>(
        &mut self,
        timestamp: Instant,
        device: &mut D,
        handlers: &mut [&mut dyn Handler],
    ) -> bool
    where
        D: Device + ?Sized,
    {
        let checksum_caps = device.capabilities().checksum;
        let mut processed_any = false;

        while let Some((rx_token, _tx_token)) = device.receive(timestamp) {
            rx_token.consume(|frame| {
                if frame.is_empty() {
                    return;
                }
                if let Err(err) =
                    process_ipv4(&mut self.host, timestamp, frame, &checksum_caps, &mut *handlers)
                {
                    net_debug!("IGMP: dropping datagram: {}", err);
                }
            });
            processed_any = true;
        }

        processed_any
    }
}

fn process_ipv4(
    host: &mut Host<'_>,
    timestamp: Instant,
    frame: &[u8],
    checksum_caps: &ChecksumCapabilities,
    handlers: &mut [&mut dyn Handler],
) -> Result<()> {
    let packet = Ipv4Packet::new_checked(frame)?;
    let ip_repr = Ipv4Repr::parse(&packet, checksum_caps)?;
    if ip_repr.next_header != IpProtocol::Igmp {
        return Ok(());
    }
    if !ip_repr.dst_addr.is_multicast() && host.ipv4_addr() != Some(ip_repr.dst_addr) {
        net_trace!("IGMP: ignoring datagram for {}", ip_repr.dst_addr);
        return Ok(());
    }

    let repr = dispatch::parse(&ip_repr, packet.payload(), checksum_caps)?;
    net_trace!("IGMP: received {} from {}", repr, ip_repr.src_addr);
    host.process_igmp(timestamp, &ip_repr, &repr);
    dispatch::process(timestamp, &ip_repr, &repr, handlers);
    Ok(())
}
