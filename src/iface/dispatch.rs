/*! Inbound IGMP message handling.

Every IGMP message received on an interface is validated once here and then
handed, in order, to each registered [Handler]. The host state machine is one
such handler; a multicast router or a snooping bridge sharing the same
interface would be others.
*/

use crate::phy::ChecksumCapabilities;
use crate::time::Instant;
use crate::wire::{IgmpPacket, IgmpRepr, Ipv4Repr, IGMP_HEADER_LEN};
use crate::{Error, Result};

/// A consumer of validated IGMP messages.
pub trait Handler {
    /// Process one message. `ip_repr` describes the datagram it arrived in.
    fn process_igmp(&mut self, now: Instant, ip_repr: &Ipv4Repr, repr: &IgmpRepr<'_>);
}

/// Validate the IGMP message carried in `payload`.
///
/// Messages shorter than the fixed header are `Truncated`. The checksum
/// is verified unless `caps` says the device already did so. Every IGMP
/// message is link-local: a datagram whose TTL is not 1 is `Malformed`.
pub fn parse<'a>(
    ip_repr: &Ipv4Repr,
    payload: &'a [u8],
    caps: &ChecksumCapabilities,
) -> Result<IgmpRepr<'a>> {
    if payload.len() < IGMP_HEADER_LEN {
        return Err(Error::Truncated);
    }
    let packet = IgmpPacket::new_checked(payload)?;
    if caps.igmp.rx() && !packet.verify_checksum() {
        return Err(Error::Checksum);
    }
    if ip_repr.hop_limit != 1 {
        return Err(Error::Malformed);
    }
    IgmpRepr::parse(&packet)
}

/// Hand a validated message to every handler, in order.
pub fn process(
    now: Instant,
    ip_repr: &Ipv4Repr,
    repr: &IgmpRepr<'_>,
    handlers: &mut [&mut dyn Handler],
) {
    for handler in handlers.iter_mut() {
        handler.process_igmp(now, ip_repr, repr);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{IgmpVersion, IpProtocol, Ipv4Address};
    use crate::time::Duration;

    static V2_QUERY_BYTES: [u8; 8] = [0x11, 0x64, 0xee, 0x9b, 0x00, 0x00, 0x00, 0x00];

    fn ip_repr(hop_limit: u8) -> Ipv4Repr {
        Ipv4Repr {
            src_addr: Ipv4Address::new(192, 168, 1, 1),
            dst_addr: Ipv4Address::MULTICAST_ALL_SYSTEMS,
            next_header: IpProtocol::Igmp,
            payload_len: 8,
            hop_limit,
            tos: 0,
            router_alert: true,
        }
    }

    #[derive(Default)]
    struct Counter {
        seen: usize,
    }

    impl Handler for Counter {
        fn process_igmp(&mut self, _now: Instant, _ip_repr: &Ipv4Repr, _repr: &IgmpRepr<'_>) {
            self.seen += 1;
        }
    }

    #[test]
    fn test_parse_query() {
        let caps = ChecksumCapabilities::default();
        assert_eq!(
            parse(&ip_repr(1), &V2_QUERY_BYTES, &caps),
            Ok(IgmpRepr::MembershipQuery {
                max_resp_time: Duration::from_secs(10),
                group_addr: Ipv4Address::UNSPECIFIED,
                version: IgmpVersion::Version2,
            })
        );
    }

    #[test]
    fn test_parse_truncated() {
        let caps = ChecksumCapabilities::default();
        assert_eq!(
            parse(&ip_repr(1), &V2_QUERY_BYTES[..7], &caps),
            Err(Error::Truncated)
        );
    }

    #[test]
    fn test_parse_bad_checksum() {
        let mut bytes = V2_QUERY_BYTES;
        bytes[3] ^= 0xff;
        assert_eq!(
            parse(&ip_repr(1), &bytes, &ChecksumCapabilities::default()),
            Err(Error::Checksum)
        );
        assert!(parse(&ip_repr(1), &bytes, &ChecksumCapabilities::ignored()).is_ok());
    }

    #[test]
    fn test_parse_ttl_not_one() {
        let caps = ChecksumCapabilities::default();
        assert_eq!(
            parse(&ip_repr(2), &V2_QUERY_BYTES, &caps),
            Err(Error::Malformed)
        );
    }

    #[test]
    fn test_process_reaches_every_handler() {
        let repr = IgmpRepr::LeaveGroup {
            group_addr: Ipv4Address::new(224, 0, 6, 150),
        };
        let mut first = Counter::default();
        let mut second = Counter::default();
        process(
            Instant::ZERO,
            &ip_repr(1),
            &repr,
            &mut [&mut first, &mut second],
        );
        assert_eq!((first.seen, second.seen), (1, 1));
    }
}
