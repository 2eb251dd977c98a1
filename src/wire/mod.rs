/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. It provides two levels
of functionality.

 * First, it provides functions to extract fields from sequences of octets,
   and to insert fields into sequences of octets. This happens `Packet` family of
   structures, e.g. [Ipv4Packet] or [IgmpPacket].
 * Second, in cases where the space of valid field values is much smaller than the space
   of possible field values, it provides a compact, high-level representation
   of packet data that can be parsed from and emitted into a sequence of octets.
   This happens through the `Repr` family of structs and enums, e.g. [Ipv4Repr] or [IgmpRepr].

[Ipv4Packet]: struct.Ipv4Packet.html
[IgmpPacket]: struct.IgmpPacket.html
[Ipv4Repr]: struct.Ipv4Repr.html
[IgmpRepr]: enum.IgmpRepr.html

The `Packet` family of data structures guarantees that, if the `Packet::check_len()` method
returned `Ok(())`, then no accessor or setter method will panic; however, the guarantee
provided by `Packet::check_len()` may no longer hold after changing certain fields,
which are listed in the documentation for the specific packet.

When parsing untrusted input, it is *necessary* to use `Packet::new_checked()`;
so long as the buffer is not modified, no accessor will fail.
When emitting output, though, it is *incorrect* to use `Packet::new_checked()`;
the length check is likely to succeed on a zeroed buffer, but fail on a buffer
filled with data from a previous packet.

In the `Repr` family of data structures, the `Repr::parse()` method never panics
as long as `Packet::new_checked()` (or `Packet::check_len()`) has succeeded, and
the `Repr::emit()` method never panics as long as the underlying buffer is exactly
`Repr::buffer_len()` octets long.

# Examples

To emit an IGMPv2 report inside an IPv4 header, and then parse both back:

```rust
use smoligmp::phy::ChecksumCapabilities;
use smoligmp::wire::*;
let igmp_repr = IgmpRepr::MembershipReport {
    group_addr: Ipv4Address::new(239, 1, 1, 1),
    version: IgmpVersion::Version2,
};
let ip_repr = Ipv4Repr {
    src_addr:     Ipv4Address::new(10, 0, 0, 1),
    dst_addr:     Ipv4Address::new(239, 1, 1, 1),
    next_header:  IpProtocol::Igmp,
    payload_len:  igmp_repr.buffer_len(),
    hop_limit:    1,
    tos:          0,
    router_alert: true,
};
let mut buffer = vec![0; ip_repr.buffer_len() + ip_repr.payload_len];
{ // emission
    let mut packet = Ipv4Packet::new_unchecked(&mut buffer);
    ip_repr.emit(&mut packet, &ChecksumCapabilities::default());
    igmp_repr.emit(&mut IgmpPacket::new_unchecked(packet.payload_mut()));
}
{ // parsing
    let packet = Ipv4Packet::new_checked(&buffer)
                            .expect("truncated packet");
    let parsed = Ipv4Repr::parse(&packet, &ChecksumCapabilities::default())
                          .expect("malformed packet");
    assert_eq!(ip_repr, parsed);
    let igmp = IgmpPacket::new_checked(packet.payload()).expect("truncated message");
    assert_eq!(IgmpRepr::parse(&igmp), Ok(igmp_repr));
}
```
*/

mod field {
    pub type Field = ::core::ops::Range<usize>;
}

pub mod igmp;
pub(crate) mod ip;
mod ipv4;

pub use self::ip::{checksum, Protocol as IpProtocol};

pub use self::ipv4::{
    Address as Ipv4Address, Packet as Ipv4Packet, Repr as Ipv4Repr, HEADER_LEN as IPV4_HEADER_LEN,
    MIN_MTU as IPV4_MIN_MTU, ROUTER_ALERT_OPTION as IPV4_ROUTER_ALERT_OPTION,
    TOS_INTERNETWORK_CONTROL as IPV4_TOS_INTERNETWORK_CONTROL,
};

pub use self::igmp::{
    GroupRecord as IgmpGroupRecord, GroupRecords as IgmpGroupRecords, IgmpVersion,
    Message as IgmpMessage, Packet as IgmpPacket, RecordType as IgmpRecordType,
    Repr as IgmpRepr, Sources as IgmpSources, HEADER_LEN as IGMP_HEADER_LEN,
};
