#![no_main]
use libfuzzer_sys::fuzz_target;
use smoligmp::iface::dispatch;
use smoligmp::phy::ChecksumCapabilities;
use smoligmp::wire::*;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = IgmpPacket::new_checked(data) {
        if let Ok(repr) = IgmpRepr::parse(&packet) {
            let _ = format!("{}", repr);
            let mut bytes = vec![0; repr.buffer_len()];
            repr.emit(&mut IgmpPacket::new_unchecked(&mut bytes[..]));
        }
    }

    if let Ok(packet) = Ipv4Packet::new_checked(data) {
        let caps = ChecksumCapabilities::ignored();
        if let Ok(ip_repr) = Ipv4Repr::parse(&packet, &caps) {
            let _ = dispatch::parse(&ip_repr, packet.payload(), &caps);
        }
    }
});
