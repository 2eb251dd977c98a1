use alloc::vec::Vec;

use super::group::{FilterMode, Group};
use crate::phy::{Device, TxToken};
use crate::time::Instant;
use crate::wire::igmp::{HEADER_LEN, RECORD_HEADER_LEN, SOURCE_LEN};
use crate::wire::{
    IgmpGroupRecord, IgmpMessage, IgmpPacket, IgmpRecordType, IgmpRepr, IgmpVersion, IpProtocol,
    Ipv4Address, Ipv4Packet, Ipv4Repr, IPV4_TOS_INTERNETWORK_CONTROL,
};

/// Packs IGMPv3 group records into as few Membership Report messages as
/// the size limit allows. See [RFC 3376 § 4.2.16].
///
/// [RFC 3376 § 4.2.16]: https://tools.ietf.org/html/rfc3376#section-4.2.16
#[derive(Debug)]
pub(super) struct ReportBuilder {
    max_len: usize,
    current: Vec<u8>,
    records: u16,
    messages: Vec<Vec<u8>>,
}

impl ReportBuilder {
    /// Smallest message that fits a header and a record with one source.
    pub(super) const MIN_LEN: usize = HEADER_LEN + RECORD_HEADER_LEN + SOURCE_LEN;

    pub(super) fn new(max_len: usize) -> ReportBuilder {
        ReportBuilder {
            max_len: max_len.max(Self::MIN_LEN),
            current: Vec::new(),
            records: 0,
            messages: Vec::new(),
        }
    }

    fn max_sources(&self) -> usize {
        (self.max_len - HEADER_LEN - RECORD_HEADER_LEN) / SOURCE_LEN
    }

    /// Append a record. Source lists too long for a single message are
    /// split over several records, except for EXCLUDE-type records, which
    /// are truncated instead.
    pub(super) fn add_record(
        &mut self,
        record_type: IgmpRecordType,
        group_addr: Ipv4Address,
        sources: &[Ipv4Address],
    ) {
        let max_sources = self.max_sources();
        if sources.len() <= max_sources {
            return self.push_record(record_type, group_addr, sources);
        }
        match record_type {
            IgmpRecordType::ModeIsExclude | IgmpRecordType::ChangeToExclude => {
                net_debug!(
                    "IGMP: truncating {} record for {} to {} sources",
                    record_type,
                    group_addr,
                    max_sources
                );
                self.push_record(record_type, group_addr, &sources[..max_sources])
            }
            _ => {
                for chunk in sources.chunks(max_sources) {
                    self.push_record(record_type, group_addr, chunk)
                }
            }
        }
    }

    fn push_record(
        &mut self,
        record_type: IgmpRecordType,
        group_addr: Ipv4Address,
        sources: &[Ipv4Address],
    ) {
        let record_len = RECORD_HEADER_LEN + sources.len() * SOURCE_LEN;
        if self.records > 0 && self.current.len() + record_len > self.max_len {
            self.flush();
        }
        if self.current.is_empty() {
            self.current.resize(HEADER_LEN, 0);
        }

        let start = self.current.len();
        self.current.resize(start + record_len, 0);
        let mut record = IgmpGroupRecord::new_unchecked(&mut self.current[start..]);
        record.set_record_type(record_type);
        record.set_aux_data_len(0);
        record.set_num_srcs(sources.len() as u16);
        record.set_group_addr(group_addr);
        for (index, &addr) in sources.iter().enumerate() {
            record.set_source(index, addr);
        }
        self.records += 1;
    }

    fn flush(&mut self) {
        if self.records == 0 {
            return;
        }
        let mut message = core::mem::take(&mut self.current);
        let mut packet = IgmpPacket::new_unchecked(&mut message[..]);
        packet.set_msg_type(IgmpMessage::MembershipReportV3);
        packet.set_max_resp_code(0);
        packet.clear_report_reserved();
        packet.set_num_records(self.records);
        packet.fill_checksum();
        self.messages.push(message);
        self.records = 0;
    }

    /// Finalize the message in progress and return every message built.
    pub(super) fn finish(mut self) -> Vec<Vec<u8>> {
        self.flush();
        self.messages
    }
}

/// Append the Current-State Record of `group`, see [RFC 3376 § 5.2].
///
/// If the group has a pending Group-and-Source-Specific query, only the
/// queried sources the host still wants to hear from are reported.
///
/// [RFC 3376 § 5.2]: https://tools.ietf.org/html/rfc3376#section-5.2
pub(super) fn current_state_record(
    builder: &mut ReportBuilder,
    group: &Group,
    source_specific: bool,
) {
    if source_specific && !group.queried.is_empty() {
        let sources: Vec<Ipv4Address> = match group.filter_mode {
            FilterMode::Include => group
                .queried
                .iter()
                .filter(|&addr| group.sources.contains(addr))
                .collect(),
            FilterMode::Exclude => group
                .queried
                .iter()
                .filter(|&addr| !group.sources.contains(addr))
                .collect(),
        };
        if !sources.is_empty() {
            builder.add_record(IgmpRecordType::ModeIsInclude, group.addr, &sources);
        }
        return;
    }

    if group.is_baseline() {
        return;
    }
    let sources: Vec<Ipv4Address> = group.sources.iter().collect();
    let record_type = match group.filter_mode {
        FilterMode::Include => IgmpRecordType::ModeIsInclude,
        FilterMode::Exclude => IgmpRecordType::ModeIsExclude,
    };
    builder.add_record(record_type, group.addr, &sources);
}

/// Append the State-Change Records of `group` and count the transmission.
/// See [RFC 3376 § 5.1].
///
/// A pending filter-mode change is reported as TO_IN / TO_EX with the full
/// source list; otherwise the ALLOW and BLOCK lists are reported, and every
/// source is dropped from them once it has been sent often enough.
///
/// [RFC 3376 § 5.1]: https://tools.ietf.org/html/rfc3376#section-5.1
pub(super) fn state_change_records(builder: &mut ReportBuilder, group: &mut Group) {
    if group.retransmit > 0 {
        let sources: Vec<Ipv4Address> = group.sources.iter().collect();
        let record_type = match group.filter_mode {
            FilterMode::Include => IgmpRecordType::ChangeToInclude,
            FilterMode::Exclude => IgmpRecordType::ChangeToExclude,
        };
        builder.add_record(record_type, group.addr, &sources);
        group.retransmit -= 1;
        return;
    }

    if !group.allow.is_empty() {
        let sources: Vec<Ipv4Address> = group.allow.iter().collect();
        builder.add_record(IgmpRecordType::AllowNewSources, group.addr, &sources);
        group.allow.decrement_and_prune();
    }
    if !group.block.is_empty() {
        let sources: Vec<Ipv4Address> = group.block.iter().collect();
        builder.add_record(IgmpRecordType::BlockOldSources, group.addr, &sources);
        group.block.decrement_and_prune();
    }
}

/// Build the 8-octet IGMPv1/v2 message described by `repr`.
pub(super) fn legacy_message(repr: &IgmpRepr) -> [u8; HEADER_LEN] {
    let mut buffer = [0; HEADER_LEN];
    repr.emit(&mut IgmpPacket::new_unchecked(&mut buffer[..]));
    buffer
}

/// Send an IGMP message in an IPv4 datagram with a TTL of 1. See [RFC 3376 § 4].
///
/// IGMPv2 and IGMPv3 messages carry the Router Alert option; IGMPv3 messages
/// also use the Internetwork Control precedence. Returns `false` if the
/// device had no transmit buffer, in which case the message is dropped.
///
/// [RFC 3376 § 4]: https://tools.ietf.org/html/rfc3376#section-4
pub(super) fn transmit<D>(
    device: &mut D,
    now: Instant,
    src_addr: Ipv4Address,
    dst_addr: Ipv4Address,
    version: IgmpVersion,
    payload: &[u8],
) -> bool
where
    D: Device + ?Sized,
{
    let caps = device.capabilities();
    let ip_repr = Ipv4Repr {
        src_addr,
        dst_addr,
        next_header: IpProtocol::Igmp,
        payload_len: payload.len(),
        hop_limit: 1,
        tos: match version {
            IgmpVersion::Version3 => IPV4_TOS_INTERNETWORK_CONTROL,
            _ => 0,
        },
        router_alert: version != IgmpVersion::Version1,
    };

    let Some(tx_token) = device.transmit(now) else {
        net_debug!("IGMP: no transmit buffer, dropping message to {}", dst_addr);
        return false;
    };

    net_trace!(
        "IGMP: sending {} octets to {} ({})",
        payload.len(),
        dst_addr,
        version
    );
    tx_token.consume(ip_repr.buffer_len() + payload.len(), |buffer| {
        let mut packet = Ipv4Packet::new_unchecked(buffer);
        ip_repr.emit(&mut packet, &caps.checksum);
        packet.payload_mut().copy_from_slice(payload);
    });
    true
}
