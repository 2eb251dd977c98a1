// Packet implementation for the Internet Group Management Protocol,
// versions 1, 2 and 3. See [RFC 1112], [RFC 2236] and [RFC 3376].
//
// [RFC 1112]: https://tools.ietf.org/html/rfc1112
// [RFC 2236]: https://tools.ietf.org/html/rfc2236
// [RFC 3376]: https://tools.ietf.org/html/rfc3376

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::checksum;
use crate::time::Duration;
use crate::wire::Ipv4Address;
use crate::{Error, Result};

enum_with_unknown! {
    /// Internet Group Management Protocol message type.
    pub enum Message(u8) {
        /// Membership Query
        MembershipQuery = 0x11,
        /// Version 1 Membership Report
        MembershipReportV1 = 0x12,
        /// Version 2 Membership Report
        MembershipReportV2 = 0x16,
        /// Leave Group
        LeaveGroup = 0x17,
        /// Version 3 Membership Report
        MembershipReportV3 = 0x22,
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Message::MembershipQuery => write!(f, "membership query"),
            Message::MembershipReportV1 => write!(f, "version 1 membership report"),
            Message::MembershipReportV2 => write!(f, "version 2 membership report"),
            Message::LeaveGroup => write!(f, "leave group"),
            Message::MembershipReportV3 => write!(f, "version 3 membership report"),
            Message::Unknown(id) => write!(f, "{id}"),
        }
    }
}

enum_with_unknown! {
    /// IGMPv3 group record type. See [RFC 3376 § 4.2.12].
    ///
    /// [RFC 3376 § 4.2.12]: https://tools.ietf.org/html/rfc3376#section-4.2.12
    pub enum RecordType(u8) {
        /// Interface has a filter mode of INCLUDE for the specified group.
        ModeIsInclude = 0x01,
        /// Interface has a filter mode of EXCLUDE for the specified group.
        ModeIsExclude = 0x02,
        /// Interface has changed to a filter mode of INCLUDE.
        ChangeToInclude = 0x03,
        /// Interface has changed to a filter mode of EXCLUDE.
        ChangeToExclude = 0x04,
        /// Interface wishes to hear from the sources in the record.
        AllowNewSources = 0x05,
        /// Interface no longer wishes to hear from the sources in the record.
        BlockOldSources = 0x06,
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RecordType::ModeIsInclude => write!(f, "IS_IN"),
            RecordType::ModeIsExclude => write!(f, "IS_EX"),
            RecordType::ChangeToInclude => write!(f, "TO_IN"),
            RecordType::ChangeToExclude => write!(f, "TO_EX"),
            RecordType::AllowNewSources => write!(f, "ALLOW"),
            RecordType::BlockOldSources => write!(f, "BLOCK"),
            RecordType::Unknown(id) => write!(f, "{id}"),
        }
    }
}

/// A read/write wrapper around an Internet Group Management Protocol packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const TYPE: usize = 0;
    pub const MAX_RESP_CODE: usize = 1;
    pub const CHECKSUM: Field = 2..4;
    pub const GROUP_ADDRESS: Field = 4..8;

    // IGMPv3 Membership Query
    pub const SQRV: usize = 8;
    pub const QQIC: usize = 9;
    pub const QUERY_NUM_SRCS: Field = 10..12;

    // IGMPv3 Membership Report
    pub const REPORT_RESERVED: Field = 4..6;
    pub const NUM_RECORDS: Field = 6..8;

    // IGMPv3 group record
    pub const RECORD_TYPE: usize = 0;
    pub const AUX_DATA_LEN: usize = 1;
    pub const RECORD_NUM_SRCS: Field = 2..4;
    pub const RECORD_GROUP_ADDR: Field = 4..8;
}

/// Length of an IGMPv1/v2 message, and of the IGMPv3 report header.
pub const HEADER_LEN: usize = field::GROUP_ADDRESS.end;

/// Length of an IGMPv3 query without sources.
pub const QUERY_V3_HEADER_LEN: usize = field::QUERY_NUM_SRCS.end;

/// Length of an IGMPv3 group record without sources or auxiliary data.
pub const RECORD_HEADER_LEN: usize = field::RECORD_GROUP_ADDR.end;

/// Length of one source address in a query or group record.
pub const SOURCE_LEN: usize = 4;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with IGMP packet structure.
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no common header accessor will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    ///
    /// The IGMPv3 query accessors additionally require [is_v3_query] to hold.
    ///
    /// [is_v3_query]: #method.is_v3_query
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.buffer.as_ref().len()
    }

    /// Query whether the buffer is long enough to be an IGMPv3 query.
    /// See [RFC 3376 § 7.1].
    ///
    /// [RFC 3376 § 7.1]: https://tools.ietf.org/html/rfc3376#section-7.1
    pub fn is_v3_query(&self) -> bool {
        self.msg_type() == Message::MembershipQuery && self.len() >= QUERY_V3_HEADER_LEN
    }

    /// Return the message type field.
    #[inline]
    pub fn msg_type(&self) -> Message {
        let data = self.buffer.as_ref();
        Message::from(data[field::TYPE])
    }

    /// Return the maximum response code field, see [decode_exp_value].
    #[inline]
    pub fn max_resp_code(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::MAX_RESP_CODE]
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }

    /// Return the group address field.
    #[inline]
    pub fn group_addr(&self) -> Ipv4Address {
        let data = self.buffer.as_ref();
        Ipv4Address::from_bytes(&data[field::GROUP_ADDRESS])
    }

    /// Return the Suppress Router-Side Processing flag of an IGMPv3 query.
    #[inline]
    pub fn s_flag(&self) -> bool {
        let data = self.buffer.as_ref();
        (data[field::SQRV] & 0x08) != 0
    }

    /// Return the Querier's Robustness Variable of an IGMPv3 query.
    #[inline]
    pub fn qrv(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::SQRV] & 0x07
    }

    /// Return the Querier's Query Interval Code of an IGMPv3 query.
    #[inline]
    pub fn qqic(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::QQIC]
    }

    /// Return the number of sources of an IGMPv3 query.
    #[inline]
    pub fn num_srcs(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::QUERY_NUM_SRCS])
    }

    /// Return the number of group records of an IGMPv3 report.
    #[inline]
    pub fn num_records(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::NUM_RECORDS])
    }

    /// Validate the checksum, which covers the whole message.
    ///
    /// # Fuzzing
    /// This function always returns `true` when fuzzing.
    pub fn verify_checksum(&self) -> bool {
        if cfg!(fuzzing) {
            return true;
        }

        let data = self.buffer.as_ref();
        checksum::data(data) == !0
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return the source addresses of an IGMPv3 query.
    ///
    /// # Panics
    /// This function panics if the buffer is shorter than the declared source count.
    #[inline]
    pub fn sources(&self) -> &'a [u8] {
        let len = self.num_srcs() as usize * SOURCE_LEN;
        let data = self.buffer.as_ref();
        &data[QUERY_V3_HEADER_LEN..QUERY_V3_HEADER_LEN + len]
    }

    /// Return the group records of an IGMPv3 report.
    #[inline]
    pub fn records(&self) -> &'a [u8] {
        let data = self.buffer.as_ref();
        &data[HEADER_LEN..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the message type field.
    #[inline]
    pub fn set_msg_type(&mut self, value: Message) {
        let data = self.buffer.as_mut();
        data[field::TYPE] = value.into()
    }

    /// Set the maximum response code field, see [encode_exp_value].
    #[inline]
    pub fn set_max_resp_code(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::MAX_RESP_CODE] = value;
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
    }

    /// Set the group address field.
    #[inline]
    pub fn set_group_address(&mut self, addr: Ipv4Address) {
        let data = self.buffer.as_mut();
        data[field::GROUP_ADDRESS].copy_from_slice(addr.as_bytes());
    }

    /// Set the S flag and the Querier's Robustness Variable of an IGMPv3 query.
    /// The reserved bits are cleared.
    #[inline]
    pub fn set_sqrv(&mut self, s_flag: bool, qrv: u8) {
        let s_bit = if s_flag { 0x08 } else { 0x00 };
        let data = self.buffer.as_mut();
        data[field::SQRV] = s_bit | (qrv & 0x07);
    }

    /// Set the Querier's Query Interval Code of an IGMPv3 query.
    #[inline]
    pub fn set_qqic(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::QQIC] = value;
    }

    /// Set the number of sources of an IGMPv3 query.
    #[inline]
    pub fn set_num_srcs(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::QUERY_NUM_SRCS], value)
    }

    /// Clear the reserved field of an IGMPv3 report.
    #[inline]
    pub fn clear_report_reserved(&mut self) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::REPORT_RESERVED], 0)
    }

    /// Set the number of group records of an IGMPv3 report.
    #[inline]
    pub fn set_num_records(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::NUM_RECORDS], value)
    }

    /// Return a mutable pointer to the source addresses of an IGMPv3 query.
    #[inline]
    pub fn sources_mut(&mut self) -> &mut [u8] {
        let data = self.buffer.as_mut();
        &mut data[QUERY_V3_HEADER_LEN..]
    }

    /// Return a mutable pointer to the group records of an IGMPv3 report.
    #[inline]
    pub fn records_mut(&mut self) -> &mut [u8] {
        let data = self.buffer.as_mut();
        &mut data[HEADER_LEN..]
    }

    /// Compute and fill in the checksum.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::data(data)
        };
        self.set_checksum(checksum)
    }
}

/// A read/write wrapper around an IGMPv3 group record.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GroupRecord<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> GroupRecord<T> {
    /// Imbue a raw octet buffer with group record structure.
    pub const fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Self> {
        let record = Self::new_unchecked(buffer);
        record.check_len()?;
        Ok(record)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than the
    /// record header or than the sources and auxiliary data it declares.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < RECORD_HEADER_LEN || len < self.buffer_len() {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Consume the record, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the length of the record, including sources and auxiliary data.
    pub fn buffer_len(&self) -> usize {
        RECORD_HEADER_LEN
            + self.num_srcs() as usize * SOURCE_LEN
            + self.aux_data_len() as usize * 4
    }

    /// Return the record type field.
    #[inline]
    pub fn record_type(&self) -> RecordType {
        let data = self.buffer.as_ref();
        RecordType::from(data[field::RECORD_TYPE])
    }

    /// Return the length of the auxiliary data, in 32-bit words.
    #[inline]
    pub fn aux_data_len(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::AUX_DATA_LEN]
    }

    /// Return the number of sources field.
    #[inline]
    pub fn num_srcs(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::RECORD_NUM_SRCS])
    }

    /// Return the multicast address field.
    #[inline]
    pub fn group_addr(&self) -> Ipv4Address {
        let data = self.buffer.as_ref();
        Ipv4Address::from_bytes(&data[field::RECORD_GROUP_ADDR])
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> GroupRecord<&'a T> {
    /// Return the source addresses of the record.
    #[inline]
    pub fn sources(&self) -> Sources<'a> {
        let len = self.num_srcs() as usize * SOURCE_LEN;
        let data = self.buffer.as_ref();
        Sources {
            data: &data[RECORD_HEADER_LEN..RECORD_HEADER_LEN + len],
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> GroupRecord<T> {
    /// Set the record type field.
    #[inline]
    pub fn set_record_type(&mut self, value: RecordType) {
        let data = self.buffer.as_mut();
        data[field::RECORD_TYPE] = value.into();
    }

    /// Set the length of the auxiliary data, in 32-bit words.
    #[inline]
    pub fn set_aux_data_len(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::AUX_DATA_LEN] = value;
    }

    /// Set the number of sources field.
    #[inline]
    pub fn set_num_srcs(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::RECORD_NUM_SRCS], value);
    }

    /// Set the multicast address field.
    #[inline]
    pub fn set_group_addr(&mut self, addr: Ipv4Address) {
        let data = self.buffer.as_mut();
        data[field::RECORD_GROUP_ADDR].copy_from_slice(addr.as_bytes());
    }

    /// Set the source address at `index`.
    #[inline]
    pub fn set_source(&mut self, index: usize, addr: Ipv4Address) {
        let start = RECORD_HEADER_LEN + index * SOURCE_LEN;
        let data = self.buffer.as_mut();
        data[start..start + SOURCE_LEN].copy_from_slice(addr.as_bytes());
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> fmt::Display for GroupRecord<&'a T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} group={} srcs={}",
            self.record_type(),
            self.group_addr(),
            self.sources()
        )?;
        if self.aux_data_len() != 0 {
            write!(f, " aux_len={}", self.aux_data_len())?;
        }
        Ok(())
    }
}

/// A validated list of IPv4 source addresses, as carried by IGMPv3 queries and group records.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sources<'a> {
    data: &'a [u8],
}

impl<'a> Sources<'a> {
    /// Wrap a sequence of source addresses in network byte order.
    ///
    /// Returns `Err(Error::Malformed)` if the length is not a multiple of four.
    pub fn new(data: &'a [u8]) -> Result<Sources<'a>> {
        if data.len() % SOURCE_LEN != 0 {
            return Err(Error::Malformed);
        }
        Ok(Sources { data })
    }

    /// Return the number of addresses.
    pub fn len(&self) -> usize {
        self.data.len() / SOURCE_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate the addresses in wire order.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Address> + 'a {
        self.data.chunks_exact(SOURCE_LEN).map(Ipv4Address::from_bytes)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

impl<'a> fmt::Display for Sources<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, addr) in self.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{addr}")?;
        }
        write!(f, "]")
    }
}

/// The validated group records of an IGMPv3 report.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupRecords<'a> {
    data: &'a [u8],
    count: u16,
}

impl<'a> GroupRecords<'a> {
    /// Validate `count` consecutive group records at the start of `data`.
    ///
    /// Returns `Err(Error::Truncated)` if any record, its sources or its
    /// auxiliary data run past the end of the buffer. Trailing octets after
    /// the last record are not part of the result.
    pub fn new(data: &'a [u8], count: u16) -> Result<GroupRecords<'a>> {
        let mut rest = data;
        for _ in 0..count {
            let record = GroupRecord::new_checked(rest)?;
            rest = &rest[record.buffer_len()..];
        }
        Ok(GroupRecords {
            data: &data[..data.len() - rest.len()],
            count,
        })
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate the records in wire order.
    pub fn iter(&self) -> GroupRecordIter<'a> {
        GroupRecordIter {
            data: self.data,
            remaining: self.count,
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

/// An iterator over the records of [GroupRecords].
#[derive(Debug, Clone)]
pub struct GroupRecordIter<'a> {
    data: &'a [u8],
    remaining: u16,
}

impl<'a> Iterator for GroupRecordIter<'a> {
    type Item = GroupRecord<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let len = GroupRecord::new_checked(self.data).ok()?.buffer_len();
        let record = GroupRecord::new_unchecked(&self.data[..len]);
        self.data = &self.data[len..];
        self.remaining -= 1;
        Some(record)
    }
}

/// IGMP protocol version, as determined from a message's type and length.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IgmpVersion {
    /// IGMPv1
    Version1,
    /// IGMPv2
    Version2,
    /// IGMPv3
    Version3,
}

impl fmt::Display for IgmpVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            IgmpVersion::Version1 => write!(f, "IGMPv1"),
            IgmpVersion::Version2 => write!(f, "IGMPv2"),
            IgmpVersion::Version3 => write!(f, "IGMPv3"),
        }
    }
}

/// A high-level representation of an Internet Group Management Protocol message.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Repr<'a> {
    /// IGMPv1 or IGMPv2 Membership Query.
    MembershipQuery {
        max_resp_time: Duration,
        group_addr: Ipv4Address,
        version: IgmpVersion,
    },
    /// IGMPv3 Membership Query.
    MembershipQueryV3 {
        max_resp_time: Duration,
        group_addr: Ipv4Address,
        s_flag: bool,
        qrv: u8,
        qqic: u8,
        sources: Sources<'a>,
    },
    /// IGMPv1 or IGMPv2 Membership Report.
    MembershipReport {
        group_addr: Ipv4Address,
        version: IgmpVersion,
    },
    /// IGMPv3 Membership Report.
    MembershipReportV3 { records: GroupRecords<'a> },
    /// IGMPv2 Leave Group.
    LeaveGroup { group_addr: Ipv4Address },
}

impl<'a> Repr<'a> {
    /// Parse an Internet Group Management Protocol packet and return
    /// a high-level representation.
    ///
    /// The checksum is not verified here.
    pub fn parse<T>(packet: &Packet<&'a T>) -> Result<Repr<'a>>
    where
        T: AsRef<[u8]> + ?Sized,
    {
        packet.check_len()?;

        if packet.msg_type() == Message::MembershipReportV3 {
            let records = GroupRecords::new(packet.records(), packet.num_records())?;
            return Ok(Repr::MembershipReportV3 { records });
        }

        // Check if the address is 0.0.0.0 or multicast
        let addr = packet.group_addr();
        if !addr.is_unspecified() && !addr.is_multicast() {
            return Err(Error::Malformed);
        }

        match packet.msg_type() {
            // See RFC 3376: 7.1. Query Version Distinctions
            Message::MembershipQuery if packet.len() == HEADER_LEN => {
                let version = if packet.max_resp_code() == 0 {
                    IgmpVersion::Version1
                } else {
                    IgmpVersion::Version2
                };
                // IGMPv2 Max Resp Time is linear, see RFC 2236 § 2.2.
                Ok(Repr::MembershipQuery {
                    max_resp_time: Duration::from_millis(packet.max_resp_code() as u64 * 100),
                    group_addr: addr,
                    version,
                })
            }
            Message::MembershipQuery if packet.len() < QUERY_V3_HEADER_LEN => Err(Error::Malformed),
            Message::MembershipQuery => {
                let sources_len = packet.num_srcs() as usize * SOURCE_LEN;
                if packet.len() < QUERY_V3_HEADER_LEN + sources_len {
                    return Err(Error::Truncated);
                }
                Ok(Repr::MembershipQueryV3 {
                    max_resp_time: max_resp_code_to_duration(packet.max_resp_code()),
                    group_addr: addr,
                    s_flag: packet.s_flag(),
                    qrv: packet.qrv(),
                    qqic: packet.qqic(),
                    sources: Sources::new(packet.sources())?,
                })
            }
            Message::MembershipReportV2 => Ok(Repr::MembershipReport {
                group_addr: addr,
                version: IgmpVersion::Version2,
            }),
            Message::MembershipReportV1 => Ok(Repr::MembershipReport {
                group_addr: addr,
                version: IgmpVersion::Version1,
            }),
            Message::LeaveGroup => Ok(Repr::LeaveGroup { group_addr: addr }),
            _ => Err(Error::Unrecognized),
        }
    }

    /// Return the length of a packet that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        match self {
            Repr::MembershipQueryV3 { sources, .. } => {
                QUERY_V3_HEADER_LEN + sources.as_bytes().len()
            }
            Repr::MembershipReportV3 { records } => HEADER_LEN + records.as_bytes().len(),
            _ => HEADER_LEN,
        }
    }

    /// Emit a high-level representation into an Internet Group Management Protocol packet.
    pub fn emit<T>(&self, packet: &mut Packet<&mut T>)
    where
        T: AsRef<[u8]> + AsMut<[u8]> + ?Sized,
    {
        match *self {
            Repr::MembershipQuery {
                max_resp_time,
                group_addr,
                version,
            } => {
                packet.set_msg_type(Message::MembershipQuery);
                match version {
                    IgmpVersion::Version1 => packet.set_max_resp_code(0),
                    _ => {
                        let decisecs = (max_resp_time.total_millis() / 100).min(0xff);
                        packet.set_max_resp_code(decisecs as u8)
                    }
                }
                packet.set_group_address(group_addr);
            }
            Repr::MembershipQueryV3 {
                max_resp_time,
                group_addr,
                s_flag,
                qrv,
                qqic,
                sources,
            } => {
                packet.set_msg_type(Message::MembershipQuery);
                packet.set_max_resp_code(duration_to_max_resp_code(max_resp_time));
                packet.set_group_address(group_addr);
                packet.set_sqrv(s_flag, qrv);
                packet.set_qqic(qqic);
                packet.set_num_srcs(sources.len() as u16);
                packet.sources_mut()[..sources.as_bytes().len()]
                    .copy_from_slice(sources.as_bytes());
            }
            Repr::MembershipReport {
                group_addr,
                version,
            } => {
                match version {
                    IgmpVersion::Version1 => packet.set_msg_type(Message::MembershipReportV1),
                    _ => packet.set_msg_type(Message::MembershipReportV2),
                };
                packet.set_max_resp_code(0);
                packet.set_group_address(group_addr);
            }
            Repr::MembershipReportV3 { records } => {
                packet.set_msg_type(Message::MembershipReportV3);
                packet.set_max_resp_code(0);
                packet.clear_report_reserved();
                packet.set_num_records(records.len() as u16);
                packet.records_mut()[..records.as_bytes().len()]
                    .copy_from_slice(records.as_bytes());
            }
            Repr::LeaveGroup { group_addr } => {
                packet.set_msg_type(Message::LeaveGroup);
                packet.set_max_resp_code(0);
                packet.set_group_address(group_addr);
            }
        }

        packet.fill_checksum()
    }
}

/// Encode a value into the 8-bit exponential format used by the Max Resp
/// Code and QQIC fields. See [RFC 3376 § 4.1.1].
///
/// Values below 128 are encoded verbatim. Larger values are rounded down
/// to the nearest representable value, and anything at or above 31744
/// saturates to `0xff`.
///
/// [RFC 3376 § 4.1.1]: https://tools.ietf.org/html/rfc3376#section-4.1.1
pub fn encode_exp_value(value: u32) -> u8 {
    if value < 128 {
        value as u8
    } else if value < 31744 {
        let mut mant = value >> 3;
        let mut exp = 0u8;
        while mant > 0x1f && exp < 0x7 {
            mant >>= 1;
            exp += 1;
        }
        0x80 | (exp << 4) | (mant as u8 & 0x0f)
    } else {
        0xff
    }
}

/// Decode an 8-bit exponential Max Resp Code or QQIC. See [RFC 3376 § 4.1.1].
///
/// [RFC 3376 § 4.1.1]: https://tools.ietf.org/html/rfc3376#section-4.1.1
pub fn decode_exp_value(code: u8) -> u32 {
    let code = code as u32;
    if code < 128 {
        code
    } else {
        let mant = code & 0x0f;
        let exp = (code >> 4) & 0x07;
        (mant | 0x10) << (exp + 3)
    }
}

/// Convert a Max Resp Code, in units of 1/10 second, to a duration.
pub fn max_resp_code_to_duration(code: u8) -> Duration {
    Duration::from_millis(decode_exp_value(code) as u64 * 100)
}

/// Convert a duration to a Max Resp Code, in units of 1/10 second.
pub fn duration_to_max_resp_code(duration: Duration) -> u8 {
    let decisecs = u32::try_from(duration.total_millis() / 100).unwrap_or(u32::MAX);
    encode_exp_value(decisecs)
}

impl<'a, T: AsRef<[u8]> + ?Sized> fmt::Display for Packet<&'a T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match Repr::parse(self) {
            Ok(repr) => write!(f, "{repr}"),
            Err(err) => write!(f, "IGMP ({err})"),
        }
    }
}

impl<'a> fmt::Display for Repr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Repr::MembershipQuery {
                max_resp_time,
                group_addr,
                version,
            } => write!(
                f,
                "IGMP membership query max_resp_time={max_resp_time} group_addr={group_addr} version={version}"
            ),
            Repr::MembershipQueryV3 {
                max_resp_time,
                group_addr,
                s_flag,
                qrv,
                qqic,
                sources,
            } => write!(
                f,
                "IGMP membership query max_resp_time={max_resp_time} group_addr={group_addr} \
                 version=IGMPv3 s={s_flag} qrv={qrv} qqi={}s srcs={sources}",
                decode_exp_value(qqic)
            ),
            Repr::MembershipReport {
                group_addr,
                version,
            } => write!(
                f,
                "IGMP membership report group_addr={group_addr} version={version}"
            ),
            Repr::MembershipReportV3 { records } => {
                write!(f, "IGMP membership report version=IGMPv3 records={}", records.len())?;
                for record in records.iter() {
                    write!(f, "\n  {record}")?;
                }
                Ok(())
            }
            Repr::LeaveGroup { group_addr } => {
                write!(f, "IGMP leave group group_addr={group_addr}")
            }
        }
    }
}
