/*! IGMP host state machine.

A [Host] tracks, for one interface, which multicast groups the application
wants to receive and from which sources, and keeps the routers on the link
informed about it as described in [RFC 3376], falling back to the
[RFC 2236] and [RFC 1112] behaviors when older queriers are present.

All timers are polled: [Host::tick] must be called periodically (the
[Interface](../struct.Interface.html) does so every
[Config::tick_interval]), and received messages are fed in through the
[Handler](../trait.Handler.html) implementation.

[RFC 1112]: https://tools.ietf.org/html/rfc1112
[RFC 2236]: https://tools.ietf.org/html/rfc2236
[RFC 3376]: https://tools.ietf.org/html/rfc3376
*/

use alloc::vec::Vec;
use core::fmt;

use managed::ManagedSlice;

use crate::phy::Device;
use crate::rand::Rand;
use crate::time::{Duration, Instant, Timer};
use crate::wire::{IgmpRepr, IgmpVersion, Ipv4Address, IPV4_HEADER_LEN, IPV4_ROUTER_ALERT_OPTION};

mod group;
mod query;
mod report;
mod source;
#[cfg(test)]
mod tests;

pub use self::group::{FilterMode, Group, GroupState};
pub use self::source::{SourceEntry, SourceList};

use self::report::ReportBuilder;

/// Error type for the multicast state-change API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MulticastError {
    /// The table of joined multicast groups is already full.
    GroupTableFull,
    /// The requested source list does not fit the configured capacity.
    SourceListFull,
    /// The address is not a multicast group address.
    Unaddressable,
}

impl fmt::Display for MulticastError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MulticastError::GroupTableFull => write!(f, "GroupTableFull"),
            MulticastError::SourceListFull => write!(f, "SourceListFull"),
            MulticastError::Unaddressable => write!(f, "Unaddressable"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MulticastError {}

/// How much of the requested source filter the host keeps track of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceFiltering {
    /// No per-source state. Any membership request other than INCLUDE{}
    /// is treated as EXCLUDE{}, i.e. reception from every source.
    AnySource,
    /// Full source filtering, with room for `max_sources` addresses in each
    /// per-group list.
    SourceSpecific { max_sources: usize },
}

impl SourceFiltering {
    /// Return the per-list source capacity.
    pub fn max_sources(&self) -> usize {
        match *self {
            SourceFiltering::AnySource => 0,
            SourceFiltering::SourceSpecific { max_sources } => max_sources,
        }
    }
}

/// Configuration of an IGMP host.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// Random seed.
    ///
    /// It is strongly recommended that the random seed is different on each
    /// boot, so that hosts sharing a link pick different report delays.
    pub random_seed: u64,

    /// Robustness Variable: how many times each state-change report is sent.
    pub robustness: u8,

    /// Upper bound of the random delay between IGMPv3 state-change retransmissions.
    pub unsolicited_report_interval: Duration,

    /// Upper bound of the random delay before an unsolicited IGMPv1/v2 report.
    pub legacy_unsolicited_report_interval: Duration,

    /// How long the host stays in an older compatibility mode after the last
    /// query of that version.
    pub older_version_querier_present_timeout: Duration,

    /// Largest IGMPv3 report message, in octets. Reports are further limited
    /// by the device MTU.
    pub max_message_size: usize,

    /// Source filter tracking.
    pub source_filtering: SourceFiltering,

    /// Minimum spacing of host ticks driven by the interface.
    pub tick_interval: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            random_seed: 0,
            robustness: 2,
            unsolicited_report_interval: Duration::from_secs(1),
            legacy_unsolicited_report_interval: Duration::from_secs(10),
            older_version_querier_present_timeout: Duration::from_secs(400),
            max_message_size: 1024,
            source_filtering: SourceFiltering::SourceSpecific { max_sources: 8 },
            tick_interval: Duration::from_millis(200),
        }
    }
}

/// The IGMP host context of one interface.
#[derive(Debug)]
pub struct Host<'a> {
    config: Config,
    rand: Rand,
    compat_mode: IgmpVersion,
    v1_querier_present: Timer,
    v2_querier_present: Timer,
    /// Pending response to an IGMPv3 General Query.
    general_query: Timer,
    /// Next state-change report retransmission.
    state_change: Timer,
    groups: ManagedSlice<'a, Group>,
    link_up: bool,
    ipv4_addr: Option<Ipv4Address>,
}

impl<'a> Host<'a> {
    /// Create a host using the provided group table storage.
    ///
    /// The table holds at most as many groups as the storage has slots, unless
    /// the storage is a `Vec`, which grows as needed.
    pub fn new<GroupsT>(config: Config, groups: GroupsT) -> Host<'a>
    where
        GroupsT: Into<ManagedSlice<'a, Group>>,
    {
        let mut groups = groups.into();
        for group in groups.iter_mut() {
            group.release();
        }
        Host {
            rand: Rand::new(config.random_seed),
            config,
            compat_mode: IgmpVersion::Version3,
            v1_querier_present: Timer::STOPPED,
            v2_querier_present: Timer::STOPPED,
            general_query: Timer::STOPPED,
            state_change: Timer::STOPPED,
            groups,
            link_up: false,
            ipv4_addr: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Return the host compatibility mode. See [RFC 3376 § 7.2.1].
    ///
    /// [RFC 3376 § 7.2.1]: https://tools.ietf.org/html/rfc3376#section-7.2.1
    pub fn compatibility_mode(&self) -> IgmpVersion {
        self.compat_mode
    }

    /// Return the address reports are sent from, if any.
    pub fn ipv4_addr(&self) -> Option<Ipv4Address> {
        self.ipv4_addr
    }

    /// Look up an active group.
    pub fn group(&self, addr: Ipv4Address) -> Option<&Group> {
        self.groups
            .iter()
            .find(|group| group.is_active() && group.addr == addr)
    }

    /// Iterate the active groups.
    pub fn groups(&self) -> impl Iterator<Item = &Group> + '_ {
        self.groups.iter().filter(|group| group.is_active())
    }

    /// Query whether the host wants to receive traffic sent to `addr`.
    ///
    /// The all-systems group is always received.
    pub fn is_member(&self, addr: Ipv4Address) -> bool {
        addr == Ipv4Address::MULTICAST_ALL_SYSTEMS
            || self.group(addr).is_some_and(|group| !group.is_baseline())
    }

    /// Whether the interface can send reports.
    fn is_ready(&self) -> bool {
        self.link_up && self.ipv4_addr.is_some_and(|addr| addr.is_unicast())
    }

    fn group_index(&self, addr: Ipv4Address) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.is_active() && group.addr == addr)
    }

    fn create_group(&mut self, addr: Ipv4Address) -> Result<usize, MulticastError> {
        let group = Group::new(addr, self.config.source_filtering.max_sources());
        let index = match self.groups.iter().position(|group| !group.is_active()) {
            Some(index) => {
                self.groups[index] = group;
                index
            }
            None => match &mut self.groups {
                ManagedSlice::Borrowed(_) => return Err(MulticastError::GroupTableFull),
                ManagedSlice::Owned(groups) => {
                    groups.push(group);
                    groups.len() - 1
                }
            },
        };
        net_debug!("IGMP: created group {}", addr);
        Ok(index)
    }

    fn delete_group(&mut self, index: usize) {
        net_debug!("IGMP: deleted group {}", self.groups[index].addr);
        self.groups[index].release();
    }

    /// Largest IGMPv3 message the device can carry.
    fn max_message_len<D>(&self, device: &D) -> usize
    where
        D: Device + ?Sized,
    {
        let mtu = device.capabilities().max_transmission_unit;
        let ip_header_len = IPV4_HEADER_LEN + IPV4_ROUTER_ALERT_OPTION.len();
        self.config
            .max_message_size
            .min(mtu.saturating_sub(ip_header_len))
            .max(ReportBuilder::MIN_LEN)
    }

    /// Handle a change of the link state or of the interface address.
    ///
    /// Every pending timer is cancelled and every joined group goes back to
    /// the initial state, so that it is reported afresh once the interface
    /// is up with a valid address.
    pub fn link_change_event(&mut self, link_up: bool, ipv4_addr: Option<Ipv4Address>) {
        net_debug!(
            "IGMP: link change, up={} addr={:?}",
            link_up,
            ipv4_addr
        );
        self.link_up = link_up;
        self.ipv4_addr = ipv4_addr;

        self.compat_mode = IgmpVersion::Version3;
        self.v1_querier_present.stop();
        self.v2_querier_present.stop();
        self.general_query.stop();
        self.state_change.stop();

        for group in self.groups.iter_mut().filter(|group| group.is_active()) {
            if group.is_baseline() {
                // Only retransmissions of a leave were pending.
                group.release();
                continue;
            }
            group.state = GroupState::InitMember;
            group.flag = false;
            group.timer.stop();
            group.clear_v3_state();
        }
    }

    /// Join `addr`, receiving from any source. Shorthand for an EXCLUDE{} state change.
    pub fn join_group<D>(
        &mut self,
        now: Instant,
        device: &mut D,
        addr: Ipv4Address,
    ) -> Result<(), MulticastError>
    where
        D: Device + ?Sized,
    {
        self.state_change_event(now, device, addr, FilterMode::Exclude, &[])
    }

    /// Leave `addr`. Shorthand for an INCLUDE{} state change.
    pub fn leave_group<D>(
        &mut self,
        now: Instant,
        device: &mut D,
        addr: Ipv4Address,
    ) -> Result<(), MulticastError>
    where
        D: Device + ?Sized,
    {
        self.state_change_event(now, device, addr, FilterMode::Include, &[])
    }

    /// Change the reception state of the interface for `addr` to
    /// `filter_mode` over `sources`. See [RFC 3376 § 5.1].
    ///
    /// INCLUDE with no sources leaves the group. Depending on the
    /// compatibility mode a Leave Group message or a State-Change Report
    /// may be sent right away through `device`.
    ///
    /// [RFC 3376 § 5.1]: https://tools.ietf.org/html/rfc3376#section-5.1
    pub fn state_change_event<D>(
        &mut self,
        now: Instant,
        device: &mut D,
        addr: Ipv4Address,
        filter_mode: FilterMode,
        sources: &[Ipv4Address],
    ) -> Result<(), MulticastError>
    where
        D: Device + ?Sized,
    {
        if !addr.is_multicast() {
            return Err(MulticastError::Unaddressable);
        }
        // The all-systems group is joined implicitly and never reported.
        if addr == Ipv4Address::MULTICAST_ALL_SYSTEMS {
            return Ok(());
        }

        let (filter_mode, sources) = self.normalize_filter(filter_mode, sources)?;
        let baseline = filter_mode == FilterMode::Include && sources.is_empty();

        let index = match self.group_index(addr) {
            Some(index) => index,
            None if baseline => return Ok(()),
            None => {
                let index = self.create_group(addr)?;
                let group = &mut self.groups[index];
                group.filter_mode = filter_mode;
                group.sources = sources;
                return Ok(());
            }
        };

        if self.groups[index].state == GroupState::InitMember {
            if baseline {
                // Nothing was reported yet, so there is nothing to undo.
                self.delete_group(index);
            } else {
                let group = &mut self.groups[index];
                group.filter_mode = filter_mode;
                group.sources = sources;
            }
            return Ok(());
        }

        if self.compat_mode != IgmpVersion::Version3 {
            self.legacy_state_change(now, device, index, filter_mode, sources);
            return Ok(());
        }

        let robustness = self.config.robustness;
        let ready = self.is_ready();
        let group = &mut self.groups[index];
        if !ready {
            group.filter_mode = filter_mode;
            group.sources = sources;
            return Ok(());
        }
        if group.filter_mode == filter_mode && group.sources.same_set(&sources) {
            return Ok(());
        }

        net_debug!(
            "IGMP: group {} changes to {} {} sources",
            addr,
            filter_mode,
            sources.len()
        );
        if group.filter_mode != filter_mode || group.retransmit > 0 {
            group.allow.clear();
            group.block.clear();
            group.retransmit = robustness;
        } else if merge_source_changes(group, &sources, robustness).is_err() {
            net_debug!("IGMP: source lists of {} full, reporting full state", addr);
            group.allow.clear();
            group.block.clear();
            group.retransmit = robustness;
        }
        group.filter_mode = filter_mode;
        group.sources = sources;

        self.send_state_change_report(now, device);
        self.schedule_state_change(now);
        Ok(())
    }

    /// Reduce a requested filter to what the configured source filtering can express.
    fn normalize_filter(
        &self,
        filter_mode: FilterMode,
        sources: &[Ipv4Address],
    ) -> Result<(FilterMode, SourceList), MulticastError> {
        let capacity = self.config.source_filtering.max_sources();
        match self.config.source_filtering {
            SourceFiltering::AnySource => match filter_mode {
                FilterMode::Include if sources.is_empty() => {
                    Ok((FilterMode::Include, SourceList::new(capacity)))
                }
                _ => Ok((FilterMode::Exclude, SourceList::new(capacity))),
            },
            SourceFiltering::SourceSpecific { .. } => {
                Ok((filter_mode, SourceList::from_addrs(sources, capacity)?))
            }
        }
    }

    /// Apply a state change while an IGMPv1 or IGMPv2 querier is present.
    ///
    /// Older versions have no notion of sources: only leaving is reported.
    fn legacy_state_change<D>(
        &mut self,
        now: Instant,
        device: &mut D,
        index: usize,
        filter_mode: FilterMode,
        sources: SourceList,
    ) where
        D: Device + ?Sized,
    {
        let group = &mut self.groups[index];
        group.filter_mode = filter_mode;
        group.sources = sources;
        if !group.is_baseline() {
            return;
        }

        // IGMPv1 has no leave message.
        if self.compat_mode == IgmpVersion::Version2 && group.flag {
            let group_addr = group.addr;
            if let Some(src_addr) = self.ipv4_addr.filter(|_| self.is_ready()) {
                let message = report::legacy_message(&IgmpRepr::LeaveGroup { group_addr });
                report::transmit(
                    device,
                    now,
                    src_addr,
                    Ipv4Address::MULTICAST_ALL_ROUTERS,
                    IgmpVersion::Version2,
                    &message,
                );
            }
        }
        self.delete_group(index);
    }

    /// Run the timers. Must be called periodically.
    pub fn tick<D>(&mut self, now: Instant, device: &mut D)
    where
        D: Device + ?Sized,
    {
        self.tick_compat_timers(now);

        let ready = self.is_ready();
        let src_addr = self.ipv4_addr.unwrap_or(Ipv4Address::UNSPECIFIED);
        let compat_mode = self.compat_mode;

        for index in 0..self.groups.len() {
            let state = self.groups[index].state;
            match state {
                GroupState::InitMember if ready => match compat_mode {
                    IgmpVersion::Version3 => {
                        let group = &mut self.groups[index];
                        group.state = GroupState::IdleMember;
                        group.clear_v3_state();
                        group.retransmit = self.config.robustness;
                        // The first state-change report goes out right away.
                        self.state_change.start(now, Duration::ZERO);
                    }
                    _ => {
                        let delay = self
                            .rand
                            .rand_delay(self.config.legacy_unsolicited_report_interval);
                        let group = &mut self.groups[index];
                        send_legacy_report(device, now, src_addr, compat_mode, group.addr);
                        group.flag = true;
                        group.timer.start(now, delay);
                        group.state = GroupState::DelayingMember;
                    }
                },
                GroupState::DelayingMember if self.groups[index].timer.is_expired(now) => {
                    let group = &mut self.groups[index];
                    group.timer.stop();
                    group.state = GroupState::IdleMember;
                    if ready {
                        send_legacy_report(device, now, src_addr, compat_mode, group.addr);
                        group.flag = true;
                    }
                }
                GroupState::IdleMember if self.groups[index].timer.is_expired(now) => {
                    self.groups[index].timer.stop();
                    if ready && compat_mode == IgmpVersion::Version3 {
                        let mut builder = ReportBuilder::new(self.max_message_len(device));
                        report::current_state_record(&mut builder, &self.groups[index], true);
                        send_reports(device, now, src_addr, builder.finish());
                    }
                    self.groups[index].queried.clear();
                }
                _ => (),
            }
        }

        if self.general_query.is_expired(now) {
            self.general_query.stop();
            if ready && compat_mode == IgmpVersion::Version3 {
                let mut builder = ReportBuilder::new(self.max_message_len(device));
                for group in self.groups.iter().filter(|group| group.is_active()) {
                    report::current_state_record(&mut builder, group, false);
                }
                send_reports(device, now, src_addr, builder.finish());
            }
        }

        if self.state_change.is_expired(now) {
            self.state_change.stop();
            if ready && compat_mode == IgmpVersion::Version3 {
                self.send_state_change_report(now, device);
                self.schedule_state_change(now);
            }
        }

        if compat_mode == IgmpVersion::Version3 {
            self.flush_left_groups();
        }
    }

    /// Leave older-version compatibility modes whose querier has gone away.
    fn tick_compat_timers(&mut self, now: Instant) {
        if self.v1_querier_present.is_expired(now) {
            self.v1_querier_present.stop();
        }
        if self.v2_querier_present.is_expired(now) {
            self.v2_querier_present.stop();
        }
        let mode = self.querier_mode();
        if mode > self.compat_mode {
            net_debug!("IGMP: compatibility mode {} -> {}", self.compat_mode, mode);
            self.compat_mode = mode;
            // A pending legacy report is not carried over.
            for group in self.groups.iter_mut() {
                if group.state == GroupState::DelayingMember {
                    group.timer.stop();
                    group.state = GroupState::IdleMember;
                }
            }
        }
    }

    /// The compatibility mode implied by the older-version querier timers.
    fn querier_mode(&self) -> IgmpVersion {
        if self.v1_querier_present.is_running() {
            IgmpVersion::Version1
        } else if self.v2_querier_present.is_running() {
            IgmpVersion::Version2
        } else {
            IgmpVersion::Version3
        }
    }

    /// Release groups that have been left and have nothing more to report.
    fn flush_left_groups(&mut self) {
        for index in 0..self.groups.len() {
            let group = &self.groups[index];
            if group.state == GroupState::IdleMember
                && group.is_baseline()
                && !group.has_pending_changes()
            {
                self.delete_group(index);
            }
        }
    }

    /// Send the State-Change Records of every group with pending changes.
    fn send_state_change_report<D>(&mut self, now: Instant, device: &mut D)
    where
        D: Device + ?Sized,
    {
        let Some(src_addr) = self.ipv4_addr else {
            return;
        };
        let mut builder = ReportBuilder::new(self.max_message_len(device));
        for group in self.groups.iter_mut() {
            if group.state == GroupState::IdleMember && group.has_pending_changes() {
                report::state_change_records(&mut builder, group);
            }
        }
        send_reports(device, now, src_addr, builder.finish());
    }

    /// Arm the retransmission timer if any state change still has to be repeated.
    fn schedule_state_change(&mut self, now: Instant) {
        if self.groups.iter().any(|group| {
            group.state == GroupState::IdleMember && group.has_pending_changes()
        }) {
            let delay = self.rand.rand_delay(self.config.unsolicited_report_interval);
            self.state_change.start(now, delay);
        } else {
            self.state_change.stop();
        }
    }

    /// Return the earliest instant at which [tick] has something to do, if any.
    ///
    /// [tick]: #method.tick
    pub fn poll_at(&self, now: Instant) -> Option<Instant> {
        let ready = self.is_ready();
        let groups = self.groups.iter().filter_map(|group| match group.state {
            GroupState::InitMember if ready => Some(now),
            GroupState::DelayingMember | GroupState::IdleMember => group.timer.deadline(),
            _ => None,
        });
        [
            self.v1_querier_present,
            self.v2_querier_present,
            self.general_query,
            self.state_change,
        ]
        .iter()
        .filter_map(|timer| timer.deadline())
        .chain(groups)
        .min()
    }
}

/// Fold a same-mode source list change into the ALLOW and BLOCK lists.
/// See [RFC 3376 § 5.1].
///
/// [RFC 3376 § 5.1]: https://tools.ietf.org/html/rfc3376#section-5.1
fn merge_source_changes(
    group: &mut Group,
    new_sources: &SourceList,
    robustness: u8,
) -> Result<(), MulticastError> {
    let added: Vec<Ipv4Address> = new_sources
        .iter()
        .filter(|&addr| !group.sources.contains(addr))
        .collect();
    let removed: Vec<Ipv4Address> = group
        .sources
        .iter()
        .filter(|&addr| !new_sources.contains(addr))
        .collect();

    // In EXCLUDE mode, adding a source to the list blocks it.
    let (allow, block) = match group.filter_mode {
        FilterMode::Include => (added, removed),
        FilterMode::Exclude => (removed, added),
    };
    for addr in allow {
        group.block.remove(addr);
        group.allow.add(addr, robustness)?;
    }
    for addr in block {
        group.allow.remove(addr);
        group.block.add(addr, robustness)?;
    }
    Ok(())
}

fn send_legacy_report<D>(
    device: &mut D,
    now: Instant,
    src_addr: Ipv4Address,
    version: IgmpVersion,
    group_addr: Ipv4Address,
) where
    D: Device + ?Sized,
{
    let message = report::legacy_message(&IgmpRepr::MembershipReport { group_addr, version });
    report::transmit(device, now, src_addr, group_addr, version, &message);
}

fn send_reports<D>(device: &mut D, now: Instant, src_addr: Ipv4Address, messages: Vec<Vec<u8>>)
where
    D: Device + ?Sized,
{
    for message in messages {
        report::transmit(
            device,
            now,
            src_addr,
            Ipv4Address::MULTICAST_ALL_IGMPV3_ROUTERS,
            IgmpVersion::Version3,
            &message,
        );
    }
}
