use core::fmt;

use super::source::SourceList;
use crate::time::Timer;
use crate::wire::Ipv4Address;

/// Membership state of a group record. See [RFC 2236 § 6] and [RFC 3376 § 5].
///
/// [RFC 2236 § 6]: https://tools.ietf.org/html/rfc2236#section-6
/// [RFC 3376 § 5]: https://tools.ietf.org/html/rfc3376#section-5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GroupState {
    /// The slot is unused.
    #[default]
    NonMember,
    /// Joined, waiting for the interface to be ready to send the first report.
    InitMember,
    /// A legacy report is scheduled on the group timer.
    DelayingMember,
    /// No legacy report is pending.
    IdleMember,
}

/// Source filter mode of a group. See [RFC 3376 § 3.1].
///
/// [RFC 3376 § 3.1]: https://tools.ietf.org/html/rfc3376#section-3.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterMode {
    /// Receive only from the listed sources.
    #[default]
    Include,
    /// Receive from every source except the listed ones.
    Exclude,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FilterMode::Include => write!(f, "INCLUDE"),
            FilterMode::Exclude => write!(f, "EXCLUDE"),
        }
    }
}

/// One slot of the host group table.
///
/// This is public so you can use it to allocate space for the group table
/// when creating a [Host](struct.Host.html).
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub(super) addr: Ipv4Address,
    pub(super) state: GroupState,
    /// Set once this host has sent a legacy report for the group.
    pub(super) flag: bool,
    /// Legacy report delay, or pending IGMPv3 group-specific response.
    pub(super) timer: Timer,
    pub(super) filter_mode: FilterMode,
    pub(super) sources: SourceList,
    pub(super) allow: SourceList,
    pub(super) block: SourceList,
    pub(super) queried: SourceList,
    /// Remaining filter-mode-change (TO_IN / TO_EX) transmissions.
    pub(super) retransmit: u8,
}

impl Group {
    /// An unused slot.
    pub const EMPTY: Group = Group {
        addr: Ipv4Address::UNSPECIFIED,
        state: GroupState::NonMember,
        flag: false,
        timer: Timer::STOPPED,
        filter_mode: FilterMode::Include,
        sources: SourceList::EMPTY,
        allow: SourceList::EMPTY,
        block: SourceList::EMPTY,
        queried: SourceList::EMPTY,
        retransmit: 0,
    };

    pub(super) fn new(addr: Ipv4Address, max_sources: usize) -> Group {
        Group {
            addr,
            state: GroupState::InitMember,
            sources: SourceList::new(max_sources),
            allow: SourceList::new(max_sources),
            block: SourceList::new(max_sources),
            queried: SourceList::new(max_sources),
            ..Group::EMPTY
        }
    }

    /// Return the multicast address of the group.
    pub fn addr(&self) -> Ipv4Address {
        self.addr
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }

    /// Return the source list the filter mode applies to.
    pub fn sources(&self) -> &SourceList {
        &self.sources
    }

    /// Return whether a legacy report has been sent since the group was joined.
    pub fn flag(&self) -> bool {
        self.flag
    }

    /// Return whether the group slot is in use.
    pub fn is_active(&self) -> bool {
        self.state != GroupState::NonMember
    }

    /// INCLUDE with an empty source list is the same as not being a member.
    pub fn is_baseline(&self) -> bool {
        self.filter_mode == FilterMode::Include && self.sources.is_empty()
    }

    /// Return whether state-change records still have to be sent for this group.
    pub fn has_pending_changes(&self) -> bool {
        self.retransmit > 0 || !self.allow.is_empty() || !self.block.is_empty()
    }

    /// Forget every IGMPv3 obligation: retransmissions and queried sources.
    pub(super) fn clear_v3_state(&mut self) {
        self.allow.clear();
        self.block.clear();
        self.queried.clear();
        self.retransmit = 0;
    }

    pub(super) fn release(&mut self) {
        *self = Group::EMPTY;
    }
}
