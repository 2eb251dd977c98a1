use super::{GroupState, Host, SourceList};
use crate::iface::Handler;
use crate::time::{Duration, Instant};
use crate::wire::{IgmpRepr, IgmpSources, IgmpVersion, Ipv4Address, Ipv4Repr};

/// Maximum response time of IGMPv1 queries, which do not carry one.
const V1_MAX_RESP_TIME: Duration = Duration::from_secs(10);

impl<'a> Host<'a> {
    /// Note the presence of an older-version querier, switching the
    /// compatibility mode if needed. See [RFC 3376 § 7.2.1].
    ///
    /// [RFC 3376 § 7.2.1]: https://tools.ietf.org/html/rfc3376#section-7.2.1
    fn older_querier_present(&mut self, now: Instant, version: IgmpVersion) {
        let timeout = self.config.older_version_querier_present_timeout;
        match version {
            IgmpVersion::Version1 => self.v1_querier_present.start(now, timeout),
            IgmpVersion::Version2 => self.v2_querier_present.start(now, timeout),
            IgmpVersion::Version3 => return,
        }

        let mode = self.querier_mode();
        if mode == self.compat_mode {
            return;
        }
        net_debug!("IGMP: compatibility mode {} -> {}", self.compat_mode, mode);
        self.compat_mode = mode;

        // Pending IGMPv3 reports are abandoned.
        self.general_query.stop();
        self.state_change.stop();
        for group in self.groups.iter_mut().filter(|group| group.is_active()) {
            group.timer.stop();
            if group.state == GroupState::DelayingMember {
                group.state = GroupState::IdleMember;
            }
            group.clear_v3_state();
            if group.is_baseline() {
                group.release();
            }
        }
    }

    /// Schedule IGMPv1/v2 reports in answer to a query. See [RFC 2236 § 3].
    ///
    /// [RFC 2236 § 3]: https://tools.ietf.org/html/rfc2236#section-3
    fn schedule_legacy_reports(
        &mut self,
        now: Instant,
        group_addr: Ipv4Address,
        max_resp_time: Duration,
    ) {
        for group in self.groups.iter_mut() {
            if !group_addr.is_unspecified() && group.addr != group_addr {
                continue;
            }
            if group.is_baseline() {
                continue;
            }
            match group.state {
                GroupState::DelayingMember => {
                    let delay = self.rand.rand_delay(max_resp_time);
                    // Only ever bring a pending report forward.
                    if group.timer.remaining(now).map_or(true, |remaining| delay < remaining) {
                        group.timer.start(now, delay);
                    }
                }
                GroupState::IdleMember => {
                    let delay = self.rand.rand_delay(max_resp_time);
                    net_trace!("IGMP: report for {} in {}", group.addr, delay);
                    group.timer.start(now, delay);
                    group.state = GroupState::DelayingMember;
                }
                _ => (),
            }
        }
    }

    /// Schedule the answer to an IGMPv3 query. See [RFC 3376 § 5.2].
    ///
    /// [RFC 3376 § 5.2]: https://tools.ietf.org/html/rfc3376#section-5.2
    fn schedule_v3_report(
        &mut self,
        now: Instant,
        group_addr: Ipv4Address,
        max_resp_time: Duration,
        sources: &IgmpSources,
    ) {
        let delay = self.rand.rand_delay(max_resp_time);

        // A pending response to a general query covers this one.
        if self
            .general_query
            .remaining(now)
            .is_some_and(|remaining| remaining <= delay)
        {
            return;
        }

        if group_addr.is_unspecified() {
            if !sources.is_empty() {
                net_debug!("IGMP: general query with {} sources, ignoring", sources.len());
                return;
            }
            net_trace!("IGMP: general query response in {}", delay);
            self.general_query.start(now, delay);
            return;
        }

        let Some(index) = self.group_index(group_addr) else {
            return;
        };
        let group = &mut self.groups[index];
        if group.state != GroupState::IdleMember || group.is_baseline() {
            return;
        }

        match group.timer.remaining(now) {
            None => {
                group.timer.start(now, delay);
                group.queried.clear();
                add_queried_sources(&mut group.queried, sources);
            }
            Some(remaining) => {
                // A pending group-specific answer absorbs the new query's sources.
                if sources.is_empty() || group.queried.is_empty() {
                    group.queried.clear();
                } else {
                    add_queried_sources(&mut group.queried, sources);
                }
                group.timer.start(now, delay.min(remaining));
            }
        }
    }

    /// Another member reported the group: this host's pending report is redundant.
    /// See [RFC 2236 § 3].
    ///
    /// [RFC 2236 § 3]: https://tools.ietf.org/html/rfc2236#section-3
    fn suppress_legacy_report(&mut self, group_addr: Ipv4Address) {
        if self.compat_mode == IgmpVersion::Version3 {
            return;
        }
        let Some(index) = self.group_index(group_addr) else {
            return;
        };
        let group = &mut self.groups[index];
        if group.state == GroupState::DelayingMember {
            net_debug!("IGMP: report for {} heard, suppressing ours", group_addr);
            group.timer.stop();
            group.flag = false;
            group.state = GroupState::IdleMember;
        }
    }
}

impl<'a> Handler for Host<'a> {
    fn process_igmp(&mut self, now: Instant, ip_repr: &Ipv4Repr, repr: &IgmpRepr<'_>) {
        match *repr {
            IgmpRepr::MembershipQuery {
                max_resp_time,
                group_addr,
                version,
            } => {
                net_trace!(
                    "IGMP: {} query for {} from {}",
                    version,
                    group_addr,
                    ip_repr.src_addr
                );
                let max_resp_time = match version {
                    IgmpVersion::Version1 => V1_MAX_RESP_TIME,
                    _ => max_resp_time,
                };
                self.older_querier_present(now, version);
                self.schedule_legacy_reports(now, group_addr, max_resp_time);
            }
            IgmpRepr::MembershipQueryV3 {
                max_resp_time,
                group_addr,
                ref sources,
                ..
            } => {
                net_trace!(
                    "IGMP: IGMPv3 query for {} with {} sources from {}",
                    group_addr,
                    sources.len(),
                    ip_repr.src_addr
                );
                if self.compat_mode == IgmpVersion::Version3 {
                    self.schedule_v3_report(now, group_addr, max_resp_time, sources);
                } else {
                    self.schedule_legacy_reports(now, group_addr, max_resp_time);
                }
            }
            IgmpRepr::MembershipReport { group_addr, .. } => {
                self.suppress_legacy_report(group_addr);
            }
            // Hosts do not act on IGMPv3 reports or on leaves.
            IgmpRepr::MembershipReportV3 { .. } | IgmpRepr::LeaveGroup { .. } => (),
        }
    }
}

/// Record the sources of a group-and-source-specific query. When they do not
/// all fit, the list is emptied and the answer covers the whole group.
fn add_queried_sources(queried: &mut SourceList, sources: &IgmpSources) {
    for addr in sources.iter() {
        if queried.add(addr, 0).is_err() {
            queried.clear();
            return;
        }
    }
}
