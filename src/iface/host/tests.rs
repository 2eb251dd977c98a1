use std::vec::Vec;

use super::*;
use crate::iface::Handler;
use crate::tests::TestingDevice;
use crate::wire::{IgmpPacket, IgmpRecordType, IgmpSources, IpProtocol, Ipv4Repr};

const HOST_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 1, 10);
const ROUTER_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 1, 1);
const GROUP: Ipv4Address = Ipv4Address::new(239, 1, 1, 1);
const OTHER_GROUP: Ipv4Address = Ipv4Address::new(239, 1, 1, 2);
const SRC_A: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
const SRC_B: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);
const SRC_C: Ipv4Address = Ipv4Address::new(10, 0, 0, 3);
const SRC_D: Ipv4Address = Ipv4Address::new(10, 0, 0, 4);

type Record = (IgmpRecordType, Ipv4Address, Vec<Ipv4Address>);

fn secs(secs: i64) -> Instant {
    Instant::from_secs(secs)
}

fn create<'a>(config: Config) -> (Host<'a>, TestingDevice) {
    let mut host = Host::new(config, Vec::new());
    host.link_change_event(true, Some(HOST_ADDR));
    (host, TestingDevice::new())
}

fn receive(host: &mut Host, now: Instant, repr: &IgmpRepr) {
    let ip_repr = Ipv4Repr {
        src_addr: ROUTER_ADDR,
        dst_addr: Ipv4Address::MULTICAST_ALL_SYSTEMS,
        next_header: IpProtocol::Igmp,
        payload_len: repr.buffer_len(),
        hop_limit: 1,
        tos: 0,
        router_alert: true,
    };
    host.process_igmp(now, &ip_repr, repr);
}

fn general_query_v3(max_resp_time: Duration) -> IgmpRepr<'static> {
    IgmpRepr::MembershipQueryV3 {
        max_resp_time,
        group_addr: Ipv4Address::UNSPECIFIED,
        s_flag: false,
        qrv: 2,
        qqic: 125,
        sources: IgmpSources::default(),
    }
}

fn legacy_query(version: IgmpVersion, group_addr: Ipv4Address) -> IgmpRepr<'static> {
    IgmpRepr::MembershipQuery {
        max_resp_time: Duration::from_secs(1),
        group_addr,
        version,
    }
}

/// Decode every IGMPv3 report sent since the last call, one entry per message.
fn sent_v3(device: &mut TestingDevice) -> Vec<Vec<Record>> {
    device
        .sent()
        .into_iter()
        .map(|(ip_repr, payload)| {
            assert_eq!(ip_repr.dst_addr, Ipv4Address::MULTICAST_ALL_IGMPV3_ROUTERS);
            assert_eq!(ip_repr.hop_limit, 1);
            assert_eq!(ip_repr.tos, 0xc0);
            assert!(ip_repr.router_alert);
            let packet = IgmpPacket::new_checked(&payload[..]).unwrap();
            assert!(packet.verify_checksum());
            match IgmpRepr::parse(&packet).unwrap() {
                IgmpRepr::MembershipReportV3 { records } => records
                    .iter()
                    .map(|record| {
                        (
                            record.record_type(),
                            record.group_addr(),
                            record.sources().iter().collect(),
                        )
                    })
                    .collect(),
                other => panic!("expected an IGMPv3 report, got {other}"),
            }
        })
        .collect()
}

/// Decode every IGMPv1/v2 message sent since the last call.
fn sent_legacy(device: &mut TestingDevice) -> Vec<(Ipv4Repr, IgmpRepr<'static>)> {
    device
        .sent()
        .into_iter()
        .map(|(ip_repr, payload)| {
            let packet = IgmpPacket::new_checked(&payload[..]).unwrap();
            assert!(packet.verify_checksum());
            let repr = match IgmpRepr::parse(&packet).unwrap() {
                IgmpRepr::MembershipReport { group_addr, version } => {
                    IgmpRepr::MembershipReport { group_addr, version }
                }
                IgmpRepr::LeaveGroup { group_addr } => IgmpRepr::LeaveGroup { group_addr },
                other => panic!("expected a legacy message, got {other}"),
            };
            (ip_repr, repr)
        })
        .collect()
}

/// Join, then let every state-change retransmission go out.
fn settle(host: &mut Host, device: &mut TestingDevice, start: i64) -> i64 {
    for t in start..start + 4 {
        host.tick(secs(t), device);
    }
    device.tx_queue.clear();
    start + 4
}

#[test]
fn test_join_sends_to_ex_robustness_times() {
    let (mut host, mut device) = create(Config::default());
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    assert_eq!(host.group(GROUP).unwrap().state(), GroupState::InitMember);
    assert_eq!(host.poll_at(secs(0)), Some(secs(0)));

    host.tick(secs(0), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ChangeToExclude, GROUP, vec![])]]
    );
    assert_eq!(host.group(GROUP).unwrap().state(), GroupState::IdleMember);

    host.tick(secs(1), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ChangeToExclude, GROUP, vec![])]]
    );

    host.tick(secs(2), &mut device);
    host.tick(secs(3), &mut device);
    assert!(device.tx_queue.is_empty());
    assert_eq!(host.poll_at(secs(3)), None);
    assert!(host.is_member(GROUP));
}

#[test]
fn test_join_then_leave_before_ready_is_silent() {
    let mut host = Host::new(Config::default(), Vec::new());
    let mut device = TestingDevice::new();
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    host.tick(secs(0), &mut device);
    host.leave_group(secs(1), &mut device, GROUP).unwrap();
    host.tick(secs(1), &mut device);

    assert!(host.group(GROUP).is_none());
    assert!(device.tx_queue.is_empty());
    // Leaving a group that was never joined is not an error.
    assert_eq!(host.leave_group(secs(2), &mut device, OTHER_GROUP), Ok(()));
}

#[test]
fn test_join_without_address_reports_once_address_is_set() {
    let mut host = Host::new(Config::default(), Vec::new());
    let mut device = TestingDevice::new();
    host.link_change_event(true, None);
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    host.tick(secs(0), &mut device);
    host.tick(secs(1), &mut device);
    assert!(device.tx_queue.is_empty());

    host.link_change_event(true, Some(HOST_ADDR));
    host.tick(secs(2), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ChangeToExclude, GROUP, vec![])]]
    );
}

#[test]
fn test_link_change_resets_groups() {
    let (mut host, mut device) = create(Config::default());
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    let now = settle(&mut host, &mut device, 0);
    receive(&mut host, secs(now), &legacy_query(IgmpVersion::Version2, Ipv4Address::UNSPECIFIED));
    assert_eq!(host.compatibility_mode(), IgmpVersion::Version2);

    host.link_change_event(false, Some(HOST_ADDR));
    assert_eq!(host.compatibility_mode(), IgmpVersion::Version3);
    let group = host.group(GROUP).unwrap();
    assert_eq!(group.state(), GroupState::InitMember);
    assert!(!group.flag());
    assert_eq!(host.poll_at(secs(now)), None);
}

#[test]
fn test_invalid_groups() {
    let (mut host, mut device) = create(Config::default());
    assert_eq!(
        host.join_group(secs(0), &mut device, Ipv4Address::new(10, 0, 0, 1)),
        Err(MulticastError::Unaddressable)
    );
    assert_eq!(
        host.join_group(secs(0), &mut device, Ipv4Address::MULTICAST_ALL_SYSTEMS),
        Ok(())
    );
    assert_eq!(host.groups().count(), 0);
    assert!(host.is_member(Ipv4Address::MULTICAST_ALL_SYSTEMS));
}

#[test]
fn test_group_table_full() {
    let mut storage = [Group::EMPTY, Group::EMPTY];
    let mut host = Host::new(Config::default(), &mut storage[..]);
    let mut device = TestingDevice::new();
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    host.join_group(secs(0), &mut device, OTHER_GROUP).unwrap();
    assert_eq!(
        host.join_group(secs(0), &mut device, Ipv4Address::new(239, 1, 1, 3)),
        Err(MulticastError::GroupTableFull)
    );
    // Freed slots are reused.
    host.leave_group(secs(0), &mut device, GROUP).unwrap();
    assert_eq!(
        host.join_group(secs(0), &mut device, Ipv4Address::new(239, 1, 1, 3)),
        Ok(())
    );
}

#[test]
fn test_source_list_full() {
    let mut config = Config::default();
    config.source_filtering = SourceFiltering::SourceSpecific { max_sources: 2 };
    let (mut host, mut device) = create(config);
    assert_eq!(
        host.state_change_event(
            secs(0),
            &mut device,
            GROUP,
            FilterMode::Include,
            &[SRC_A, SRC_B, SRC_C]
        ),
        Err(MulticastError::SourceListFull)
    );
    assert!(host.group(GROUP).is_none());
}

#[test]
fn test_any_source_filtering() {
    let mut config = Config::default();
    config.source_filtering = SourceFiltering::AnySource;
    let (mut host, mut device) = create(config);
    host.state_change_event(secs(0), &mut device, GROUP, FilterMode::Include, &[SRC_A])
        .unwrap();
    let group = host.group(GROUP).unwrap();
    assert_eq!(group.filter_mode(), FilterMode::Exclude);
    assert!(group.sources().is_empty());
}

#[test]
fn test_exclude_with_sources() {
    let (mut host, mut device) = create(Config::default());
    host.state_change_event(
        secs(0),
        &mut device,
        GROUP,
        FilterMode::Exclude,
        &[SRC_A, SRC_B, SRC_C],
    )
    .unwrap();
    host.tick(secs(0), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(
            IgmpRecordType::ChangeToExclude,
            GROUP,
            vec![SRC_A, SRC_B, SRC_C]
        )]]
    );
    let group = host.group(GROUP).unwrap();
    assert_eq!(group.filter_mode(), FilterMode::Exclude);
    assert_eq!(group.sources().len(), 3);
}

#[test]
fn test_allow_and_block_are_pruned_independently() {
    let (mut host, mut device) = create(Config::default());
    host.state_change_event(secs(0), &mut device, GROUP, FilterMode::Include, &[SRC_A, SRC_B])
        .unwrap();
    let now = settle(&mut host, &mut device, 0);

    host.state_change_event(secs(now), &mut device, GROUP, FilterMode::Include, &[SRC_B, SRC_C])
        .unwrap();
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![
            (IgmpRecordType::AllowNewSources, GROUP, vec![SRC_C]),
            (IgmpRecordType::BlockOldSources, GROUP, vec![SRC_A]),
        ]]
    );

    // C and A have one transmission left, D gets two.
    host.state_change_event(
        secs(now),
        &mut device,
        GROUP,
        FilterMode::Include,
        &[SRC_B, SRC_C, SRC_D],
    )
    .unwrap();
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![
            (IgmpRecordType::AllowNewSources, GROUP, vec![SRC_C, SRC_D]),
            (IgmpRecordType::BlockOldSources, GROUP, vec![SRC_A]),
        ]]
    );

    host.tick(secs(now + 1), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::AllowNewSources, GROUP, vec![SRC_D])]]
    );
    host.tick(secs(now + 2), &mut device);
    assert!(device.tx_queue.is_empty());
}

#[test]
fn test_filter_mode_change_supersedes_source_changes() {
    let (mut host, mut device) = create(Config::default());
    host.state_change_event(secs(0), &mut device, GROUP, FilterMode::Include, &[SRC_A])
        .unwrap();
    let now = settle(&mut host, &mut device, 0);

    host.state_change_event(secs(now), &mut device, GROUP, FilterMode::Include, &[SRC_A, SRC_B])
        .unwrap();
    device.tx_queue.clear();
    host.state_change_event(secs(now), &mut device, GROUP, FilterMode::Exclude, &[SRC_C])
        .unwrap();
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ChangeToExclude, GROUP, vec![SRC_C])]]
    );
    host.tick(secs(now + 1), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ChangeToExclude, GROUP, vec![SRC_C])]]
    );
    host.tick(secs(now + 2), &mut device);
    assert!(device.tx_queue.is_empty());
}

#[test]
fn test_leave_v3_reports_to_in_and_frees_group() {
    let (mut host, mut device) = create(Config::default());
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    let now = settle(&mut host, &mut device, 0);

    host.leave_group(secs(now), &mut device, GROUP).unwrap();
    assert!(!host.is_member(GROUP));
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ChangeToInclude, GROUP, vec![])]]
    );
    host.tick(secs(now + 1), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ChangeToInclude, GROUP, vec![])]]
    );
    assert!(host.group(GROUP).is_none());
}

#[test]
fn test_general_query_is_answered_within_max_resp_time() {
    let (mut host, mut device) = create(Config::default());
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    host.state_change_event(secs(0), &mut device, OTHER_GROUP, FilterMode::Include, &[SRC_A])
        .unwrap();
    let now = settle(&mut host, &mut device, 0);

    receive(&mut host, secs(now), &general_query_v3(Duration::from_secs(2)));
    assert!(host.poll_at(secs(now)).unwrap() <= secs(now + 2));
    host.tick(secs(now + 2), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![
            (IgmpRecordType::ModeIsExclude, GROUP, vec![]),
            (IgmpRecordType::ModeIsInclude, OTHER_GROUP, vec![SRC_A]),
        ]]
    );
    host.tick(secs(now + 3), &mut device);
    assert!(device.tx_queue.is_empty());
}

#[test]
fn test_group_and_source_query() {
    let (mut host, mut device) = create(Config::default());
    host.state_change_event(secs(0), &mut device, GROUP, FilterMode::Include, &[SRC_A, SRC_B])
        .unwrap();
    let now = settle(&mut host, &mut device, 0);

    let sources = [10, 0, 0, 2, 10, 0, 0, 3];
    let query = IgmpRepr::MembershipQueryV3 {
        max_resp_time: Duration::from_secs(1),
        group_addr: GROUP,
        s_flag: false,
        qrv: 2,
        qqic: 125,
        sources: IgmpSources::new(&sources).unwrap(),
    };
    receive(&mut host, secs(now), &query);
    host.tick(secs(now + 1), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ModeIsInclude, GROUP, vec![SRC_B])]]
    );

    // A group-specific query then widens the pending answer to the whole group.
    receive(&mut host, secs(now + 2), &query);
    let group_query = IgmpRepr::MembershipQueryV3 {
        max_resp_time: Duration::from_secs(1),
        group_addr: GROUP,
        s_flag: false,
        qrv: 2,
        qqic: 125,
        sources: IgmpSources::default(),
    };
    receive(&mut host, secs(now + 2), &group_query);
    host.tick(secs(now + 3), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ModeIsInclude, GROUP, vec![SRC_A, SRC_B])]]
    );
}

#[test]
fn test_source_queries_merge_while_pending() {
    let (mut host, mut device) = create(Config::default());
    host.state_change_event(
        secs(0),
        &mut device,
        GROUP,
        FilterMode::Include,
        &[SRC_A, SRC_B, SRC_C],
    )
    .unwrap();
    let now = settle(&mut host, &mut device, 0);

    let first_sources = [10, 0, 0, 1, 10, 0, 0, 4];
    let first = IgmpRepr::MembershipQueryV3 {
        max_resp_time: Duration::from_secs(1),
        group_addr: GROUP,
        s_flag: false,
        qrv: 2,
        qqic: 125,
        sources: IgmpSources::new(&first_sources).unwrap(),
    };
    receive(&mut host, secs(now), &first);
    let deadline = host.group(GROUP).unwrap().timer.deadline().unwrap();
    assert!(deadline <= secs(now + 1));

    // A later, slower query keeps the earlier deadline and adds its sources.
    let second_sources = [10, 0, 0, 3];
    let second = IgmpRepr::MembershipQueryV3 {
        max_resp_time: Duration::from_secs(10),
        group_addr: GROUP,
        s_flag: false,
        qrv: 2,
        qqic: 125,
        sources: IgmpSources::new(&second_sources).unwrap(),
    };
    receive(&mut host, secs(now), &second);
    let merged = host.group(GROUP).unwrap().timer.deadline().unwrap();
    assert!(merged <= deadline);
    assert_eq!(host.poll_at(secs(now)), Some(merged));

    host.tick(secs(now + 1), &mut device);
    assert_eq!(
        sent_v3(&mut device),
        vec![vec![(IgmpRecordType::ModeIsInclude, GROUP, vec![SRC_A, SRC_C])]]
    );
    host.tick(secs(now + 10), &mut device);
    assert!(device.tx_queue.is_empty());
}

#[test]
fn test_reports_are_packed() {
    let mut config = Config::default();
    config.max_message_size = 32;
    let (mut host, mut device) = create(config);
    for i in 1..=5 {
        host.join_group(secs(0), &mut device, Ipv4Address::new(239, 1, 1, i))
            .unwrap();
    }
    host.tick(secs(0), &mut device);
    let messages = sent_v3(&mut device);
    assert_eq!(
        messages.iter().map(|records| records.len()).collect::<Vec<_>>(),
        vec![3, 2]
    );
}

#[test]
fn test_transmit_refused() {
    let (mut host, mut device) = create(Config::default());
    device.refuse_tx = true;
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    host.tick(secs(0), &mut device);
    host.tick(secs(1), &mut device);
    assert!(device.tx_queue.is_empty());
    assert!(host.is_member(GROUP));
}

#[test]
fn test_v2_query_downgrades_and_times_out() {
    let (mut host, mut device) = create(Config::default());
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    host.tick(secs(0), &mut device);
    device.tx_queue.clear();

    // The pending state-change retransmission is abandoned.
    receive(&mut host, secs(0), &legacy_query(IgmpVersion::Version2, Ipv4Address::UNSPECIFIED));
    assert_eq!(host.compatibility_mode(), IgmpVersion::Version2);
    assert_eq!(host.group(GROUP).unwrap().state(), GroupState::DelayingMember);

    host.tick(secs(1), &mut device);
    let sent = sent_legacy(&mut device);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.dst_addr, GROUP);
    assert!(sent[0].0.router_alert);
    assert_eq!(
        sent[0].1,
        IgmpRepr::MembershipReport {
            group_addr: GROUP,
            version: IgmpVersion::Version2,
        }
    );
    assert!(host.group(GROUP).unwrap().flag());

    // Another query of the same version changes nothing but the timers.
    receive(&mut host, secs(2), &legacy_query(IgmpVersion::Version2, Ipv4Address::UNSPECIFIED));
    assert_eq!(host.compatibility_mode(), IgmpVersion::Version2);
    assert!(host.group(GROUP).unwrap().flag());

    host.tick(secs(401), &mut device);
    assert_eq!(host.compatibility_mode(), IgmpVersion::Version2);
    host.tick(secs(402), &mut device);
    assert_eq!(host.compatibility_mode(), IgmpVersion::Version3);
    assert_eq!(host.group(GROUP).unwrap().state(), GroupState::IdleMember);
}

#[test]
fn test_v1_querier_takes_precedence() {
    let (mut host, mut device) = create(Config::default());
    receive(&mut host, secs(0), &legacy_query(IgmpVersion::Version1, Ipv4Address::UNSPECIFIED));
    receive(&mut host, secs(100), &legacy_query(IgmpVersion::Version2, Ipv4Address::UNSPECIFIED));
    assert_eq!(host.compatibility_mode(), IgmpVersion::Version1);

    host.join_group(secs(100), &mut device, GROUP).unwrap();
    host.tick(secs(100), &mut device);
    let sent = sent_legacy(&mut device);
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].0.router_alert);
    assert_eq!(
        sent[0].1,
        IgmpRepr::MembershipReport {
            group_addr: GROUP,
            version: IgmpVersion::Version1,
        }
    );

    // IGMPv1 has no leave message.
    host.leave_group(secs(101), &mut device, GROUP).unwrap();
    assert!(device.tx_queue.is_empty());
    assert!(host.group(GROUP).is_none());

    // The IGMPv2 querier outlives the IGMPv1 one.
    host.tick(secs(401), &mut device);
    assert_eq!(host.compatibility_mode(), IgmpVersion::Version2);
    host.tick(secs(501), &mut device);
    assert_eq!(host.compatibility_mode(), IgmpVersion::Version3);
}

#[test]
fn test_v2_leave_only_after_own_report() {
    let (mut host, mut device) = create(Config::default());
    receive(&mut host, secs(0), &legacy_query(IgmpVersion::Version2, Ipv4Address::UNSPECIFIED));
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    host.join_group(secs(0), &mut device, OTHER_GROUP).unwrap();
    host.tick(secs(0), &mut device);
    assert_eq!(sent_legacy(&mut device).len(), 2);

    // Someone else reports OTHER_GROUP while our repetition is pending.
    receive(
        &mut host,
        secs(1),
        &IgmpRepr::MembershipReport {
            group_addr: OTHER_GROUP,
            version: IgmpVersion::Version2,
        },
    );
    let other = host.group(OTHER_GROUP).unwrap();
    assert_eq!(other.state(), GroupState::IdleMember);
    assert!(!other.flag());

    host.leave_group(secs(2), &mut device, OTHER_GROUP).unwrap();
    assert!(device.tx_queue.is_empty());

    host.leave_group(secs(2), &mut device, GROUP).unwrap();
    let sent = sent_legacy(&mut device);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.dst_addr, Ipv4Address::MULTICAST_ALL_ROUTERS);
    assert_eq!(sent[0].1, IgmpRepr::LeaveGroup { group_addr: GROUP });
    assert_eq!(host.groups().count(), 0);
}

#[test]
fn test_legacy_query_only_shortens_pending_report() {
    let (mut host, mut device) = create(Config::default());
    receive(&mut host, secs(0), &legacy_query(IgmpVersion::Version2, Ipv4Address::UNSPECIFIED));
    host.join_group(secs(0), &mut device, GROUP).unwrap();
    host.tick(secs(0), &mut device);
    device.tx_queue.clear();

    let deadline = host.group(GROUP).unwrap().timer.deadline().unwrap();
    receive(&mut host, secs(0), &legacy_query(IgmpVersion::Version2, GROUP));
    let group = host.group(GROUP).unwrap();
    assert_eq!(group.state(), GroupState::DelayingMember);
    assert!(group.timer.deadline().unwrap() <= deadline);
    assert!(group.timer.deadline().unwrap() <= secs(1));
}
