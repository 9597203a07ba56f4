#![allow(clippy::unwrap_used)]

//! Daemon-level scenarios: real orchestrator, mock LAN, virtual time.

use std::{net::Ipv4Addr, time::Duration};

use vgw_core::{ArpRequest, MacAddr, Role};
use vgw_integration_tests::{
    fwd, fwd_mac, settle, spawn_node, MockLan, NodeSpec, VIP,
};

const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 50);
const CLIENT_MAC: MacAddr = MacAddr([0x52, 0x54, 0x00, 0xaa, 0xbb, 0xcc]);

fn client_request(target: Ipv4Addr) -> ArpRequest {
    ArpRequest {
        src_ip: CLIENT_IP,
        src_mac: CLIENT_MAC,
        dst_ip: target,
    }
}

#[tokio::test(start_paused = true)]
async fn single_node_bootstrap_becomes_active_and_answers_arp() {
    let lan = MockLan::new();
    let node = spawn_node(&lan, NodeSpec::new(10, 100));

    assert!(settle(Duration::from_secs(5), || node.role.load() == Role::Active).await);

    node.arp.inject(client_request(VIP)).await;
    assert!(settle(Duration::from_secs(2), || !node.arp.replies().is_empty()).await);

    let (request, vip, mac) = node.arp.replies()[0];
    assert_eq!(vip, VIP);
    assert_eq!(mac, fwd_mac(10));
    assert_eq!(request.src_ip, CLIENT_IP);

    node.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn two_node_election_without_preemption() {
    let lan = MockLan::new();
    let a = spawn_node(&lan, NodeSpec::new(10, 100));
    let b = spawn_node(&lan, NodeSpec::new(20, 200));

    assert!(
        settle(Duration::from_secs(30), || {
            b.role.load() == Role::Active && a.role.load() == Role::Listen
        })
        .await
    );

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn higher_priority_node_preempts_running_active() {
    let lan = MockLan::new();
    let a = spawn_node(&lan, NodeSpec::new(10, 100));
    assert!(settle(Duration::from_secs(5), || a.role.load() == Role::Active).await);

    let b = spawn_node(&lan, NodeSpec::new(20, 200).preempt());
    assert!(
        settle(Duration::from_secs(30), || {
            b.role.load() == Role::Active && a.role.load() == Role::Listen
        })
        .await
    );

    // The demoted node advertises its new role in the very next Hello.
    tokio::time::sleep(Duration::from_secs(4)).await;
    let last = a.hello.sent().last().cloned().unwrap();
    assert_eq!(last.role, Role::Listen);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn survivor_takes_over_after_peer_death() {
    let lan = MockLan::new();
    let a = spawn_node(&lan, NodeSpec::new(10, 100));
    let b = spawn_node(&lan, NodeSpec::new(20, 200));
    assert!(
        settle(Duration::from_secs(30), || b.role.load() == Role::Active).await
    );

    // The active node goes silent; the survivor prunes it after hold time
    // and, now best, takes over.
    b.shutdown().await;
    assert!(
        settle(Duration::from_secs(30), || a.role.load() == Role::Active).await
    );

    a.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn non_active_node_stays_silent_on_arp() {
    let lan = MockLan::new();
    let a = spawn_node(&lan, NodeSpec::new(10, 100));
    let b = spawn_node(&lan, NodeSpec::new(20, 200));
    assert!(
        settle(Duration::from_secs(30), || a.role.load() == Role::Listen).await
    );

    a.arp.inject(client_request(VIP)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(a.arp.replies().is_empty());

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn active_without_live_forwarders_stays_silent() {
    let lan = MockLan::new();
    let node = spawn_node(&lan, NodeSpec::new(10, 100).forwarders(Vec::new()));
    assert!(settle(Duration::from_secs(5), || node.role.load() == Role::Active).await);

    node.arp.inject(client_request(VIP)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(node.arp.replies().is_empty());

    node.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn requests_for_other_addresses_are_ignored() {
    let lan = MockLan::new();
    let node = spawn_node(&lan, NodeSpec::new(10, 100));
    assert!(settle(Duration::from_secs(5), || node.role.load() == Role::Active).await);

    node.arp.inject(client_request(Ipv4Addr::new(10, 0, 0, 77))).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(node.arp.replies().is_empty());

    node.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn round_robin_rotates_over_live_forwarders() {
    let lan = MockLan::new();
    let node = spawn_node(
        &lan,
        NodeSpec::new(10, 100).forwarders(vec![fwd(1), fwd(2)]),
    );
    assert!(settle(Duration::from_secs(5), || node.role.load() == Role::Active).await);

    node.arp.inject(client_request(VIP)).await;
    node.arp.inject(client_request(VIP)).await;
    assert!(settle(Duration::from_secs(2), || node.arp.replies().len() == 2).await);

    let mut macs: Vec<MacAddr> = node.arp.replies().iter().map(|(_, _, mac)| *mac).collect();
    macs.sort_unstable_by_key(|m| m.octets());
    assert_eq!(macs, vec![fwd_mac(1), fwd_mac(2)]);

    node.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn active_answers_with_standby_owned_forwarder_too() {
    let lan = MockLan::new();
    let a = spawn_node(&lan, NodeSpec::new(10, 100).forwarders(vec![fwd(1)]));
    let b = spawn_node(&lan, NodeSpec::new(20, 200).forwarders(vec![fwd(2)]));
    let hold = Duration::from_secs(10);
    assert!(
        settle(Duration::from_secs(30), || {
            b.role.load() == Role::Active
                && b.registry
                    .list_forwarders(tokio::time::Instant::now().into_std(), hold)
                    .len()
                    == 2
        })
        .await
    );

    // B answers ARP from the union of live forwarders, including the one
    // advertised by A's Hellos.
    for _ in 0..4 {
        b.arp.inject(client_request(VIP)).await;
    }
    assert!(settle(Duration::from_secs(2), || b.arp.replies().len() == 4).await);
    let mut macs: Vec<MacAddr> = b.arp.replies().iter().map(|(_, _, m)| *m).collect();
    macs.sort_unstable_by_key(|m| m.octets());
    macs.dedup();
    assert_eq!(macs, vec![fwd_mac(1), fwd_mac(2)]);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hello_frames_advertise_local_forwarders() {
    let lan = MockLan::new();
    let node = spawn_node(
        &lan,
        NodeSpec::new(10, 100).forwarders(vec![fwd(1), fwd(2)]),
    );
    assert!(settle(Duration::from_secs(5), || !node.hello.sent().is_empty()).await);

    let frame = node.hello.sent()[0].clone();
    assert_eq!(frame.group_id, vgw_integration_tests::GROUP_ID);
    assert_eq!(frame.virtual_ip, VIP);
    assert_eq!(frame.forwarders, vec![fwd(1), fwd(2)]);

    node.shutdown().await;
}
