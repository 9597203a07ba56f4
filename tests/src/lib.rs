#![forbid(unsafe_code)]

//! Test harness for daemon-level scenarios: an in-process LAN segment with
//! mock Hello and ARP buses, a static local-info provider, and a node
//! spawner. Scenario tests run the real orchestrator against these under
//! tokio's paused virtual time.

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vgw_core::{
    ArpBus, ArpRequest, Clock, ForwarderTlv, HelloBus, HelloEvent, HelloFrame, LocalInfo, MacAddr,
    Result, RoleCell, SystemClock,
};
use vgw_group::{ForwarderSelector, Registry};
use vgwd::{Daemon, GroupSettings};

/// The VIP every test group answers for.
pub const VIP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 254);
/// Group id shared by all test nodes.
pub const GROUP_ID: u16 = 1;

/// Forwarder MAC derived from its id, so assertions can name MACs cheaply.
pub fn fwd_mac(id: u8) -> MacAddr {
    MacAddr::new([0x02, 0x00, 0x5e, 0x00, 0x01, id])
}

/// One locally-owned forwarder record.
pub fn fwd(id: u8) -> ForwarderTlv {
    ForwarderTlv {
        id,
        weight: 100,
        mac: fwd_mac(id),
    }
}

/// A shared broadcast segment: every attached node's Hello reaches all the
/// other attached nodes, never itself.
#[derive(Default)]
pub struct MockLan {
    nodes: Mutex<Vec<(Ipv4Addr, mpsc::Sender<HelloEvent>)>>,
}

impl MockLan {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A Hello bus attached to this segment as `ip`.
    pub fn hello_bus(self: &Arc<Self>, ip: Ipv4Addr) -> Arc<MockHelloBus> {
        Arc::new(MockHelloBus {
            lan: self.clone(),
            ip,
            sent: Mutex::new(Vec::new()),
        })
    }
}

/// Segment-attached Hello bus; records every frame it sends.
pub struct MockHelloBus {
    lan: Arc<MockLan>,
    ip: Ipv4Addr,
    sent: Mutex<Vec<HelloFrame>>,
}

impl MockHelloBus {
    /// Frames this node has emitted, oldest first.
    pub fn sent(&self) -> Vec<HelloFrame> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl HelloBus for MockHelloBus {
    async fn run(&self, events: mpsc::Sender<HelloEvent>, cancel: CancellationToken) -> Result<()> {
        self.lan.nodes.lock().push((self.ip, events));
        cancel.cancelled().await;
        Ok(())
    }

    async fn send(&self, frame: &HelloFrame) -> Result<()> {
        self.sent.lock().push(frame.clone());
        let seen_at = SystemClock.now();
        let nodes = self.lan.nodes.lock().clone();
        for (ip, tx) in nodes {
            if ip == self.ip {
                continue;
            }
            let _ = tx
                .send(HelloEvent {
                    src: self.ip,
                    seen_at,
                    frame: frame.clone(),
                })
                .await;
        }
        Ok(())
    }
}

/// Injectable ARP bus; records every reply the daemon emits.
#[derive(Default)]
pub struct MockArpBus {
    inbound: Mutex<Option<mpsc::Sender<ArpRequest>>>,
    replies: Mutex<Vec<(ArpRequest, Ipv4Addr, MacAddr)>>,
}

impl MockArpBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver one ARP request to the daemon, as if seen on the wire.
    pub async fn inject(&self, request: ArpRequest) {
        let tx = self.inbound.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(request).await;
        }
    }

    /// `(request, vip, mac)` triples of the replies emitted so far.
    pub fn replies(&self) -> Vec<(ArpRequest, Ipv4Addr, MacAddr)> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl ArpBus for MockArpBus {
    async fn run(
        &self,
        requests: mpsc::Sender<ArpRequest>,
        cancel: CancellationToken,
    ) -> Result<()> {
        *self.inbound.lock() = Some(requests);
        cancel.cancelled().await;
        Ok(())
    }

    async fn reply(&self, request: &ArpRequest, vip: Ipv4Addr, vmac: MacAddr) -> Result<()> {
        self.replies.lock().push((*request, vip, vmac));
        Ok(())
    }
}

/// Fixed local-info provider.
pub struct StaticInfo {
    pub ip: Ipv4Addr,
    pub forwarders: Vec<ForwarderTlv>,
}

impl LocalInfo for StaticInfo {
    fn local_ip(&self) -> Result<Ipv4Addr> {
        Ok(self.ip)
    }

    fn local_forwarders(&self) -> Result<Vec<ForwarderTlv>> {
        Ok(self.forwarders.clone())
    }
}

/// A running daemon plus the handles the scenarios poke and assert on.
pub struct TestNode {
    pub ip: Ipv4Addr,
    pub role: Arc<RoleCell>,
    pub registry: Arc<Registry>,
    pub hello: Arc<MockHelloBus>,
    pub arp: Arc<MockArpBus>,
    pub cancel: CancellationToken,
    task: tokio::task::JoinHandle<Result<()>>,
}

impl TestNode {
    /// Cancel the node and wait for a clean exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Election-relevant knobs for one test node.
pub struct NodeSpec {
    pub ip: Ipv4Addr,
    pub priority: u8,
    pub preempt: bool,
    pub forwarders: Vec<ForwarderTlv>,
}

impl NodeSpec {
    pub fn new(last_octet: u8, priority: u8) -> Self {
        Self {
            ip: Ipv4Addr::new(10, 0, 0, last_octet),
            priority,
            preempt: false,
            forwarders: vec![fwd(last_octet)],
        }
    }

    pub fn preempt(mut self) -> Self {
        self.preempt = true;
        self
    }

    pub fn forwarders(mut self, forwarders: Vec<ForwarderTlv>) -> Self {
        self.forwarders = forwarders;
        self
    }
}

/// Spawn a daemon with the standard 3 s hello / 10 s hold timers.
pub fn spawn_node(lan: &Arc<MockLan>, spec: NodeSpec) -> TestNode {
    let settings = GroupSettings {
        group_id: GROUP_ID,
        virtual_ip: VIP,
        priority: spec.priority,
        weight: 100,
        preempt: spec.preempt,
        hello_interval: Duration::from_secs(3),
        hold_time: Duration::from_secs(10),
    };
    let hello = lan.hello_bus(spec.ip);
    let arp = MockArpBus::new();
    let info = Arc::new(StaticInfo {
        ip: spec.ip,
        forwarders: spec.forwarders,
    });
    #[allow(clippy::expect_used)]
    let daemon = Daemon::new(
        settings,
        info,
        hello.clone(),
        arp.clone(),
        ForwarderSelector::round_robin(),
        SystemClock,
    )
    .expect("static info cannot fail");
    let role = daemon.role_handle();
    let registry = daemon.registry_handle();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(daemon.run(cancel.clone()));
    TestNode {
        ip: spec.ip,
        role,
        registry,
        hello,
        arp,
        cancel,
        task,
    }
}

/// Let virtual time progress in small steps until `cond` holds, for at most
/// `timeout` of virtual time.
pub async fn settle(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < timeout {
        if cond() {
            return true;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    cond()
}
