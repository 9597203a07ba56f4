//! The orchestrator.
//!
//! One task owns every registry write: Hello receive, ARP dispatch and the
//! tick timer are funnelled through a single `select!` loop, so an ARP reply
//! always sees registry state at least as fresh as the last completed write
//! and the current role can never be observed mid-transition.
//!
//! Tick order is load-bearing: prune stale entries, republish the local
//! forwarders, evaluate the role, then emit the Hello — a node that just
//! demoted advertises the new role in that same Hello.

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vgw_core::{
    ArpBus, ArpRequest, Clock, DaemonConfig, Forwarder, ForwarderTlv, HelloBus, HelloEvent,
    HelloFrame, LocalInfo, Peer, Result, Role, RoleCell, SystemClock,
};
use vgw_group::{election, ForwarderSelector, Registry};

/// Queue depth for each inbound event channel. Hello and ARP are both
/// single-datagram protocols; overflow means the segment is melting down and
/// dropping is the contract.
const EVENT_QUEUE: usize = 256;

/// Immutable per-group runtime settings, reduced from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct GroupSettings {
    pub group_id: u16,
    pub virtual_ip: Ipv4Addr,
    pub priority: u8,
    pub weight: u8,
    pub preempt: bool,
    pub hello_interval: Duration,
    pub hold_time: Duration,
}

impl GroupSettings {
    pub fn from_config(cfg: &DaemonConfig) -> Self {
        Self {
            group_id: u16::from(cfg.group_id),
            virtual_ip: cfg.virtual_ip,
            priority: cfg.priority,
            weight: cfg.weight,
            preempt: cfg.preempt,
            hello_interval: cfg.hello_interval(),
            hold_time: cfg.hold_time(),
        }
    }
}

/// The daemon core: owns the registry, the selector cursor and the current
/// role, and runs until cancelled.
pub struct Daemon<H, A, C = SystemClock> {
    settings: GroupSettings,
    info: Arc<dyn LocalInfo>,
    local_ip: Ipv4Addr,
    local_forwarders: Vec<ForwarderTlv>,
    registry: Arc<Registry>,
    selector: ForwarderSelector,
    role: Arc<RoleCell>,
    hello: Arc<H>,
    arp: Arc<A>,
    clock: C,
}

impl<H, A, C> Daemon<H, A, C>
where
    H: HelloBus,
    A: ArpBus,
    C: Clock,
{
    /// Assemble a daemon. Resolving the local address is the one lookup that
    /// is fatal here; forwarder MACs resolve lazily on every tick.
    pub fn new(
        settings: GroupSettings,
        info: Arc<dyn LocalInfo>,
        hello: Arc<H>,
        arp: Arc<A>,
        selector: ForwarderSelector,
        clock: C,
    ) -> Result<Self> {
        let local_ip = info.local_ip()?;
        Ok(Self {
            settings,
            info,
            local_ip,
            local_forwarders: Vec::new(),
            registry: Arc::new(Registry::new()),
            selector,
            role: Arc::new(RoleCell::default()),
            hello,
            arp,
            clock,
        })
    }

    /// Shared handle to the current role, for observers and tests.
    pub fn role_handle(&self) -> Arc<RoleCell> {
        self.role.clone()
    }

    /// Shared handle to the registry, for observers and tests.
    pub fn registry_handle(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Run until `cancel` fires. A collaborator loop that dies takes the
    /// whole daemon down with it rather than leaving it half-running.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            local_ip = %self.local_ip,
            vip = %self.settings.virtual_ip,
            group = self.settings.group_id,
            priority = self.settings.priority,
            preempt = self.settings.preempt,
            hello = ?self.settings.hello_interval,
            hold = ?self.settings.hold_time,
            selector = self.selector.name(),
            "starting"
        );

        self.publish_local_forwarders();

        let (hello_tx, mut hello_rx) = mpsc::channel::<HelloEvent>(EVENT_QUEUE);
        let (arp_tx, mut arp_rx) = mpsc::channel::<ArpRequest>(EVENT_QUEUE);

        let hello_task = {
            let bus = self.hello.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = bus.run(hello_tx, cancel.child_token()).await {
                    error!(error = %e, "hello receive loop failed");
                    cancel.cancel();
                }
            })
        };
        let arp_task = {
            let bus = self.arp.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = bus.run(arp_tx, cancel.child_token()).await {
                    error!(error = %e, "arp capture loop failed");
                    cancel.cancel();
                }
            })
        };

        let mut ticker = tokio::time::interval(self.settings.hello_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.on_tick().await,
                Some(event) = hello_rx.recv() => self.on_hello(event),
                Some(request) = arp_rx.recv() => self.on_arp(request).await,
            }
        }

        drop(hello_rx);
        drop(arp_rx);
        let _ = hello_task.await;
        let _ = arp_task.await;
        info!("stopped");
        Ok(())
    }

    /// One inbound Hello: upsert the peer and its forwarders, then re-run
    /// the election against the updated view.
    fn on_hello(&mut self, event: HelloEvent) {
        // The bus filters group and self already; keep the guard for
        // alternative bus implementations.
        if event.src == self.local_ip {
            return;
        }
        let HelloEvent { src, seen_at, frame } = event;
        self.registry.upsert_peer(Peer {
            ip: src,
            priority: frame.priority,
            weight: frame.weight,
            role: frame.role,
            last_seen: seen_at,
        });
        for tlv in &frame.forwarders {
            self.registry.upsert_forwarder(Forwarder {
                id: tlv.id,
                owner_ip: src,
                mac: tlv.mac,
                weight: tlv.weight,
                last_seen: seen_at,
            });
        }
        self.refresh_role();
    }

    /// One tick: prune, republish local forwarders, elect, advertise.
    async fn on_tick(&mut self) {
        let now = self.clock.now();
        self.registry.remove_stale(now, self.settings.hold_time);
        self.publish_local_forwarders();
        let role = self.refresh_role();

        let frame = HelloFrame {
            role,
            group_id: self.settings.group_id,
            priority: self.settings.priority,
            weight: self.settings.weight,
            virtual_ip: self.settings.virtual_ip,
            forwarders: self.local_forwarders.clone(),
        };
        if let Err(e) = self.hello.send(&frame).await {
            warn!(error = %e, "hello send failed");
        }
        debug!(
            role = %role,
            peers = self.registry.list_peers(now, self.settings.hold_time).len(),
            forwarders = self.registry.list_forwarders(now, self.settings.hold_time).len(),
            "tick"
        );
    }

    /// One ARP request: only the active gateway answers, and only for the
    /// VIP, and only when a live forwarder exists.
    async fn on_arp(&mut self, request: ArpRequest) {
        if request.dst_ip != self.settings.virtual_ip {
            return;
        }
        if self.role.load() != Role::Active {
            return;
        }
        let now = self.clock.now();
        let mut live = self.registry.list_forwarders(now, self.settings.hold_time);
        live.sort_unstable_by_key(|f| f.id);
        let chosen = match self.selector.select(&live, request.src_ip) {
            Some(forwarder) => *forwarder,
            None => return,
        };
        if let Err(e) = self
            .arp
            .reply(&request, self.settings.virtual_ip, chosen.mac)
            .await
        {
            warn!(error = %e, "arp reply failed");
        } else {
            debug!(
                client = %request.src_ip,
                forwarder = chosen.id,
                mac = %chosen.mac,
                "answered arp for vip"
            );
        }
    }

    fn refresh_role(&mut self) -> Role {
        let now = self.clock.now();
        let peers = self.registry.list_peers(now, self.settings.hold_time);
        let role = election::evaluate(
            &election::LocalNode {
                ip: self.local_ip,
                priority: self.settings.priority,
                preempt: self.settings.preempt,
            },
            &peers,
        );
        let previous = self.role.load();
        if role != previous {
            info!(from = %previous, to = %role, "role transition");
        }
        self.role.store(role);
        role
    }

    /// Re-read the locally-owned forwarders and stamp them into the
    /// registry; they never expire while the interfaces stay up.
    fn publish_local_forwarders(&mut self) {
        match self.info.local_forwarders() {
            Ok(list) => {
                let now = self.clock.now();
                for tlv in &list {
                    self.registry.upsert_forwarder(Forwarder {
                        id: tlv.id,
                        owner_ip: self.local_ip,
                        mac: tlv.mac,
                        weight: tlv.weight,
                        last_seen: now,
                    });
                }
                self.local_forwarders = list;
            }
            Err(e) => {
                warn!(error = %e, "local forwarders unavailable");
                self.local_forwarders.clear();
            }
        }
    }
}
