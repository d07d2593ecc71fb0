//! LAN discovery of input-consuming peers
//!
//! Browses the `_touchserver._udp.local.` service type over mDNS/DNS-SD. Each
//! advertisement shows up as a placeholder [`DiscoveredPeer`] that is filled in
//! once the daemon resolves it to an address and port. Advertisements that
//! cannot be resolved within [`RESOLVE_TIMEOUT`] are hidden.
//!
//! Discovery runs independently of any live session: the embedding
//! application lists [`DiscoveryService::resolved_peers`] and hands the chosen
//! host and port to [`crate::link::SessionController::connect`].

mod table;


use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use touchlink_shared::SERVICE_TYPE;

pub use table::{instance_name, select_host, DiscoveredPeer, PeerTable, RESOLVE_TIMEOUT};

/// How often the driver wakes to expire stale resolutions
const EXPIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Discovery error types
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The mDNS daemon could not be started
    #[error("failed to start mDNS daemon: {0}")]
    Daemon(#[source] mdns_sd::Error),
    /// The browse request was rejected
    #[error("failed to browse {service_type}: {source}")]
    Browse {
        service_type: &'static str,
        #[source]
        source: mdns_sd::Error,
    },
    /// The driver thread could not be started
    #[error("failed to spawn discovery thread: {0}")]
    Spawn(#[source] io::Error),
    /// The service record could not be built or registered
    #[error("failed to advertise {instance}: {source}")]
    Register {
        instance: String,
        #[source]
        source: mdns_sd::Error,
    },
}

/// Currently advertised service names, fed by daemon events
///
/// mDNS reports additions and removals one at a time; this folds them into
/// the complete snapshots [`PeerTable::apply_snapshot`] expects.
#[derive(Debug, Default)]
pub(crate) struct BrowseSnapshot {
    advertised: Vec<String>,
}

impl BrowseSnapshot {
    /// Translate one daemon event into table updates
    pub(crate) fn apply(&mut self, event: ServiceEvent, table: &mut PeerTable, now: Instant) {
        match event {
            ServiceEvent::ServiceFound(_, fullname) => {
                tracing::debug!(service = %fullname, "Service found");
                self.found(fullname, table, now);
            }
            ServiceEvent::ServiceResolved(info) => self.resolved(&info, table, now),
            ServiceEvent::ServiceRemoved(_, fullname) => {
                tracing::debug!(service = %fullname, "Service removed");
                self.advertised.retain(|name| *name != fullname);
                table.apply_snapshot(&self.advertised, now);
            }
            _ => {}
        }
    }

    fn found(&mut self, fullname: String, table: &mut PeerTable, now: Instant) {
        if !self.advertised.contains(&fullname) {
            self.advertised.push(fullname);
        }
        table.apply_snapshot(&self.advertised, now);
    }

    fn resolved(&mut self, info: &ServiceInfo, table: &mut PeerTable, now: Instant) {
        let fullname = info.get_fullname().to_string();
        if !self.advertised.contains(&fullname) {
            self.found(fullname.clone(), table, now);
        }

        match select_host(info.get_addresses(), info.get_hostname()) {
            Some(host) => {
                tracing::debug!(service = %fullname, %host, port = info.get_port(), "Service resolved");
                table.on_resolved(DiscoveredPeer {
                    name: instance_name(&fullname).to_string(),
                    id: fullname,
                    host,
                    port: info.get_port(),
                });
            }
            None => {
                tracing::debug!(service = %fullname, "Service has no usable address");
                table.on_failed(&fullname);
            }
        }
    }
}

struct Driver {
    daemon: ServiceDaemon,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Background mDNS browser maintaining a [`PeerTable`]
pub struct DiscoveryService {
    table: Arc<Mutex<PeerTable>>,
    driver: Option<Driver>,
}

impl Default for DiscoveryService {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryService {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(PeerTable::new())),
            driver: None,
        }
    }

    fn table(&self) -> MutexGuard<'_, PeerTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start browsing; a no-op if already running
    pub fn start(&mut self) -> Result<(), DiscoveryError> {
        if self.driver.is_some() {
            return Ok(());
        }

        let daemon = ServiceDaemon::new().map_err(DiscoveryError::Daemon)?;
        let receiver = daemon
            .browse(SERVICE_TYPE)
            .map_err(|source| DiscoveryError::Browse {
                service_type: SERVICE_TYPE,
                source,
            })?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let table = self.table.clone();

        let spawned = thread::Builder::new()
            .name("touchlink-discovery".into())
            .spawn(move || {
                let mut snapshot = BrowseSnapshot::default();
                while !stop_flag.load(Ordering::Acquire) {
                    let event = receiver.recv_timeout(EXPIRE_POLL_INTERVAL);
                    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
                    let now = Instant::now();
                    match event {
                        Ok(event) => snapshot.apply(event, &mut table, now),
                        Err(_) if receiver.is_disconnected() => break,
                        Err(_) => {}
                    }
                    for id in table.expire(now) {
                        tracing::debug!(service = %id, "Resolution timed out");
                    }
                }
                tracing::trace!("Discovery driver exited");
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let _ = daemon.shutdown();
                return Err(DiscoveryError::Spawn(e));
            }
        };

        tracing::info!(service_type = SERVICE_TYPE, "Discovery started");
        self.driver = Some(Driver {
            daemon,
            stop,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Stop browsing and forget every peer
    pub fn stop(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.stop.store(true, Ordering::Release);
            if let Err(e) = driver.daemon.stop_browse(SERVICE_TYPE) {
                tracing::trace!(error = %e, "stop_browse failed");
            }
            if let Err(e) = driver.daemon.shutdown() {
                tracing::trace!(error = %e, "Daemon shutdown failed");
            }
            if let Some(handle) = driver.handle.take() {
                let _ = handle.join();
            }
            tracing::info!("Discovery stopped");
        }
        self.table().clear();
    }

    /// Whether a browse is active
    pub fn is_running(&self) -> bool {
        self.driver.is_some()
    }

    /// Resolved peers and pending placeholders
    pub fn peers(&self) -> Vec<DiscoveredPeer> {
        self.table().peers()
    }

    /// Peers ready to connect to
    pub fn resolved_peers(&self) -> Vec<DiscoveredPeer> {
        self.table().resolved_peers()
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("running", &self.is_running())
            .field("peers", &self.table().len())
            .finish()
    }
}

// ============================================================================
// Advertisement
// ============================================================================

/// An mDNS registration of a local peer, withdrawn on drop
///
/// Used by the serving side so clients can find it without typing an
/// address.
pub struct Advertisement {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Advertisement {
    /// Advertise `instance` at `ip:port` under the touchlink service type
    pub fn register(instance: &str, ip: IpAddr, port: u16) -> Result<Self, DiscoveryError> {
        let register_err = |source| DiscoveryError::Register {
            instance: instance.to_string(),
            source,
        };

        let host_name = format!("{}.local.", instance.replace(' ', "-"));
        let info = ServiceInfo::new(SERVICE_TYPE, instance, &host_name, ip, port, None)
            .map_err(register_err)?;
        let fullname = info.get_fullname().to_string();

        let daemon = ServiceDaemon::new().map_err(DiscoveryError::Daemon)?;
        daemon.register(info).map_err(register_err)?;

        tracing::info!(service = %fullname, %ip, port, "Service advertised");
        Ok(Self { daemon, fullname })
    }

    /// Full service name as seen by browsers
    pub fn fullname(&self) -> &str {
        &self.fullname
    }
}

impl Drop for Advertisement {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            tracing::trace!(error = %e, "Unregister failed");
        }
        if let Err(e) = self.daemon.shutdown() {
            tracing::trace!(error = %e, "Daemon shutdown failed");
        }
    }
}

impl std::fmt::Debug for Advertisement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advertisement")
            .field("fullname", &self.fullname)
            .finish()
    }
}
