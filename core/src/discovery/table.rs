//! Discovered peer bookkeeping
//!
//! [`PeerTable`] is the pure half of discovery: it knows nothing about mDNS
//! and is driven by browse snapshots and resolution results.

use std::net::IpAddr;
use std::time::{Duration, Instant};

/// How long a single resolution may take before it is considered failed
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// A peer advertising the input service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    /// Stable id derived from instance name, service type and domain
    pub id: String,
    /// Display name (the advertised instance name)
    pub name: String,
    /// Address or host name to connect to; empty until resolved
    pub host: String,
    /// Service port; 0 until resolved
    pub port: u16,
}

impl DiscoveredPeer {
    fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: instance_name(id).to_string(),
            host: String::new(),
            port: 0,
        }
    }

    /// Whether the peer has a usable endpoint
    pub fn is_resolved(&self) -> bool {
        !self.host.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Pending { deadline: Instant },
    Resolved,
    Failed,
}

#[derive(Debug, Clone)]
struct Entry {
    peer: DiscoveredPeer,
    resolution: Resolution,
}

/// Discovered peers in first-seen order
#[derive(Debug, Default)]
pub struct PeerTable {
    entries: Vec<Entry>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.peer.id == id)
    }

    /// Apply the complete set of currently advertised ids
    ///
    /// New ids get a placeholder whose resolution must finish within
    /// [`RESOLVE_TIMEOUT`] of `now`; ids that previously failed to resolve
    /// get a fresh attempt. Peers missing from the snapshot are pruned.
    /// Resolved peers still present are left untouched.
    pub fn apply_snapshot<S: AsRef<str>>(&mut self, ids: &[S], now: Instant) {
        let deadline = now + RESOLVE_TIMEOUT;

        self.entries
            .retain(|e| ids.iter().any(|id| id.as_ref() == e.peer.id));

        for id in ids {
            let id = id.as_ref();
            match self.position(id) {
                Some(index) => {
                    let entry = &mut self.entries[index];
                    if entry.resolution == Resolution::Failed {
                        entry.resolution = Resolution::Pending { deadline };
                    }
                }
                None => self.entries.push(Entry {
                    peer: DiscoveredPeer::placeholder(id),
                    resolution: Resolution::Pending { deadline },
                }),
            }
        }
    }

    /// Record a successful resolution (replace by id, else append)
    pub fn on_resolved(&mut self, peer: DiscoveredPeer) {
        let entry = Entry {
            peer,
            resolution: Resolution::Resolved,
        };
        match self.position(&entry.peer.id) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Record a failed resolution; the peer is hidden until the next attempt
    pub fn on_failed(&mut self, id: &str) {
        if let Some(index) = self.position(id) {
            let entry = &mut self.entries[index];
            if entry.resolution != Resolution::Resolved {
                entry.resolution = Resolution::Failed;
            }
        }
    }

    /// Fail every pending resolution whose deadline has passed
    ///
    /// Returns the ids that timed out.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut expired = Vec::new();
        for entry in &mut self.entries {
            if let Resolution::Pending { deadline } = entry.resolution {
                if now >= deadline {
                    entry.resolution = Resolution::Failed;
                    expired.push(entry.peer.id.clone());
                }
            }
        }
        expired
    }

    /// Resolved peers and pending placeholders, in first-seen order
    pub fn peers(&self) -> Vec<DiscoveredPeer> {
        self.entries
            .iter()
            .filter(|e| e.resolution != Resolution::Failed)
            .map(|e| e.peer.clone())
            .collect()
    }

    /// Only the peers with a usable endpoint
    pub fn resolved_peers(&self) -> Vec<DiscoveredPeer> {
        self.entries
            .iter()
            .filter(|e| e.resolution == Resolution::Resolved)
            .map(|e| e.peer.clone())
            .collect()
    }

    /// Look up one visible peer
    pub fn get(&self, id: &str) -> Option<&DiscoveredPeer> {
        self.position(id)
            .map(|index| &self.entries[index])
            .filter(|e| e.resolution != Resolution::Failed)
            .map(|e| &e.peer)
    }

    pub fn len(&self) -> usize {
        self.peers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Instance name from a full service name
///
/// `Desk PC._touchserver._udp.local.` becomes `Desk PC`.
pub fn instance_name(fullname: &str) -> &str {
    fullname
        .find("._")
        .map_or(fullname.trim_end_matches('.'), |end| &fullname[..end])
}

/// Pick the host to connect to for a resolved service
///
/// IPv4 addresses win. Link-local IPv6 addresses are rejected since they are
/// unusable without a scope id; other IPv6 addresses are accepted. When no
/// address was reported the host name is used as-is. Returns `None` when
/// only unusable addresses were reported.
pub fn select_host<'a, I>(addresses: I, hostname: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a IpAddr>,
{
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    let mut reported = false;

    for addr in addresses {
        reported = true;
        match addr {
            IpAddr::V4(ip) => v4.push(*ip),
            IpAddr::V6(ip) if is_unicast_link_local(ip) => {}
            IpAddr::V6(ip) => v6.push(*ip),
        }
    }

    // Address sets are unordered, sort for a stable pick
    v4.sort_unstable();
    v6.sort_unstable();

    if let Some(ip) = v4.first() {
        return Some(ip.to_string());
    }
    if let Some(ip) = v6.first() {
        return Some(ip.to_string());
    }

    let hostname = hostname.trim_end_matches('.');
    if !reported && !hostname.is_empty() {
        return Some(hostname.to_string());
    }
    None
}

fn is_unicast_link_local(ip: &std::net::Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}
