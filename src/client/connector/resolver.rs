//! Host name resolution with an optional per-(host, port) cache.
//!
//! With caching enabled each key is resolved once; concurrent lookups of a
//! key that is still resolving wait on the same in-flight resolution
//! instead of starting their own. Entries stay until cleared.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::config::AddressFamily;

const IPPROTO_TCP: u8 = 6;

/// One resolved address for a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    pub hostname: String,
    pub addr: SocketAddr,
    pub family: AddressFamily,
    pub protocol: u8,
    /// The host was already a numeric address; no lookup happened.
    pub numeric_host: bool,
}

type Entry = Arc<OnceCell<Vec<ResolvedHost>>>;

/// Resolves host names, optionally caching the results.
#[derive(Debug)]
pub struct Resolver {
    enabled: bool,
    family: AddressFamily,
    cache: DashMap<(String, u16), Entry>,
    /// Lookups that populated a cache entry.
    lookups: AtomicUsize,
}

impl Resolver {
    pub fn new(enabled: bool, family: AddressFamily) -> Self {
        Self {
            enabled,
            family,
            cache: DashMap::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Resolve `host:port` to candidate addresses, in resolver order.
    pub async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<ResolvedHost>> {
        if !self.enabled {
            return lookup(host, port, self.family).await;
        }

        let entry: Entry = self
            .cache
            .entry((host.to_string(), port))
            .or_default()
            .clone();
        let hosts = entry
            .get_or_try_init(|| async {
                let hosts = lookup(host, port, self.family).await?;
                let lookups = self.lookups.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(host, port, addresses = hosts.len(), lookups, "Cached host resolution");
                Ok::<_, std::io::Error>(hosts)
            })
            .await?;
        Ok(hosts.clone())
    }

    /// How many resolutions have populated the cache.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Snapshot of every cached resolution.
    pub fn resolved_hosts(&self) -> Vec<((String, u16), Vec<ResolvedHost>)> {
        self.cache
            .iter()
            .filter_map(|item| {
                item.value()
                    .get()
                    .map(|hosts| (item.key().clone(), hosts.clone()))
            })
            .collect()
    }

    /// Forget one cached key, or all of them.
    pub fn clear_resolved_hosts(&self, key: Option<(&str, u16)>) {
        match key {
            Some((host, port)) => {
                self.cache.remove(&(host.to_string(), port));
            }
            None => self.cache.clear(),
        }
    }
}

async fn lookup(host: &str, port: u16, family: AddressFamily) -> std::io::Result<Vec<ResolvedHost>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        let addr = SocketAddr::new(ip, port);
        return Ok(vec![resolved(host, addr, true)]);
    }

    let hosts: Vec<ResolvedHost> = tokio::net::lookup_host((host, port))
        .await?
        .filter(|addr| family.admits(addr))
        .map(|addr| resolved(host, addr, false))
        .collect();

    if hosts.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no {family:?} addresses for {host}"),
        ));
    }
    Ok(hosts)
}

fn resolved(host: &str, addr: SocketAddr, numeric_host: bool) -> ResolvedHost {
    ResolvedHost {
        hostname: host.to_string(),
        addr,
        family: if addr.is_ipv4() {
            AddressFamily::Ipv4
        } else {
            AddressFamily::Ipv6
        },
        protocol: IPPROTO_TCP,
        numeric_host,
    }
}
