//! General utilities shared across the application.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{SystemTime, UNIX_EPOCH};

use local_ip_address::list_afinet_netifas;
use serde::Serialize;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Generates an opaque, stable player id: `{unix-millis}_{9 hex chars}`.
#[must_use]
pub fn generate_player_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}", now_millis(), &random[..9])
}

/// Generates a group id: `group_{unix-millis}_{6 hex chars}`.
///
/// The random suffix keeps ids distinct when several groups are created
/// within the same millisecond.
#[must_use]
pub fn generate_group_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("group_{}_{}", now_millis(), &random[..6])
}

// ─────────────────────────────────────────────────────────────────────────────
// Network Interfaces
// ─────────────────────────────────────────────────────────────────────────────

/// A non-loopback IPv4 address bound to a local interface.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceAddress {
    /// Interface name (e.g., "en0", "eth0").
    pub name: String,
    /// IPv4 address bound to this interface.
    pub address: Ipv4Addr,
}

/// Lists non-loopback IPv4 interface addresses in system order.
pub fn list_ipv4_interfaces() -> Vec<InterfaceAddress> {
    list_afinet_netifas()
        .unwrap_or_else(|e| {
            log::warn!("Failed to list network interfaces: {}", e);
            Vec::new()
        })
        .into_iter()
        .filter_map(|(name, addr)| match addr {
            IpAddr::V4(ipv4) if !ipv4.is_loopback() => Some(InterfaceAddress {
                name,
                address: ipv4,
            }),
            _ => None,
        })
        .collect()
}

/// Returns the /24 prefix (first three octets) of an address, e.g. `192.168.0`.
#[must_use]
pub fn subnet_prefix(ip: Ipv4Addr) -> String {
    let [a, b, c, _] = ip.octets();
    format!("{}.{}.{}", a, b, c)
}

/// Validates a user-supplied subnet prefix of the form `a.b.c`.
#[must_use]
pub fn is_valid_subnet_prefix(subnet: &str) -> bool {
    let parts: Vec<&str> = subnet.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_has_timestamp_and_random_suffix() {
        let id = generate_player_id();
        let (ts, suffix) = id.split_once('_').unwrap();
        assert!(ts.parse::<u64>().is_ok());
        assert_eq!(suffix.len(), 9);
        assert_ne!(id, generate_player_id());
    }

    #[test]
    fn group_ids_are_unique_within_a_millisecond() {
        let ids: std::collections::HashSet<_> = (0..50).map(|_| generate_group_id()).collect();
        assert_eq!(ids.len(), 50);
        assert!(ids.iter().all(|id| id.starts_with("group_")));
    }

    #[test]
    fn subnet_prefix_drops_last_octet() {
        assert_eq!(subnet_prefix(Ipv4Addr::new(192, 168, 0, 18)), "192.168.0");
    }

    #[test]
    fn subnet_prefix_validation() {
        assert!(is_valid_subnet_prefix("10.0.1"));
        assert!(!is_valid_subnet_prefix("10.0.1.5"));
        assert!(!is_valid_subnet_prefix("10.0"));
        assert!(!is_valid_subnet_prefix("10.300.1"));
        assert!(!is_valid_subnet_prefix("a.b.c"));
    }
}
