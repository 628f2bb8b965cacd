//! Network configuration context.
//!
//! [`NetworkContext`] knows which address and port the devices can reach this
//! server at, and builds the media URLs handed to them. The advertise IP is
//! either explicit (server config) or detected from the local interfaces.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;

/// Network configuration shared across services.
#[derive(Clone)]
pub struct NetworkContext {
    /// Listening port (may change if the preferred port was taken).
    pub port: Arc<RwLock<u16>>,
    /// IP address that the devices can reach us at.
    pub local_ip: Arc<RwLock<String>>,
    ip_detector: Option<Arc<dyn IpDetector>>,
}

impl NetworkContext {
    /// Creates a context with an explicitly configured advertise IP.
    #[must_use]
    pub fn explicit(port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            port: Arc::new(RwLock::new(port)),
            local_ip: Arc::new(RwLock::new(advertise_ip.to_string())),
            ip_detector: None,
        }
    }

    /// Creates a context whose IP is detected now and can be re-detected later.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial IP detection fails.
    pub fn auto_detect(
        preferred_port: u16,
        ip_detector: Arc<dyn IpDetector>,
    ) -> Result<Self, NetworkError> {
        let local_ip = ip_detector.detect()?;
        Ok(Self {
            port: Arc::new(RwLock::new(preferred_port)),
            local_ip: Arc::new(RwLock::new(local_ip)),
            ip_detector: Some(ip_detector),
        })
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::explicit(3000, IpAddr::V4(std::net::Ipv4Addr::new(192, 168, 1, 10)))
    }

    /// Re-detects the advertise IP (auto-detect mode only) so media URLs
    /// follow a changed DHCP lease. Returns the IP now in use.
    ///
    /// A failed detection keeps the previous IP.
    pub fn refresh_local_ip(&self) -> String {
        let Some(detector) = &self.ip_detector else {
            return self.get_local_ip();
        };
        match detector.detect() {
            Ok(ip) => {
                let mut current = self.local_ip.write();
                if *current != ip {
                    log::info!(
                        "[Network] Advertise IP changed: {} -> {}",
                        current.as_str(),
                        ip
                    );
                    *current = ip;
                }
                current.clone()
            }
            Err(e) => {
                log::warn!("[Network] Keeping advertise IP, re-detection failed: {}", e);
                self.get_local_ip()
            }
        }
    }

    #[must_use]
    pub fn get_port(&self) -> u16 {
        *self.port.read()
    }

    #[must_use]
    pub fn get_local_ip(&self) -> String {
        self.local_ip.read().clone()
    }

    /// Records the port the server actually bound.
    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
    }

    #[must_use]
    pub fn url_builder(&self) -> UrlBuilder {
        UrlBuilder::new(self.get_local_ip(), self.get_port())
    }

    /// Device-reachable URL for a media path such as `/media/a.mp3`.
    #[must_use]
    pub fn media_url(&self, path: &str) -> String {
        self.url_builder().media_url(path)
    }
}

/// Trait for detecting the local IP address.
pub trait IpDetector: Send + Sync {
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Default IP detector using the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to detect local IP: {0}")]
    Detection(String),
}

/// Builds URLs pointing back at this server.
pub struct UrlBuilder {
    ip: String,
    port: u16,
}

impl UrlBuilder {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Base URL, e.g. `http://192.168.1.10:3000`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    #[must_use]
    pub fn media_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url(), path)
        } else {
            format!("{}/{}", self.base_url(), path)
        }
    }
}

/// Extracts the path component of an absolute URL.
///
/// Inputs that are already paths are returned unchanged; query strings and
/// fragments are dropped.
#[must_use]
pub fn url_path(url: &str) -> String {
    let without_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => return strip_query(url).to_string(),
    };
    match without_scheme.find('/') {
        Some(idx) => strip_query(&without_scheme[idx..]).to_string(),
        None => "/".to_string(),
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}
