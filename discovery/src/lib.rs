//! LAN-local advertisement of the agent over DNS-SD (mDNS), so a Hub can
//! find it on the network without any prior configuration.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use mdns_sd::ServiceDaemon;
use mdns_sd::ServiceInfo;

const SERVICE_TYPE: &str = "_capydeploy._tcp.local.";
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to start mDNS daemon: {0}")]
    DaemonStart(#[source] mdns_sd::Error),
    #[error("failed to build service record: {0}")]
    ServiceInfo(#[source] mdns_sd::Error),
    #[error("failed to register service: {0}")]
    Register(#[source] mdns_sd::Error),
    #[error("failed to spawn discovery thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Fields advertised as DNS-SD TXT records. A Hub reads these to identify
/// and display the agent before pairing is attempted.
#[derive(Debug, Clone)]
pub struct AdvertisedInfo {
    pub agent_id: String,
    pub device_name: String,
    pub platform: String,
    pub version: String,
    pub hostname: String,
    pub local_ipv4: String,
    pub port: u16,
}

/// Handle to a running advertisement, owning the background thread that
/// keeps the mDNS daemon alive. Dropping it stops the advertisement.
pub struct Advertiser {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Advertiser {
    /// Start advertising on a dedicated OS thread. Returns once the service
    /// record has been handed to the local mDNS daemon for registration.
    pub fn start(info: AdvertisedInfo) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(DiscoveryError::DaemonStart)?;

        let host_name = format!("{}.local.", info.hostname);
        let instance_name = info.agent_id.clone();
        let mut properties = HashMap::new();
        properties.insert("id".to_string(), info.agent_id.clone());
        properties.insert("name".to_string(), info.device_name.clone());
        properties.insert("platform".to_string(), info.platform.clone());
        properties.insert("version".to_string(), info.version.clone());

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &instance_name,
            &host_name,
            &info.local_ipv4,
            info.port,
            properties,
        )
        .map_err(DiscoveryError::ServiceInfo)?;

        let fullname = service.get_fullname().to_string();

        daemon.register(service).map_err(DiscoveryError::Register)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("capydeploy-discovery".to_string())
            .spawn(move || {
                while !thread_shutdown.load(Ordering::Relaxed) {
                    thread::sleep(POLL_INTERVAL);
                }
                if let Ok(receiver) = daemon.unregister(&fullname) {
                    let _ = receiver.recv_timeout(UNREGISTER_TIMEOUT);
                }
                if let Err(error) = daemon.shutdown() {
                    tracing::warn!(%error, "mDNS daemon shutdown failed");
                }
            })
            .map_err(DiscoveryError::Spawn)?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Stop advertising and block until the background thread has joined.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertised_info_is_cloneable_and_carries_fields() {
        let info = AdvertisedInfo {
            agent_id: "agent-1".to_string(),
            device_name: "Deck".to_string(),
            platform: "linux".to_string(),
            version: "0.1.0".to_string(),
            hostname: "deck-1".to_string(),
            local_ipv4: "192.168.1.50".to_string(),
            port: 7890,
        };
        let cloned = info.clone();
        assert_eq!(cloned.agent_id, "agent-1");
        assert_eq!(cloned.port, 7890);
    }
}
