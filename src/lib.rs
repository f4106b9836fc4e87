//! Internet reachability monitor: probes configured endpoints, classifies
//! connectivity (none / limited / captive-portal / full) and discovers
//! captive-portal redirect URLs.

pub mod dns;
pub mod endpoints;
pub mod monitor;
pub mod network;
pub mod status;

pub use dns::{dns_recovered, DnsVerdict, HostResolver, SystemResolver};
pub use endpoints::{EndpointStore, DEFAULT_ENDPOINTS};
pub use monitor::{ConnectivityMonitor, MonitorConfig, StatusSink};
pub use network::{HttpProbe, ProbeVerdict, ReachabilityProbe};
pub use status::{InternetStatus, IpFamily, TransportError};
