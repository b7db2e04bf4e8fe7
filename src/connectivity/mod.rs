//! Online/offline tracking.

mod monitor;
mod probe;

pub use monitor::{ConnectionType, ConnectivityMonitor, ConnectivityStatus, EffectiveType};
pub use probe::{NetworkProbe, ReachabilityProbe};
