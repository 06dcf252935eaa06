use std::collections::BTreeSet;
use std::fmt;

use ipnet::IpNet;

use crate::ids::DeviceId;
use crate::model::addr::{Ipv4RouterAddress, Ipv6RouterAddress};

/// The persisted device-configuration store's recoverable lookup failure.
/// Kept as a plain enum rather than reaching for `thiserror`: it has one
/// variant and one caller that immediately logs and converts it to `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLookupError {
    NotFound(DeviceId),
}

impl fmt::Display for ConfigLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLookupError::NotFound(id) => write!(f, "no device-config entry for {id}"),
        }
    }
}

impl std::error::Error for ConfigLookupError {}

/// Per-device edge/transit flag, router addresses, and configured subnets.
pub trait DeviceConfig: Send + Sync {
    fn is_edge_device(&self, id: DeviceId) -> Result<bool, ConfigLookupError>;
    fn router_ipv4(&self, id: DeviceId) -> Result<Ipv4RouterAddress, ConfigLookupError>;
    fn router_ipv6(&self, id: DeviceId) -> Option<Ipv6RouterAddress>;
    fn subnets_of(&self, id: DeviceId) -> BTreeSet<IpNet>;
}
