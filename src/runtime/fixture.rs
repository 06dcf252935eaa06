use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ipnet::IpNet;
use tracing::debug;

use crate::external::device_config::{ConfigLookupError, DeviceConfig};
use crate::external::fabric_view::{Device, FabricView, Link};
use crate::external::rule_populator::RulePopulator;
use crate::ids::{DeviceId, LinkKey, PortId};
use crate::model::addr::{Ipv4RouterAddress, Ipv6RouterAddress};
use crate::model::PortFilterInfo;
use crate::runtime::config::FixtureConfig;

/// A `FabricView` over a YAML-loaded topology snapshot. Immutable except
/// for the explicit `fail_link`/`restore_link` mutation used by the CLI's
/// `fail-link` subcommand and by tests -- mirrors the out-of-scope
/// production controller's link-down notification without needing one.
pub struct StaticFabricView {
    devices: Vec<Device>,
    links_by_device: BTreeMap<DeviceId, Vec<Link>>,
    non_master_devices: BTreeSet<DeviceId>,
    down_links: Mutex<BTreeSet<LinkKey>>,
}

impl StaticFabricView {
    pub fn from_fixture(cfg: &FixtureConfig) -> Self {
        let mut links_by_device: BTreeMap<DeviceId, Vec<Link>> = BTreeMap::new();
        for entry in &cfg.links {
            let link = Link::new(entry.a, entry.b);
            links_by_device.entry(entry.a.device).or_default().push(link);
            links_by_device.entry(entry.b.device).or_default().push(link);
        }

        Self {
            devices: cfg.devices.iter().map(|&id| Device { id }).collect(),
            links_by_device,
            non_master_devices: cfg.non_master_devices.clone(),
            down_links: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn fail_link(&self, link: LinkKey) {
        self.down_links.lock().unwrap().insert(link);
    }

    pub fn restore_link(&self, link: LinkKey) {
        self.down_links.lock().unwrap().remove(&link);
    }
}

impl FabricView for StaticFabricView {
    fn devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    fn links_of(&self, device: DeviceId) -> Vec<Link> {
        let down = self.down_links.lock().unwrap();
        self.links_by_device
            .get(&device)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|link| !down.contains(&link.key()))
            .collect()
    }

    fn is_local_master(&self, device: DeviceId) -> bool {
        !self.non_master_devices.contains(&device)
    }
}

/// A `DeviceConfig` over the same YAML-loaded snapshot.
pub struct StaticDeviceConfig {
    entries: BTreeMap<DeviceId, crate::runtime::config::DeviceFixtureEntry>,
}

impl StaticDeviceConfig {
    pub fn from_fixture(cfg: &FixtureConfig) -> Self {
        Self {
            entries: cfg.device_configs.clone(),
        }
    }
}

impl DeviceConfig for StaticDeviceConfig {
    fn is_edge_device(&self, id: DeviceId) -> Result<bool, ConfigLookupError> {
        self.entries
            .get(&id)
            .map(|e| e.edge)
            .ok_or(ConfigLookupError::NotFound(id))
    }

    fn router_ipv4(&self, id: DeviceId) -> Result<Ipv4RouterAddress, ConfigLookupError> {
        self.entries
            .get(&id)
            .map(|e| Ipv4RouterAddress(e.router_ipv4))
            .ok_or(ConfigLookupError::NotFound(id))
    }

    fn router_ipv6(&self, id: DeviceId) -> Option<Ipv6RouterAddress> {
        self.entries.get(&id).and_then(|e| e.router_ipv6).map(Ipv6RouterAddress)
    }

    fn subnets_of(&self, id: DeviceId) -> BTreeSet<IpNet> {
        self.entries.get(&id).map(|e| e.subnets.clone()).unwrap_or_default()
    }
}

/// Logs every install/revoke call at `debug` and reports success,
/// mirroring the dry-run hardware driver the fixture is grounded on.
/// `populate_router_mac_vlan_filters` returns `None` for a device's first
/// `stabilize_after - 1` calls and `Some` after, to exercise the
/// port-filter retry loop without a real switch.
pub struct LoggingRulePopulator {
    counter: AtomicU64,
    stabilize_after: u32,
    mac_vlan_calls: Mutex<BTreeMap<DeviceId, u32>>,
}

impl LoggingRulePopulator {
    pub fn new(stabilize_after: u32) -> Self {
        Self {
            counter: AtomicU64::new(0),
            stabilize_after: stabilize_after.max(1),
            mac_vlan_calls: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for LoggingRulePopulator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RulePopulator for LoggingRulePopulator {
    fn populate_ip_rule_for_subnet(
        &self,
        target: DeviceId,
        subnets: &BTreeSet<IpNet>,
        dest: DeviceId,
        next_hops: &BTreeSet<DeviceId>,
    ) -> bool {
        debug!(%target, %dest, ?next_hops, subnets = subnets.len(), "populate ip-subnet rule");
        self.counter.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn populate_ip_rule_for_router(
        &self,
        target: DeviceId,
        prefix: IpNet,
        dest: DeviceId,
        next_hops: &BTreeSet<DeviceId>,
    ) -> bool {
        debug!(%target, %dest, %prefix, ?next_hops, "populate router-ip rule");
        self.counter.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn populate_mpls_rule(
        &self,
        target: DeviceId,
        dest: DeviceId,
        next_hops: &BTreeSet<DeviceId>,
        router_ip: IpNet,
    ) -> bool {
        debug!(%target, %dest, %router_ip, ?next_hops, "populate mpls-sr rule");
        self.counter.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn revoke_ip_rule_for_subnet(&self, subnets: &BTreeSet<IpNet>) -> bool {
        debug!(subnets = subnets.len(), "revoke ip-subnet rule");
        true
    }

    fn populate_router_ip_punts(&self, id: DeviceId) {
        debug!(%id, "populate router-ip punts");
    }

    fn populate_arp_ndp_punts(&self, id: DeviceId) {
        debug!(%id, "populate arp/ndp punts");
    }

    fn populate_router_mac_vlan_filters(&self, id: DeviceId) -> Option<PortFilterInfo> {
        let mut calls = self.mac_vlan_calls.lock().unwrap();
        let count = calls.entry(id).or_insert(0);
        *count += 1;
        debug!(%id, calls = *count, "populate router mac/vlan filters");
        if *count >= self.stabilize_after {
            Some(PortFilterInfo::new(0, 0, 0))
        } else {
            None
        }
    }

    fn populate_single_port_filters(&self, id: DeviceId, port: PortId) {
        debug!(%id, %port, "populate single port filter");
    }

    fn revoke_single_port_filters(&self, id: DeviceId, port: PortId) {
        debug!(%id, %port, "revoke single port filter");
    }

    fn reset_counter(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }

    fn get_counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_vlan_filters_stabilize_after_configured_calls() {
        let populator = LoggingRulePopulator::new(3);
        assert_eq!(populator.populate_router_mac_vlan_filters(DeviceId(1)), None);
        assert_eq!(populator.populate_router_mac_vlan_filters(DeviceId(1)), None);
        assert_eq!(
            populator.populate_router_mac_vlan_filters(DeviceId(1)),
            Some(PortFilterInfo::new(0, 0, 0))
        );
    }
}
