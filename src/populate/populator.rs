use std::collections::BTreeSet;
use std::sync::Arc;

use ipnet::IpNet;
use tracing::warn;

use crate::external::device_config::DeviceConfig;
use crate::external::rule_populator::RulePopulator;
use crate::ids::DeviceId;
use crate::model::{EcmpSpg, PortFilterInfo};
use crate::populate::RetrySchedulerHandle;

/// Drives a `RulePopulator` for one root device, one ECMP graph, and an
/// optional subnet scope. Holds no mutable state of its own; every method
/// is a pure pass-through over its collaborators.
#[derive(Clone)]
pub struct Populator {
    device_config: Arc<dyn DeviceConfig>,
    rule_populator: Arc<dyn RulePopulator>,
    retry_scheduler: Arc<dyn RetrySchedulerHandle>,
}

impl Populator {
    pub fn new(
        device_config: Arc<dyn DeviceConfig>,
        rule_populator: Arc<dyn RulePopulator>,
        retry_scheduler: Arc<dyn RetrySchedulerHandle>,
    ) -> Self {
        Self {
            device_config,
            rule_populator,
            retry_scheduler,
        }
    }

    /// For every target reachable from `dest_sw` in `spg`, resolves its
    /// next-hop set and calls `populate_partial`. Returns false on the
    /// first partial failure.
    pub fn populate_ecmp_rules(
        &self,
        dest_sw: DeviceId,
        spg: &EcmpSpg,
        subnets: &BTreeSet<IpNet>,
    ) -> bool {
        for target in spg.targets() {
            if target == dest_sw {
                continue;
            }
            let next_hops = spg.next_hops(target).unwrap_or_default();
            if !self.populate_partial(target, dest_sw, &next_hops, subnets) {
                return false;
            }
        }
        true
    }

    /// Installs the IP-subnet, router-IP, and MPLS-SR rules that forward
    /// traffic from `target_sw` toward `dest_sw` via `next_hops`.
    pub fn populate_partial(
        &self,
        target_sw: DeviceId,
        dest_sw: DeviceId,
        next_hops: &BTreeSet<DeviceId>,
        subnets: &BTreeSet<IpNet>,
    ) -> bool {
        let target_is_edge = match self.device_config.is_edge_device(target_sw) {
            Ok(v) => v,
            Err(e) => {
                warn!(target = %target_sw, error = %e, "device-config lookup failed");
                return false;
            }
        };
        let dest_is_edge = match self.device_config.is_edge_device(dest_sw) {
            Ok(v) => v,
            Err(e) => {
                warn!(dest = %dest_sw, error = %e, "device-config lookup failed");
                return false;
            }
        };
        let dest_router_v4 = match self.device_config.router_ipv4(dest_sw) {
            Ok(v) => v,
            Err(e) => {
                warn!(dest = %dest_sw, error = %e, "device-config lookup failed");
                return false;
            }
        };
        let dest_router_v6 = self.device_config.router_ipv6(dest_sw);

        if target_is_edge && dest_is_edge {
            let scope = if !subnets.is_empty() {
                subnets.clone()
            } else {
                self.device_config.subnets_of(dest_sw)
            };
            if !self
                .rule_populator
                .populate_ip_rule_for_subnet(target_sw, &scope, dest_sw, next_hops)
            {
                return false;
            }
            if !self.install_router_ip_rules(
                target_sw,
                dest_sw,
                next_hops,
                dest_router_v4.as_prefix().into(),
                dest_router_v6.map(|v6| v6.as_prefix().into()),
            ) {
                return false;
            }
        } else if target_is_edge {
            if !self.install_router_ip_rules(
                target_sw,
                dest_sw,
                next_hops,
                dest_router_v4.as_prefix().into(),
                dest_router_v6.map(|v6| v6.as_prefix().into()),
            ) {
                return false;
            }
        }

        if !self.rule_populator.populate_mpls_rule(
            target_sw,
            dest_sw,
            next_hops,
            dest_router_v4.as_prefix().into(),
        ) {
            return false;
        }
        if let Some(v6) = dest_router_v6 {
            if !self
                .rule_populator
                .populate_mpls_rule(target_sw, dest_sw, next_hops, v6.as_prefix().into())
            {
                return false;
            }
        }

        true
    }

    fn install_router_ip_rules(
        &self,
        target_sw: DeviceId,
        dest_sw: DeviceId,
        next_hops: &BTreeSet<DeviceId>,
        v4_prefix: IpNet,
        v6_prefix: Option<IpNet>,
    ) -> bool {
        if !self
            .rule_populator
            .populate_ip_rule_for_router(target_sw, v4_prefix, dest_sw, next_hops)
        {
            return false;
        }
        if let Some(v6) = v6_prefix {
            if !self
                .rule_populator
                .populate_ip_rule_for_router(target_sw, v6, dest_sw, next_hops)
            {
                return false;
            }
        }
        true
    }

    /// Installs router-IP and ARP/NDP punt rules for `device_id`, then
    /// kicks off the port-filter retry loop if the first filter
    /// installation returned nothing.
    pub fn populate_port_addressing(&self, device_id: DeviceId) {
        self.rule_populator.populate_router_ip_punts(device_id);
        self.rule_populator.populate_arp_ndp_punts(device_id);
        if self
            .rule_populator
            .populate_router_mac_vlan_filters(device_id)
            .is_none()
        {
            self.retry_scheduler
                .schedule(device_id, PortFilterInfo::new(0, 0, 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::device_config::ConfigLookupError;
    use crate::external::fabric_view::test_support::FakeFabric;
    use crate::ids::ConnectPoint;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    use crate::model::addr::Ipv4RouterAddress;

    #[derive(Default)]
    struct FakeDeviceConfig {
        edges: BTreeSet<DeviceId>,
        routers: std::collections::BTreeMap<DeviceId, Ipv4Addr>,
        fail_lookup: Mutex<BTreeSet<DeviceId>>,
    }

    impl DeviceConfig for FakeDeviceConfig {
        fn is_edge_device(&self, id: DeviceId) -> Result<bool, ConfigLookupError> {
            if self.fail_lookup.lock().unwrap().contains(&id) {
                return Err(ConfigLookupError::NotFound(id));
            }
            Ok(self.edges.contains(&id))
        }

        fn router_ipv4(&self, id: DeviceId) -> Result<Ipv4RouterAddress, ConfigLookupError> {
            if self.fail_lookup.lock().unwrap().contains(&id) {
                return Err(ConfigLookupError::NotFound(id));
            }
            self.routers
                .get(&id)
                .map(|addr| Ipv4RouterAddress(*addr))
                .ok_or(ConfigLookupError::NotFound(id))
        }

        fn router_ipv6(&self, _id: DeviceId) -> Option<crate::model::addr::Ipv6RouterAddress> {
            None
        }

        fn subnets_of(&self, _id: DeviceId) -> BTreeSet<IpNet> {
            BTreeSet::new()
        }
    }

    #[derive(Default)]
    struct RecordingRulePopulator {
        calls: Mutex<Vec<String>>,
        counter: std::sync::atomic::AtomicU64,
        fail_mpls: bool,
    }

    impl RulePopulator for RecordingRulePopulator {
        fn populate_ip_rule_for_subnet(
            &self,
            target: DeviceId,
            _subnets: &BTreeSet<IpNet>,
            dest: DeviceId,
            _next_hops: &BTreeSet<DeviceId>,
        ) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(format!("subnet {target}->{dest}"));
            self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            true
        }

        fn populate_ip_rule_for_router(
            &self,
            target: DeviceId,
            _prefix: IpNet,
            dest: DeviceId,
            _next_hops: &BTreeSet<DeviceId>,
        ) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(format!("router {target}->{dest}"));
            self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            true
        }

        fn populate_mpls_rule(
            &self,
            target: DeviceId,
            dest: DeviceId,
            _next_hops: &BTreeSet<DeviceId>,
            _router_ip: IpNet,
        ) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(format!("mpls {target}->{dest}"));
            self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            !self.fail_mpls
        }

        fn revoke_ip_rule_for_subnet(&self, _subnets: &BTreeSet<IpNet>) -> bool {
            true
        }

        fn populate_router_ip_punts(&self, _id: DeviceId) {}
        fn populate_arp_ndp_punts(&self, _id: DeviceId) {}

        fn populate_router_mac_vlan_filters(&self, _id: DeviceId) -> Option<PortFilterInfo> {
            None
        }

        fn populate_single_port_filters(&self, _id: DeviceId, _port: crate::ids::PortId) {}
        fn revoke_single_port_filters(&self, _id: DeviceId, _port: crate::ids::PortId) {}

        fn reset_counter(&self) {
            self.counter.store(0, std::sync::atomic::Ordering::SeqCst);
        }

        fn get_counter(&self) -> u64 {
            self.counter.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    struct NoopRetryScheduler;
    impl RetrySchedulerHandle for NoopRetryScheduler {
        fn schedule(&self, _device: DeviceId, _baseline: PortFilterInfo) {}
    }

    fn cp(device: u32, port: u16) -> ConnectPoint {
        ConnectPoint::new(device, port)
    }

    #[test]
    fn line_graph_root_b_installs_rules_toward_both_neighbors() {
        let mut fabric = FakeFabric::default();
        fabric.add_link(cp(1, 1), cp(2, 1));
        fabric.add_link(cp(2, 2), cp(3, 1));
        let spg = EcmpSpg::build(DeviceId(2), &fabric);

        let mut device_config = FakeDeviceConfig::default();
        device_config.edges.insert(DeviceId(1));
        device_config.edges.insert(DeviceId(2));
        device_config.edges.insert(DeviceId(3));
        device_config
            .routers
            .insert(DeviceId(1), Ipv4Addr::new(10, 0, 0, 1));
        device_config
            .routers
            .insert(DeviceId(2), Ipv4Addr::new(10, 0, 0, 2));
        device_config
            .routers
            .insert(DeviceId(3), Ipv4Addr::new(10, 0, 0, 3));

        let rule_populator = Arc::new(RecordingRulePopulator::default());
        let populator = Populator::new(
            Arc::new(device_config),
            rule_populator.clone(),
            Arc::new(NoopRetryScheduler),
        );

        assert!(populator.populate_ecmp_rules(DeviceId(2), &spg, &BTreeSet::new()));
        assert!(rule_populator.get_counter() >= 6);
    }

    #[test]
    fn config_lookup_failure_short_circuits_with_false() {
        let mut fabric = FakeFabric::default();
        fabric.add_link(cp(1, 1), cp(2, 1));
        let spg = EcmpSpg::build(DeviceId(1), &fabric);

        let mut device_config = FakeDeviceConfig::default();
        device_config.fail_lookup.get_mut().unwrap().insert(DeviceId(2));

        let populator = Populator::new(
            Arc::new(device_config),
            Arc::new(RecordingRulePopulator::default()),
            Arc::new(NoopRetryScheduler),
        );

        assert!(!populator.populate_ecmp_rules(DeviceId(1), &spg, &BTreeSet::new()));
    }

    #[test]
    fn install_failure_short_circuits_with_false() {
        let mut fabric = FakeFabric::default();
        fabric.add_link(cp(1, 1), cp(2, 1));
        let spg = EcmpSpg::build(DeviceId(1), &fabric);

        let mut device_config = FakeDeviceConfig::default();
        device_config
            .routers
            .insert(DeviceId(1), Ipv4Addr::new(10, 0, 0, 1));
        device_config
            .routers
            .insert(DeviceId(2), Ipv4Addr::new(10, 0, 0, 2));

        let rule_populator = Arc::new(RecordingRulePopulator {
            fail_mpls: true,
            ..Default::default()
        });

        let populator = Populator::new(
            Arc::new(device_config),
            rule_populator,
            Arc::new(NoopRetryScheduler),
        );

        assert!(!populator.populate_ecmp_rules(DeviceId(1), &spg, &BTreeSet::new()));
    }
}
