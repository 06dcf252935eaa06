use std::collections::BTreeSet;

use ipnet::IpNet;

use crate::ids::{DeviceId, PortId};
use crate::model::PortFilterInfo;

/// Installs/revokes flow, group, and meter state on hardware. The
/// production implementation (talking to real switches) is out of scope;
/// this crate ships only `runtime::fixture::LoggingRulePopulator` and test
/// fakes against this trait.
pub trait RulePopulator: Send + Sync {
    fn populate_ip_rule_for_subnet(
        &self,
        target: DeviceId,
        subnets: &BTreeSet<IpNet>,
        dest: DeviceId,
        next_hops: &BTreeSet<DeviceId>,
    ) -> bool;

    fn populate_ip_rule_for_router(
        &self,
        target: DeviceId,
        prefix: IpNet,
        dest: DeviceId,
        next_hops: &BTreeSet<DeviceId>,
    ) -> bool;

    fn populate_mpls_rule(
        &self,
        target: DeviceId,
        dest: DeviceId,
        next_hops: &BTreeSet<DeviceId>,
        router_ip: IpNet,
    ) -> bool;

    fn revoke_ip_rule_for_subnet(&self, subnets: &BTreeSet<IpNet>) -> bool;

    fn populate_router_ip_punts(&self, id: DeviceId);
    fn populate_arp_ndp_punts(&self, id: DeviceId);
    fn populate_router_mac_vlan_filters(&self, id: DeviceId) -> Option<PortFilterInfo>;
    fn populate_single_port_filters(&self, id: DeviceId, port: PortId);
    fn revoke_single_port_filters(&self, id: DeviceId, port: PortId);

    fn reset_counter(&self);
    fn get_counter(&self) -> u64;
}
