use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use ipnet::IpNet;
use tracing::warn;

use crate::diff::{changed_routes, damaged_routes};
use crate::external::fabric_view::FabricView;
use crate::external::{DeviceConfig, RulePopulator};
use crate::ids::{ConnectPoint, DeviceId, LinkKey};
use crate::model::{EcmpSpg, EcmpSpgMap, Route, Status};
use crate::orchestrate::retry_filters::RetryScheduler;
use crate::populate::{Populator, RetrySchedulerHandle};

struct State {
    status: Status,
    current: EcmpSpgMap,
    updated: EcmpSpgMap,
}

/// Owns the status lock, the current/updated ECMP snapshot maps, and the
/// snapshot-and-diff flow. All public operations are serialized by a
/// single `Mutex` held for the duration of one cycle; internal helpers
/// take the already-locked state rather than re-acquiring it, which is
/// how this crate gets the spec's "single reentrant statusLock" behavior
/// out of a non-reentrant `std::sync::Mutex`.
pub struct Orchestrator {
    fabric: Arc<dyn FabricView>,
    rule_populator: Arc<dyn RulePopulator>,
    populator: Populator,
    retry_scheduler: Arc<RetryScheduler>,
    state: Mutex<State>,
}

impl Orchestrator {
    pub fn new(
        fabric: Arc<dyn FabricView>,
        device_config: Arc<dyn DeviceConfig>,
        rule_populator: Arc<dyn RulePopulator>,
    ) -> Self {
        let retry_scheduler = RetryScheduler::new(Arc::clone(&rule_populator));
        let populator = Populator::new(
            device_config,
            Arc::clone(&rule_populator),
            Arc::clone(&retry_scheduler) as Arc<dyn RetrySchedulerHandle>,
        );
        Self {
            fabric,
            rule_populator,
            populator,
            retry_scheduler,
            state: Mutex::new(State {
                status: Status::Idle,
                current: BTreeMap::new(),
                updated: BTreeMap::new(),
            }),
        }
    }

    pub fn status(&self) -> Status {
        self.state.lock().unwrap().status
    }

    pub fn rule_counter(&self) -> u64 {
        self.rule_populator.get_counter()
    }

    pub fn current_root_count(&self) -> usize {
        self.state.lock().unwrap().current.len()
    }

    fn mastered_devices(&self) -> Vec<DeviceId> {
        self.fabric
            .devices()
            .into_iter()
            .map(|d| d.id)
            .filter(|id| self.fabric.is_local_master(*id))
            .collect()
    }

    /// Full reprogram: fresh `EcmpSpg` for every locally-mastered device,
    /// `populateEcmpRules` with empty subnet scope for each.
    pub fn populate_all_routing_rules(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.status = Status::Started;
        self.rule_populator.reset_counter();

        for root in self.mastered_devices() {
            let spg = EcmpSpg::build(root, self.fabric.as_ref());
            if !self.populator.populate_ecmp_rules(root, &spg, &BTreeSet::new()) {
                warn!(%root, "populate_ecmp_rules failed during full reprogram, aborting cycle");
                state.status = Status::Aborted;
                return false;
            }
            state.current.insert(root, spg);
        }

        state.status = Status::Succeeded;
        true
    }

    /// Snapshot-and-diff flow triggered by a link topology change.
    /// `failed_link = None` means "diff by comparing snapshots"; `Some`
    /// means "diff by walking via-paths for the failed hop".
    pub fn populate_routing_rules_for_link_status_change(
        &self,
        failed_link: Option<LinkKey>,
    ) -> bool {
        {
            let state = self.state.lock().unwrap();
            if state.status == Status::Started {
                warn!("previous population not finished, dropping link-status event");
                return true;
            }
        }

        let updated: EcmpSpgMap = self
            .mastered_devices()
            .into_iter()
            .map(|root| (root, EcmpSpg::build(root, self.fabric.as_ref())))
            .collect();

        let mut state = self.state.lock().unwrap();
        state.updated = updated;
        state.status = Status::Started;

        let routes = match failed_link {
            None => Some(changed_routes(&state.current, &state.updated, self.fabric.as_ref())),
            Some(link) => damaged_routes(&state.current, link, self.fabric.as_ref()),
        };

        let routes = match routes {
            Some(routes) => routes,
            None => {
                // SnapshotStale: escalate to a full reprogram. Drop the
                // guard first so the nested call can re-acquire the lock.
                drop(state);
                return self.populate_all_routing_rules();
            }
        };

        if routes.is_empty() {
            state.status = Status::Succeeded;
            state.updated.clear();
            return true;
        }

        let ok = self.repopulate(&mut state, routes);
        state.updated.clear();
        ok
    }

    pub fn start_population_process(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            match state.status {
                Status::Idle | Status::Succeeded | Status::Aborted => {
                    state.status = Status::Started;
                }
                Status::Started => {
                    warn!("start_population_process: a cycle is already in progress");
                    return false;
                }
            }
        }
        self.populate_all_routing_rules()
    }

    pub fn resume_population_process(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.status != Status::Aborted {
                warn!(status = ?state.status, "resume_population_process requires ABORTED status");
                return false;
            }
            state.status = Status::Started;
        }
        self.populate_all_routing_rules()
    }

    /// Handles a `deviceAdded` event: installs punt rules and kicks off
    /// the port-filter retry loop for the new device. Does not touch
    /// `current`/`updated` or Status; unlike the other public operations
    /// it is not serialized by the status lock, matching spec.md §6's
    /// Populator-level (not cycle-level) scope for `populatePortAddressing`.
    pub fn device_added(&self, device: DeviceId) {
        self.populator.populate_port_addressing(device);
    }

    pub fn populate_subnet(&self, cp: ConnectPoint, subnets: &BTreeSet<IpNet>) -> bool {
        let state = self.state.lock().unwrap();
        let Some(spg) = state.current.get(&cp.device) else {
            warn!(device = %cp.device, "populate_subnet: no current EcmpSpg for device");
            return false;
        };
        self.populator.populate_ecmp_rules(cp.device, spg, subnets)
    }

    pub fn revoke_subnet(&self, subnets: &BTreeSet<IpNet>) -> bool {
        self.rule_populator.revoke_ip_rule_for_subnet(subnets)
    }

    pub fn purge_ecmp_graph(&self, device: DeviceId) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            state.current.remove(&device);
            state.updated.remove(&device);
        }
        self.populate_routing_rules_for_link_status_change(None)
    }

    /// Partitions `routes` by destination device; for each, replays every
    /// route toward it and only copies `updated` into `current` once every
    /// route for that device has succeeded.
    fn repopulate(&self, state: &mut State, routes: BTreeSet<Route>) -> bool {
        let mut by_root: BTreeMap<DeviceId, Vec<Route>> = BTreeMap::new();
        for route in routes {
            by_root.entry(route.root()).or_default().push(route);
        }

        for (root, root_routes) in by_root {
            let mut fresh_root_spg: Option<EcmpSpg> = None;
            let mut failed = false;

            for route in &root_routes {
                match route {
                    Route::Singleton(root) => {
                        let spg = EcmpSpg::build(*root, self.fabric.as_ref());
                        if !self.populator.populate_ecmp_rules(*root, &spg, &BTreeSet::new()) {
                            failed = true;
                            break;
                        }
                        fresh_root_spg = Some(spg);
                    }
                    Route::Pair(target, dest) => {
                        let Some(updated_spg) = state.updated.get(dest) else {
                            warn!(%dest, "repopulate: no updated EcmpSpg for impacted device");
                            failed = true;
                            break;
                        };
                        let next_hops = updated_spg.next_hops(*target).unwrap_or_default();
                        if !self
                            .populator
                            .populate_partial(*target, *dest, &next_hops, &BTreeSet::new())
                        {
                            failed = true;
                            break;
                        }
                    }
                }
            }

            if failed {
                state.status = Status::Aborted;
                return false;
            }

            if let Some(spg) = fresh_root_spg {
                state.current.insert(root, spg);
            } else if let Some(updated_spg) = state.updated.get(&root) {
                state.current.insert(root, updated_spg.clone());
            }
        }

        state.status = Status::Succeeded;
        true
    }
}
