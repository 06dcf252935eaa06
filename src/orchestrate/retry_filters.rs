use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::external::rule_populator::RulePopulator;
use crate::ids::DeviceId;
use crate::model::PortFilterInfo;
use crate::populate::RetrySchedulerHandle;

const MAX_CONSTANT_RETRY_ATTEMPTS: u32 = 5;
const RETRY_INTERVAL_MS: u64 = 250;
const RETRY_INTERVAL_SCALE: u32 = 1;

struct DeviceRetryState {
    counter: u32,
    constant_attempts: u32,
    prev_run: PortFilterInfo,
}

struct Task {
    due: Instant,
    device: DeviceId,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.device == other.device
    }
}
impl Eq for Task {}
impl Ord for Task {
    // Reversed so `BinaryHeap` (a max-heap) pops the earliest due time first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.due.cmp(&self.due).then_with(|| other.device.cmp(&self.device))
    }
}
impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<Task>,
    states: BTreeMap<DeviceId, DeviceRetryState>,
    shutdown: bool,
}

/// Single-worker scheduler for the per-device port-filter retry loop.
///
/// Mirrors the "one worker is sufficient" design: every device's retry
/// runnable shares this one background thread, so runs against different
/// devices serialize against each other but never against Orchestrator
/// operations.
pub struct RetryScheduler {
    shared: Arc<(Mutex<Inner>, Condvar)>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RetryScheduler {
    pub fn new(rule_populator: Arc<dyn RulePopulator>) -> Arc<Self> {
        let shared = Arc::new((
            Mutex::new(Inner {
                heap: BinaryHeap::new(),
                states: BTreeMap::new(),
                shutdown: false,
            }),
            Condvar::new(),
        ));

        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || run_worker(worker_shared, rule_populator));

        Arc::new(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn shutdown(&self) {
        {
            let (lock, cvar) = &*self.shared;
            lock.lock().unwrap().shutdown = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    #[cfg(test)]
    fn has_device(&self, device: DeviceId) -> bool {
        self.shared.0.lock().unwrap().states.contains_key(&device)
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl RetrySchedulerHandle for RetryScheduler {
    fn schedule(&self, device: DeviceId, baseline: PortFilterInfo) {
        let (lock, cvar) = &*self.shared;
        let mut inner = lock.lock().unwrap();
        inner.states.insert(
            device,
            DeviceRetryState {
                counter: 0,
                constant_attempts: MAX_CONSTANT_RETRY_ATTEMPTS,
                prev_run: baseline,
            },
        );
        inner.heap.push(Task {
            due: Instant::now(),
            device,
        });
        cvar.notify_all();
    }
}

fn run_worker(shared: Arc<(Mutex<Inner>, Condvar)>, rule_populator: Arc<dyn RulePopulator>) {
    let (lock, cvar) = &*shared;
    loop {
        let mut inner = lock.lock().unwrap();
        let device = loop {
            if inner.shutdown {
                return;
            }
            match inner.heap.peek() {
                None => {
                    inner = cvar.wait(inner).unwrap();
                }
                Some(task) => {
                    let now = Instant::now();
                    if task.due <= now {
                        break inner.heap.pop().unwrap().device;
                    }
                    let (guard, _timeout) = cvar.wait_timeout(inner, task.due - now).unwrap();
                    inner = guard;
                }
            }
        };
        drop(inner);
        run_retry_step(&shared, &rule_populator, device);
    }
}

/// One tick of one device's retry runnable: increment its counter, call
/// `populateRouterMacVlanFilters`, and decide whether to reschedule.
fn run_retry_step(
    shared: &Arc<(Mutex<Inner>, Condvar)>,
    rule_populator: &Arc<dyn RulePopulator>,
    device: DeviceId,
) {
    let this_run = rule_populator.populate_router_mac_vlan_filters(device);

    let (lock, cvar) = &**shared;
    let mut inner = lock.lock().unwrap();
    let Some(state) = inner.states.get_mut(&device) else {
        return;
    };
    state.counter += 1;

    let same_result = this_run.map_or(false, |t| t == state.prev_run);
    let reschedule = match this_run {
        None => true,
        Some(_) if !same_result => true,
        Some(_) => {
            state.constant_attempts -= 1;
            state.constant_attempts > 0
        }
    };
    if !same_result {
        state.constant_attempts = MAX_CONSTANT_RETRY_ATTEMPTS;
    }
    if let Some(t) = this_run {
        state.prev_run = t;
    }

    if reschedule {
        let delay_ms = RETRY_INTERVAL_MS * (state.counter as u64).pow(RETRY_INTERVAL_SCALE);
        let due = Instant::now() + Duration::from_millis(delay_ms);
        inner.heap.push(Task { due, device });
        cvar.notify_all();
    } else {
        debug!(%device, "port filter results stabilized, retry loop terminating");
        inner.states.remove(&device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct ScriptedRulePopulator {
        results: Vec<Option<PortFilterInfo>>,
        calls: AtomicUsize,
    }

    impl RulePopulator for ScriptedRulePopulator {
        fn populate_ip_rule_for_subnet(
            &self,
            _t: DeviceId,
            _s: &BTreeSet<ipnet::IpNet>,
            _d: DeviceId,
            _n: &BTreeSet<DeviceId>,
        ) -> bool {
            true
        }
        fn populate_ip_rule_for_router(
            &self,
            _t: DeviceId,
            _p: ipnet::IpNet,
            _d: DeviceId,
            _n: &BTreeSet<DeviceId>,
        ) -> bool {
            true
        }
        fn populate_mpls_rule(
            &self,
            _t: DeviceId,
            _d: DeviceId,
            _n: &BTreeSet<DeviceId>,
            _r: ipnet::IpNet,
        ) -> bool {
            true
        }
        fn revoke_ip_rule_for_subnet(&self, _s: &BTreeSet<ipnet::IpNet>) -> bool {
            true
        }
        fn populate_router_ip_punts(&self, _id: DeviceId) {}
        fn populate_arp_ndp_punts(&self, _id: DeviceId) {}

        fn populate_router_mac_vlan_filters(&self, _id: DeviceId) -> Option<PortFilterInfo> {
            let i = self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.results.get(i).copied().flatten()
        }

        fn populate_single_port_filters(&self, _id: DeviceId, _port: crate::ids::PortId) {}
        fn revoke_single_port_filters(&self, _id: DeviceId, _port: crate::ids::PortId) {}
        fn reset_counter(&self) {}
        fn get_counter(&self) -> u64 {
            0
        }
    }

    #[test]
    fn terminates_after_five_consecutive_equal_results() {
        // One differing result, then six repeats of the same value: the
        // countdown resets on the differing result and needs five further
        // equal results to reach zero and stop rescheduling.
        let results = vec![
            Some(PortFilterInfo::new(1, 0, 2)),
            Some(PortFilterInfo::new(1, 0, 3)),
            Some(PortFilterInfo::new(1, 0, 3)),
            Some(PortFilterInfo::new(1, 0, 3)),
            Some(PortFilterInfo::new(1, 0, 3)),
            Some(PortFilterInfo::new(1, 0, 3)),
            Some(PortFilterInfo::new(1, 0, 3)),
        ];
        let rule_populator: Arc<dyn RulePopulator> = Arc::new(ScriptedRulePopulator {
            results,
            calls: AtomicUsize::new(0),
        });

        let scheduler = RetryScheduler::new(Arc::clone(&rule_populator));
        scheduler.schedule(DeviceId(1), PortFilterInfo::new(0, 0, 0));

        let deadline = Instant::now() + Duration::from_secs(5);
        while scheduler.has_device(DeviceId(1)) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        assert!(!scheduler.has_device(DeviceId(1)), "retry loop should have terminated");
    }
}
