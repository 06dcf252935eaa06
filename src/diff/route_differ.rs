use std::collections::BTreeSet;

use crate::external::fabric_view::FabricView;
use crate::ids::{DeviceId, LinkKey};
use crate::model::{EcmpSpg, EcmpSpgMap, Route};

/// For every locally-mastered root with a `current` entry, expands each
/// via-path into its constituent hop pairs and includes the route if any
/// hop matches `failed_link` in either direction. Returns `None` (a
/// `SnapshotStale` condition, escalated by the Orchestrator to a full
/// reprogram) if any locally-mastered device lacks a `current` entry.
pub fn damaged_routes(
    current: &EcmpSpgMap,
    failed_link: LinkKey,
    fabric: &dyn FabricView,
) -> Option<BTreeSet<Route>> {
    let mut routes = BTreeSet::new();

    for device in fabric.devices() {
        let root = device.id;
        if !fabric.is_local_master(root) {
            continue;
        }
        let spg = current.get(&root)?;

        for (target, vias) in spg.flatten() {
            if target == root {
                continue;
            }
            for via in &vias {
                let mut chain = Vec::with_capacity(via.len() + 2);
                chain.push(root);
                chain.extend(via.iter().copied());
                chain.push(target);

                let touches_failed_link = chain
                    .windows(2)
                    .any(|hop| failed_link.joins_devices(hop[0], hop[1]));
                if touches_failed_link {
                    routes.insert(Route::pair(target, root));
                }
            }
        }
    }

    Some(routes)
}

/// Union of `compare(updated, current, root)` and
/// `compare(current, updated, root)` over every locally-mastered root,
/// catching both newly-appeared and newly-disappeared routes.
pub fn changed_routes(
    current: &EcmpSpgMap,
    updated: &EcmpSpgMap,
    fabric: &dyn FabricView,
) -> BTreeSet<Route> {
    let mut routes = BTreeSet::new();

    for device in fabric.devices() {
        let root = device.id;
        if !fabric.is_local_master(root) {
            continue;
        }
        let (Some(current_spg), Some(updated_spg)) = (current.get(&root), updated.get(&root))
        else {
            routes.insert(Route::singleton(root));
            continue;
        };

        routes.extend(compare(updated_spg, current_spg, root));
        routes.extend(compare(current_spg, updated_spg, root));
    }

    routes
}

/// Emits `(target, root)` for every target reachable in `base` whose
/// via-path-set differs from (or is absent in) `comp`.
fn compare(base: &EcmpSpg, comp: &EcmpSpg, root: DeviceId) -> BTreeSet<Route> {
    let comp_flat = comp.flatten();
    base.flatten()
        .into_iter()
        .filter(|(target, vias)| *target != root && comp_flat.get(target) != Some(vias))
        .map(|(target, _)| Route::pair(target, root))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::fabric_view::test_support::FakeFabric;
    use crate::ids::ConnectPoint;

    fn cp(device: u32, port: u16) -> ConnectPoint {
        ConnectPoint::new(device, port)
    }

    fn line_graph() -> FakeFabric {
        let mut fabric = FakeFabric::default();
        fabric.add_link(cp(1, 1), cp(2, 1));
        fabric.add_link(cp(2, 2), cp(3, 1));
        fabric
    }

    fn square_graph() -> FakeFabric {
        let mut fabric = FakeFabric::default();
        fabric.add_link(cp(1, 1), cp(2, 1));
        fabric.add_link(cp(2, 2), cp(3, 1));
        fabric.add_link(cp(3, 2), cp(4, 1));
        fabric.add_link(cp(4, 2), cp(1, 2));
        fabric
    }

    fn snapshot_all_roots(fabric: &FakeFabric) -> EcmpSpgMap {
        fabric
            .devices()
            .into_iter()
            .map(|d| (d.id, EcmpSpg::build(d.id, fabric)))
            .collect()
    }

    #[test]
    fn changed_routes_of_identical_snapshots_is_empty() {
        let fabric = line_graph();
        let snap = snapshot_all_roots(&fabric);
        assert!(changed_routes(&snap, &snap, &fabric).is_empty());
    }

    #[test]
    fn changed_routes_is_symmetric() {
        let fabric = line_graph();
        let before = snapshot_all_roots(&fabric);

        let mut fabric_after = line_graph();
        fabric_after.add_link(cp(1, 2), cp(3, 2));
        let after = snapshot_all_roots(&fabric_after);

        let forward = changed_routes(&before, &after, &fabric);
        let backward = changed_routes(&after, &before, &fabric);
        assert_eq!(forward, backward);
    }

    #[test]
    fn damaged_routes_on_square_includes_direct_and_downstream_target() {
        let fabric = square_graph();
        let current = snapshot_all_roots(&fabric);
        let failed = LinkKey::new(cp(1, 1), cp(2, 1));

        let routes = damaged_routes(&current, failed, &fabric).expect("snapshot complete");
        assert!(routes.contains(&Route::pair(DeviceId(2), DeviceId(1))));
        // C is at depth 2 from A via B or via D; the via-B branch touches A-B.
        assert!(routes.contains(&Route::pair(DeviceId(3), DeviceId(1))));
    }

    #[test]
    fn damaged_routes_is_none_when_a_mastered_device_has_no_snapshot() {
        let fabric = line_graph();
        let mut current = snapshot_all_roots(&fabric);
        current.remove(&DeviceId(2));
        let failed = LinkKey::new(cp(1, 1), cp(2, 1));
        assert!(damaged_routes(&current, failed, &fabric).is_none());
    }

    #[test]
    fn non_master_device_is_ignored_by_both_diff_operations() {
        let mut fabric = line_graph();
        fabric.set_non_master(DeviceId(2));
        let current = snapshot_all_roots(&fabric);

        let failed = LinkKey::new(cp(1, 1), cp(2, 1));
        let damaged = damaged_routes(&current, failed, &fabric).unwrap();
        assert!(damaged.iter().all(|r| r.root() != DeviceId(2)));

        let changed = changed_routes(&current, &current, &fabric);
        assert!(changed.is_empty());
    }
}
