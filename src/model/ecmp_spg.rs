use std::collections::{BTreeMap, BTreeSet};

use crate::external::fabric_view::FabricView;
use crate::ids::DeviceId;

/// The ordered sequence of intermediate devices on one ECMP branch from a
/// root to a target, excluding both endpoints. An empty via-path means the
/// target is a direct neighbor of the root.
pub type ViaPath = Vec<DeviceId>;

/// Equal-cost shortest-path tree rooted at `root`, indexed by hop-distance.
///
/// `via_by_depth[d]` maps every target reachable from `root` in exactly `d`
/// hops to the (non-empty) set of via-paths achieving that hop count.
/// `via_by_depth[0]` always contains only `{root: {[]}}`.
#[derive(Debug, Clone)]
pub struct EcmpSpg {
    root: DeviceId,
    via_by_depth: Vec<BTreeMap<DeviceId, BTreeSet<ViaPath>>>,
}

impl EcmpSpg {
    /// Breadth-first expansion from `root` over the devices and
    /// bidirectional links currently visible to `fabric`. Mastership is not
    /// consulted here; only connectivity matters.
    pub fn build(root: DeviceId, fabric: &dyn FabricView) -> Self {
        let mut via_by_depth: Vec<BTreeMap<DeviceId, BTreeSet<ViaPath>>> = Vec::new();
        via_by_depth.push(BTreeMap::from([(root, BTreeSet::from([Vec::new()]))]));

        let mut visited: BTreeSet<DeviceId> = BTreeSet::from([root]);
        let mut frontier: Vec<DeviceId> = vec![root];
        let mut depth = 0usize;

        while !frontier.is_empty() {
            let mut next_layer: BTreeMap<DeviceId, BTreeSet<ViaPath>> = BTreeMap::new();

            for &p in &frontier {
                let Some(p_vias) = via_by_depth[depth].get(&p).cloned() else {
                    continue;
                };
                for v in neighbor_devices(fabric, p) {
                    if visited.contains(&v) {
                        continue;
                    }
                    let entry = next_layer.entry(v).or_default();
                    for vp in &p_vias {
                        let new_via = if p == root {
                            Vec::new()
                        } else {
                            let mut nv = vp.clone();
                            nv.push(p);
                            nv
                        };
                        entry.insert(new_via);
                    }
                }
            }

            if next_layer.is_empty() {
                break;
            }
            visited.extend(next_layer.keys().copied());
            frontier = next_layer.keys().copied().collect();
            via_by_depth.push(next_layer);
            depth += 1;
        }

        Self { root, via_by_depth }
    }

    pub fn root(&self) -> DeviceId {
        self.root
    }

    pub fn via_by_depth(&self) -> &[BTreeMap<DeviceId, BTreeSet<ViaPath>>] {
        &self.via_by_depth
    }

    /// Linear scan over depth buckets for the first via-path-set matching
    /// `target`, as specified.
    pub fn via_for_target(&self, target: DeviceId) -> Option<&BTreeSet<ViaPath>> {
        self.via_by_depth.iter().find_map(|bucket| bucket.get(&target))
    }

    /// All targets reachable from `root`, root included.
    pub fn targets(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.via_by_depth.iter().flat_map(|bucket| bucket.keys().copied())
    }

    /// Flattens the depth-indexed structure into a single target -> via-set
    /// map, the representation equality and diffing operate over.
    pub fn flatten(&self) -> BTreeMap<DeviceId, BTreeSet<ViaPath>> {
        let mut out = BTreeMap::new();
        for bucket in &self.via_by_depth {
            out.extend(bucket.iter().map(|(k, v)| (*k, v.clone())));
        }
        out
    }

    /// The first hop on each ECMP branch toward `target`: the via-path's
    /// first intermediate, or `root` itself when the via-path is empty
    /// (direct neighbor).
    pub fn next_hops(&self, target: DeviceId) -> Option<BTreeSet<DeviceId>> {
        let vias = self.via_for_target(target)?;
        Some(
            vias.iter()
                .map(|via| via.first().copied().unwrap_or(self.root))
                .collect(),
        )
    }
}

impl PartialEq for EcmpSpg {
    fn eq(&self, other: &Self) -> bool {
        self.flatten() == other.flatten()
    }
}
impl Eq for EcmpSpg {}

fn neighbor_devices(fabric: &dyn FabricView, device: DeviceId) -> BTreeSet<DeviceId> {
    fabric
        .links_of(device)
        .into_iter()
        .filter_map(|link| {
            let (src, dst) = link.endpoints();
            if src.device == device {
                Some(dst.device)
            } else if dst.device == device {
                Some(src.device)
            } else {
                None
            }
        })
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

    #[test]
    fn line_graph_direct_neighbor_has_empty_via_path() {
        let mut fabric = FakeFabric::default();
        fabric.add_link(cp(1, 1), cp(2, 1));
        fabric.add_link(cp(2, 2), cp(3, 1));

        let spg = EcmpSpg::build(DeviceId(1), &fabric);
        let via_b = spg.via_for_target(DeviceId(2)).expect("B reachable");
        assert_eq!(via_b, &BTreeSet::from([Vec::new()]));

        let via_c = spg.via_for_target(DeviceId(3)).expect("C reachable");
        assert_eq!(via_c, &BTreeSet::from([vec![DeviceId(2)]]));
    }

    #[test]
    fn square_gives_two_equal_cost_paths_to_the_far_corner() {
        // Square A-B-C-D-A: C is two hops from A either way round the
        // ring (via B or via D), both equal cost; D is a direct neighbor.
        let mut fabric = FakeFabric::default();
        fabric.add_link(cp(1, 1), cp(2, 1));
        fabric.add_link(cp(2, 2), cp(3, 1));
        fabric.add_link(cp(3, 2), cp(4, 1));
        fabric.add_link(cp(4, 2), cp(1, 2));

        let spg = EcmpSpg::build(DeviceId(1), &fabric);
        let via_d = spg.via_for_target(DeviceId(4)).expect("D reachable");
        // D is a direct neighbor of A (A-D edge), so depth 1, empty via-path.
        assert_eq!(via_d, &BTreeSet::from([Vec::new()]));

        let via_c = spg.via_for_target(DeviceId(3)).expect("C reachable");
        // C is reachable at depth 2 via B or via D -- both equal cost.
        assert_eq!(
            via_c,
            &BTreeSet::from([vec![DeviceId(2)], vec![DeviceId(4)]])
        );
    }

    #[test]
    fn next_hops_uses_root_for_direct_neighbors() {
        let mut fabric = FakeFabric::default();
        fabric.add_link(cp(1, 1), cp(2, 1));
        let spg = EcmpSpg::build(DeviceId(1), &fabric);
        assert_eq!(
            spg.next_hops(DeviceId(2)),
            Some(BTreeSet::from([DeviceId(2)]))
        );
    }

    #[test]
    fn equality_ignores_depth_bucket_identity() {
        let mut a = FakeFabric::default();
        a.add_link(cp(1, 1), cp(2, 1));
        a.add_link(cp(2, 2), cp(3, 1));
        let spg_a = EcmpSpg::build(DeviceId(1), &a);
        let spg_b = EcmpSpg::build(DeviceId(1), &a);
        assert_eq!(spg_a, spg_b);
    }
}
