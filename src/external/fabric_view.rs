use crate::ids::{ConnectPoint, DeviceId, LinkKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Device {
    pub id: DeviceId,
}

/// A bidirectional fabric link between two connect points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    src: ConnectPoint,
    dst: ConnectPoint,
}

impl Link {
    pub fn new(src: ConnectPoint, dst: ConnectPoint) -> Self {
        Self { src, dst }
    }

    pub fn endpoints(&self) -> (ConnectPoint, ConnectPoint) {
        (self.src, self.dst)
    }

    pub fn key(&self) -> LinkKey {
        LinkKey::new(self.src, self.dst)
    }
}

/// Enumerates devices, links, and per-device mastership. Notification of
/// topology changes reaches the Orchestrator out of band (see the CLI's
/// `fail-link`/`serve` handling); this trait only exposes point-in-time
/// reads, matching the out-of-scope production implementation.
pub trait FabricView: Send + Sync {
    fn devices(&self) -> Vec<Device>;
    fn links_of(&self, device: DeviceId) -> Vec<Link>;
    fn is_local_master(&self, device: DeviceId) -> bool;
}
