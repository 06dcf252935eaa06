pub mod populator;

pub use populator::Populator;

use crate::ids::DeviceId;
use crate::model::PortFilterInfo;

/// The Populator's only dependency on the retry subsystem: a way to kick
/// off a per-device port-filter stabilization loop without depending on
/// `orchestrate` directly (which itself depends on `Populator`).
pub trait RetrySchedulerHandle: Send + Sync {
    fn schedule(&self, device: DeviceId, baseline: PortFilterInfo);
}
