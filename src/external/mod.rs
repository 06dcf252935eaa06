pub mod device_config;
pub mod fabric_view;
pub mod rule_populator;

pub use device_config::{ConfigLookupError, DeviceConfig};
pub use fabric_view::{Device, FabricView, Link};
pub use rule_populator::RulePopulator;
