pub mod config;
pub mod fixture;
pub mod mgmt;

pub use config::{load_fixture_config, FixtureConfig, HttpManagementConfig};
pub use fixture::{LoggingRulePopulator, StaticDeviceConfig, StaticFabricView};
pub use mgmt::{MgmtServer, StatusSnapshot};
