pub mod addr;
pub mod ecmp_spg;
pub mod port_filter;
pub mod route;
pub mod status;

pub use addr::{Ipv4RouterAddress, Ipv6RouterAddress};
pub use ecmp_spg::{EcmpSpg, ViaPath};
pub use port_filter::PortFilterInfo;
pub use route::Route;
pub use status::Status;

use std::collections::BTreeMap;

use crate::ids::DeviceId;

/// `current`: the last successful (or partially successful) program, and
/// `updated`: ephemeral scratch populated at the start of a link-change
/// cycle and discarded after.
pub type EcmpSpgMap = BTreeMap<DeviceId, EcmpSpg>;
