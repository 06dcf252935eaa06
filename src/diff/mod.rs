pub mod route_differ;

pub use route_differ::{changed_routes, damaged_routes};
