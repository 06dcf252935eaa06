/// A snapshot of per-device port-filter counts, the sole stabilization
/// signal `RetryFilters` watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortFilterInfo {
    pub disabled_ports: u32,
    pub error_ports: u32,
    pub filtered_ports: u32,
}

impl PortFilterInfo {
    pub fn new(disabled_ports: u32, error_ports: u32, filtered_ports: u32) -> Self {
        Self {
            disabled_ports,
            error_ports,
            filtered_ports,
        }
    }
}
