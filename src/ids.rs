use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque device identifier, as enumerated by `FabricView`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Opaque port identifier local to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub u16);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port:{}", self.0)
    }
}

impl From<u16> for PortId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// A device/port pair: one endpoint of a `LinkKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectPoint {
    pub device: DeviceId,
    pub port: PortId,
}

impl ConnectPoint {
    pub fn new(device: impl Into<DeviceId>, port: impl Into<PortId>) -> Self {
        Self {
            device: device.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for ConnectPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.port)
    }
}

/// A bidirectional link between two connect points.
///
/// Equality and hashing are order-independent: `LinkKey::new(a, b)` equals
/// `LinkKey::new(b, a)`. This matches `damagedRoutes` needing to match a
/// failed link "in either direction".
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
pub struct LinkKey {
    src: ConnectPoint,
    dst: ConnectPoint,
}

impl LinkKey {
    pub fn new(src: ConnectPoint, dst: ConnectPoint) -> Self {
        if src <= dst {
            Self { src, dst }
        } else {
            Self { src: dst, dst: src }
        }
    }

    pub fn endpoints(&self) -> (ConnectPoint, ConnectPoint) {
        (self.src, self.dst)
    }

    /// True if this link touches the given device/device hop, regardless of
    /// which endpoint carries which device and ignoring port numbers.
    pub fn joins_devices(&self, a: DeviceId, b: DeviceId) -> bool {
        let (x, y) = (self.src.device, self.dst.device);
        (x == a && y == b) || (x == b && y == a)
    }
}

impl PartialEq for LinkKey {
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src && self.dst == other.dst
    }
}

impl std::hash::Hash for LinkKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.src.hash(state);
        self.dst.hash(state);
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.src, self.dst)
    }
}
