use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use anyhow::{Context, Result};
use ipnet::IpNet;
use serde::Deserialize;

use crate::ids::{ConnectPoint, DeviceId};

#[derive(Debug, Clone)]
pub struct DeviceFixtureEntry {
    pub edge: bool,
    pub router_ipv4: Ipv4Addr,
    pub router_ipv6: Option<Ipv6Addr>,
    pub subnets: BTreeSet<IpNet>,
}

#[derive(Debug, Clone)]
pub struct LinkFixtureEntry {
    pub a: ConnectPoint,
    pub b: ConnectPoint,
}

#[derive(Debug, Clone)]
pub struct HttpManagementConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

/// A static fabric snapshot: devices, bidirectional links, mastership, and
/// per-device configuration, loaded once for the demo binary and tests.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub devices: Vec<DeviceId>,
    pub links: Vec<LinkFixtureEntry>,
    pub non_master_devices: BTreeSet<DeviceId>,
    pub device_configs: BTreeMap<DeviceId, DeviceFixtureEntry>,
    pub management: HttpManagementConfig,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Default)]
struct RawConnectPoint {
    device: u32,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    a: RawConnectPoint,
    b: RawConnectPoint,
}

#[derive(Debug, Deserialize, Default)]
struct RawDeviceEntry {
    id: u32,
    edge: Option<bool>,
    router_ipv4: Option<String>,
    router_ipv6: Option<String>,
    #[serde(default)]
    subnets: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawManagementEndpoint {
    enabled: Option<bool>,
    bind: Option<String>,
    address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct RawManagement {
    http: Option<RawManagementEndpoint>,
}

#[derive(Debug, Deserialize, Default)]
struct RawFixtureConfig {
    #[serde(default)]
    devices: Vec<RawDeviceEntry>,
    #[serde(default)]
    links: Vec<RawLink>,
    #[serde(default)]
    non_master_devices: Vec<u32>,
    management: Option<RawManagement>,
    poll_interval_ms: Option<u64>,
}

pub fn load_fixture_config(path: &Path) -> Result<FixtureConfig> {
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture file {}", path.display()))?;
    let raw: RawFixtureConfig =
        serde_yaml::from_str(&raw_text).context("failed to parse fixture yaml")?;

    let mut devices = Vec::with_capacity(raw.devices.len());
    let mut device_configs = BTreeMap::new();
    for entry in raw.devices {
        let id = DeviceId(entry.id);
        devices.push(id);

        let router_ipv4 = entry
            .router_ipv4
            .as_deref()
            .unwrap_or("0.0.0.0")
            .parse::<Ipv4Addr>()
            .with_context(|| format!("device {id}: invalid router_ipv4"))?;
        let router_ipv6 = entry
            .router_ipv6
            .as_deref()
            .map(|s| s.parse::<Ipv6Addr>())
            .transpose()
            .with_context(|| format!("device {id}: invalid router_ipv6"))?;
        let subnets = entry
            .subnets
            .iter()
            .map(|s| s.parse::<IpNet>())
            .collect::<std::result::Result<BTreeSet<_>, _>>()
            .with_context(|| format!("device {id}: invalid subnet"))?;

        device_configs.insert(
            id,
            DeviceFixtureEntry {
                edge: entry.edge.unwrap_or(false),
                router_ipv4,
                router_ipv6,
                subnets,
            },
        );
    }

    let links = raw
        .links
        .into_iter()
        .map(|link| LinkFixtureEntry {
            a: ConnectPoint::new(link.a.device, link.a.port.unwrap_or(0)),
            b: ConnectPoint::new(link.b.device, link.b.port.unwrap_or(0)),
        })
        .collect();

    let non_master_devices = raw.non_master_devices.into_iter().map(DeviceId).collect();

    let management_raw = raw.management.unwrap_or_default();
    let http_raw = management_raw.http.unwrap_or_default();
    let management = HttpManagementConfig {
        enabled: http_raw.enabled.unwrap_or(true),
        bind_address: http_raw
            .bind
            .or(http_raw.address)
            .unwrap_or_else(|| "127.0.0.1".to_string()),
        port: http_raw.port.unwrap_or(7070),
    };

    Ok(FixtureConfig {
        devices,
        links,
        non_master_devices,
        device_configs,
        management,
        poll_interval_ms: raw.poll_interval_ms.unwrap_or(1000),
    })
}
