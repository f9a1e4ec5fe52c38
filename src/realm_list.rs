use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const REALM_TYPE_NORMAL: u8 = 0;
pub const REALM_TYPE_PVP: u8 = 1;
pub const REALM_TYPE_FFA_PVP: u8 = 4;
pub const MAX_CLIENT_REALM_TYPE: u8 = 14;

#[derive(Debug, Error)]
pub enum RealmListError {
    #[error("failed to read realm rows from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse realm rows from {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    #[default]
    Player,
    Moderator,
    GameMaster,
    Administrator,
}

impl SecurityLevel {
    /// Anything above administrator is capped to administrator.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Player,
            1 => Self::Moderator,
            2 => Self::GameMaster,
            _ => Self::Administrator,
        }
    }
}

/// Client-visible realm type after folding variants the client cannot show.
pub fn normalize_realm_type(icon: u8) -> u8 {
    if icon == REALM_TYPE_FFA_PVP {
        REALM_TYPE_PVP
    } else if icon >= MAX_CLIENT_REALM_TYPE {
        REALM_TYPE_NORMAL
    } else {
        icon
    }
}

/// One raw row of the realm directory, as stored.
#[derive(Clone, Debug, Deserialize)]
pub struct RealmRow {
    pub id: u32,
    pub name: String,
    pub address: String,
    #[serde(rename = "localAddress")]
    pub local_address: String,
    #[serde(rename = "localSubnetMask")]
    pub local_subnet_mask: String,
    pub port: u16,
    #[serde(default)]
    pub icon: u8,
    #[serde(default)]
    pub flags: u8,
    #[serde(default)]
    pub timezone: u8,
    #[serde(rename = "allowedSecurityLevel", default)]
    pub allowed_security_level: u8,
    #[serde(default)]
    pub population: f32,
    #[serde(default)]
    pub build: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Realm {
    pub id: u32,
    pub build: u32,
    pub name: String,
    #[serde(rename = "externalAddress")]
    pub external_address: IpAddr,
    #[serde(rename = "localAddress")]
    pub local_address: IpAddr,
    #[serde(rename = "localSubnetMask")]
    pub local_subnet_mask: IpAddr,
    pub port: u16,
    #[serde(rename = "realmType")]
    pub realm_type: u8,
    pub flags: u8,
    pub timezone: u8,
    #[serde(rename = "allowedSecurityLevel")]
    pub allowed_security_level: SecurityLevel,
    pub population: f32,
}

/// A row whose three addresses have been looked up. `None` means the lookup
/// failed.
#[derive(Clone, Debug)]
pub struct ResolvedRow {
    pub row: RealmRow,
    pub external: Option<IpAddr>,
    pub local: Option<IpAddr>,
    pub subnet_mask: Option<IpAddr>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RealmListDiff {
    pub added: Vec<u32>,
    pub updated: Vec<u32>,
    pub removed: Vec<u32>,
}

pub trait RealmSource: Send + Sync {
    fn load_rows(&self) -> Result<Vec<RealmRow>, RealmListError>;
}

/// Realm rows kept as a JSON array on disk.
pub struct JsonFileRealmSource {
    path: PathBuf,
}

impl JsonFileRealmSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RealmSource for JsonFileRealmSource {
    fn load_rows(&self) -> Result<Vec<RealmRow>, RealmListError> {
        let text = fs::read_to_string(&self.path).map_err(|source| RealmListError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| RealmListError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

pub async fn resolve_address(host: &str) -> Option<IpAddr> {
    let host = host.trim();
    if host.is_empty() {
        return None;
    }
    if let Ok(address) = host.parse::<IpAddr>() {
        return Some(address);
    }
    let addresses: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
        .await
        .ok()?
        .map(|socket| socket.ip())
        .collect();
    addresses
        .iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| addresses.first().copied())
}

/// Looks up every row concurrently. Done apart from [`RealmList::apply_resolved`]
/// so callers can resolve without holding a lock on the list.
pub async fn resolve_rows(rows: Vec<RealmRow>) -> Vec<ResolvedRow> {
    join_all(rows.into_iter().map(resolve_row)).await
}

async fn resolve_row(row: RealmRow) -> ResolvedRow {
    let (external, local, subnet_mask) = tokio::join!(
        resolve_address(&row.address),
        resolve_address(&row.local_address),
        resolve_address(&row.local_subnet_mask),
    );
    ResolvedRow {
        row,
        external,
        local,
        subnet_mask,
    }
}

#[derive(Clone, Debug, Default)]
pub struct RealmList {
    realms: BTreeMap<u32, Realm>,
}

impl RealmList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> Option<&Realm> {
        self.realms.get(&id)
    }

    pub fn realms(&self) -> impl Iterator<Item = &Realm> {
        self.realms.values()
    }

    pub fn len(&self) -> usize {
        self.realms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.realms.is_empty()
    }

    /// One poll pass: resolves every row concurrently and replaces the list.
    pub async fn apply_rows(&mut self, rows: Vec<RealmRow>) -> RealmListDiff {
        let resolved = resolve_rows(rows).await;
        self.apply_resolved(resolved)
    }

    pub fn apply_resolved(&mut self, rows: Vec<ResolvedRow>) -> RealmListDiff {
        let mut previous = std::mem::take(&mut self.realms);
        let mut diff = RealmListDiff::default();

        for resolved in rows {
            let row = resolved.row;
            let lookups = [
                ("address", &row.address, resolved.external),
                ("local_address", &row.local_address, resolved.local),
                ("local_subnet_mask", &row.local_subnet_mask, resolved.subnet_mask),
            ];
            if let Some((field, host, _)) = lookups.iter().find(|(_, _, address)| address.is_none()) {
                warn!(realm_id = row.id, realm = %row.name, field = *field, host = %host, "realm_address_unresolved");
                continue;
            }
            let (Some(external), Some(local), Some(subnet_mask)) =
                (resolved.external, resolved.local, resolved.subnet_mask)
            else {
                continue;
            };

            let realm = Realm {
                id: row.id,
                build: row.build,
                name: row.name,
                external_address: external,
                local_address: local,
                local_subnet_mask: subnet_mask,
                port: row.port,
                realm_type: normalize_realm_type(row.icon),
                flags: row.flags,
                timezone: row.timezone,
                allowed_security_level: SecurityLevel::from_raw(row.allowed_security_level),
                population: row.population,
            };
            if previous.remove(&realm.id).is_some() {
                debug!(realm_id = realm.id, realm = %realm.name, address = %realm.external_address, port = realm.port, "realm_updated");
                diff.updated.push(realm.id);
            } else {
                info!(realm_id = realm.id, realm = %realm.name, address = %realm.external_address, port = realm.port, "realm_added");
                diff.added.push(realm.id);
            }
            self.realms.insert(realm.id, realm);
        }

        for (id, realm) in previous {
            info!(realm_id = id, realm = %realm.name, "realm_removed");
            diff.removed.push(id);
        }
        diff
    }
}
