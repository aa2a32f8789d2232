use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use relayhub_common::{Endpoint, EndpointKey, InterfaceType};
use tokio::time::Instant;

pub const DEFAULT_TEMP_DISABLE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, PartialEq, Eq)]
pub enum RouterError {
    NotFound,
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::NotFound => f.write_str("endpoint not found or not enabled"),
        }
    }
}

impl std::error::Error for RouterError {}

#[derive(Debug)]
struct TempDisable {
    until: Instant,
    prev_enabled: bool,
}

#[derive(Debug, Default)]
struct Group {
    endpoints: Vec<Endpoint>,
    active: Option<EndpointKey>,
    disables: HashMap<EndpointKey, TempDisable>,
}

#[derive(Debug)]
struct Inner {
    groups: HashMap<InterfaceType, Group>,
    ttl: Duration,
}

/// Endpoint catalogue keyed by interface type.
///
/// Holds the only mutable copy of the endpoint records; callers get clones.
/// Temp-disables expire lazily: every read on a group first restores entries
/// whose deadline passed, so expiry is visible atomically with the read.
pub struct EndpointRouter {
    inner: Mutex<Inner>,
}

impl EndpointRouter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                groups: HashMap::new(),
                ttl: DEFAULT_TEMP_DISABLE_TTL,
            }),
        }
    }

    pub fn set_temp_disable_ttl(&self, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.ttl = if ttl.is_zero() {
            DEFAULT_TEMP_DISABLE_TTL
        } else {
            ttl
        };
    }

    /// Replace the catalogue atomically.
    ///
    /// Active selection per group prefers, in order: the previously active
    /// endpoint by identity, a record flagged active and enabled, the first
    /// enabled record. All temp-disables are cleared.
    pub fn load_endpoints(&self, endpoints: Vec<Endpoint>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let mut grouped: HashMap<InterfaceType, Vec<Endpoint>> = HashMap::new();
        for endpoint in endpoints {
            grouped.entry(endpoint.interface_type).or_default().push(endpoint);
        }

        let previous_active: HashMap<InterfaceType, EndpointKey> = inner
            .groups
            .iter()
            .filter_map(|(interface, group)| {
                group.active.clone().map(|key| (*interface, key))
            })
            .collect();

        let mut groups = HashMap::new();
        for (interface, mut members) in grouped {
            members.sort_by(|a, b| a.priority_cmp(b));

            let active = previous_active
                .get(&interface)
                .and_then(|key| {
                    members
                        .iter()
                        .find(|e| &e.key() == key && e.enabled)
                        .map(|e| e.key())
                })
                .or_else(|| {
                    members
                        .iter()
                        .find(|e| e.active && e.enabled)
                        .map(|e| e.key())
                })
                .or_else(|| members.iter().find(|e| e.enabled).map(|e| e.key()));

            for member in members.iter_mut() {
                member.active = active.as_ref() == Some(&member.key());
            }

            groups.insert(
                interface,
                Group {
                    endpoints: members,
                    active,
                    disables: HashMap::new(),
                },
            );
        }
        inner.groups = groups;
    }

    pub fn get_active(&self, interface: InterfaceType) -> Option<Endpoint> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let group = inner.groups.get_mut(&interface)?;
        restore_expired(group);

        if let Some(key) = group.active.clone()
            && let Some(endpoint) = group.endpoints.iter().find(|e| e.key() == key && e.enabled)
        {
            return Some(endpoint.clone());
        }

        // Current active is gone or disabled; promote the first enabled peer.
        let promoted = group.endpoints.iter().find(|e| e.enabled).map(|e| e.key());
        set_group_active(group, promoted.clone());
        promoted.and_then(|key| {
            group
                .endpoints
                .iter()
                .find(|e| e.key() == key)
                .cloned()
        })
    }

    /// Wraparound scan after `current` for an enabled peer distinct from it.
    pub fn get_next(&self, interface: InterfaceType, current: &EndpointKey) -> Option<Endpoint> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let group = inner.groups.get_mut(&interface)?;
        restore_expired(group);
        scan_after(group, current, |_| true)
    }

    /// Like `get_next`, additionally skipping endpoints already exhausted for
    /// the current request.
    pub fn find_next_untried(
        &self,
        interface: InterfaceType,
        current: &EndpointKey,
        exhausted: &std::collections::HashSet<EndpointKey>,
    ) -> Option<Endpoint> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let group = inner.groups.get_mut(&interface)?;
        restore_expired(group);
        scan_after(group, current, |e| !exhausted.contains(&e.key()))
    }

    pub fn get_enabled_by_type(&self, interface: InterfaceType) -> Vec<Endpoint> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(group) = inner.groups.get_mut(&interface) else {
            return Vec::new();
        };
        restore_expired(group);
        group
            .endpoints
            .iter()
            .filter(|e| e.enabled)
            .cloned()
            .collect()
    }

    pub fn all_endpoints(&self) -> Vec<Endpoint> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        let interfaces: Vec<InterfaceType> = inner.groups.keys().copied().collect();
        for interface in interfaces {
            if let Some(group) = inner.groups.get_mut(&interface) {
                restore_expired(group);
                out.extend(group.endpoints.iter().cloned());
            }
        }
        out
    }

    pub fn set_active(
        &self,
        interface: InterfaceType,
        key: &EndpointKey,
    ) -> Result<(), RouterError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let group = inner.groups.get_mut(&interface).ok_or(RouterError::NotFound)?;
        restore_expired(group);

        let found = group
            .endpoints
            .iter()
            .any(|e| &e.key() == key && e.enabled);
        if !found {
            return Err(RouterError::NotFound);
        }
        set_group_active(group, Some(key.clone()));
        Ok(())
    }

    /// Temporarily disable an endpoint, remembering its prior enabled state.
    ///
    /// Returns the restore deadline as unix milliseconds, or 0 when the
    /// endpoint is unknown. If the disabled endpoint was active, the next
    /// enabled peer (wrapping) is promoted.
    pub fn disable(&self, interface: InterfaceType, key: &EndpointKey) -> i64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = inner.ttl;
        let Some(group) = inner.groups.get_mut(&interface) else {
            return 0;
        };
        restore_expired(group);

        let Some(position) = group.endpoints.iter().position(|e| &e.key() == key) else {
            return 0;
        };

        let until = Instant::now() + ttl;
        let until_ms = (time::OffsetDateTime::now_utc() + ttl).unix_timestamp() * 1000;
        // Re-disabling refreshes the deadline but keeps the state remembered
        // from before the first disable.
        let prev_enabled = match group.disables.remove(key) {
            Some(existing) => existing.prev_enabled,
            None => group.endpoints[position].enabled,
        };
        group.endpoints[position].enabled = false;
        group
            .disables
            .insert(key.clone(), TempDisable { until, prev_enabled });

        if group.active.as_ref() == Some(key) {
            let promoted = scan_after(group, key, |_| true).map(|e| e.key());
            set_group_active(group, promoted);
        }
        until_ms
    }
}

impl Default for EndpointRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn restore_expired(group: &mut Group) {
    if group.disables.is_empty() {
        return;
    }
    let now = Instant::now();
    let due: Vec<EndpointKey> = group
        .disables
        .iter()
        .filter(|(_, entry)| entry.until <= now)
        .map(|(key, _)| key.clone())
        .collect();
    for key in due {
        if let Some(entry) = group.disables.remove(&key)
            && let Some(endpoint) = group.endpoints.iter_mut().find(|e| e.key() == key)
        {
            endpoint.enabled = entry.prev_enabled;
        }
    }
}

fn set_group_active(group: &mut Group, key: Option<EndpointKey>) {
    group.active = key.clone();
    for endpoint in group.endpoints.iter_mut() {
        endpoint.active = key.as_ref() == Some(&endpoint.key());
    }
}

fn scan_after(
    group: &Group,
    current: &EndpointKey,
    accept: impl Fn(&Endpoint) -> bool,
) -> Option<Endpoint> {
    let len = group.endpoints.len();
    if len == 0 {
        return None;
    }
    let start = group
        .endpoints
        .iter()
        .position(|e| &e.key() == current)
        .map(|p| p + 1)
        .unwrap_or(0);
    for offset in 0..len {
        let candidate = &group.endpoints[(start + offset) % len];
        if candidate.key() != *current && candidate.enabled && accept(candidate) {
            return Some(candidate.clone());
        }
    }
    None
}
