use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::interface::InterfaceType;

/// Client-model to upstream-model mapping entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMapping {
    pub name: String,
    #[serde(default)]
    pub alias: String,
}

/// One upstream endpoint as loaded from the config surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Stable id; 0 means synthetic / not yet persisted.
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    pub interface_type: InterfaceType,
    #[serde(default)]
    pub transformer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelMapping>,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub active: bool,
    /// Owning vendor, when the config groups endpoints under vendors.
    #[serde(default)]
    pub vendor_id: i64,
}

fn default_true() -> bool {
    true
}

impl Endpoint {
    /// Identity: id when persisted, otherwise name.
    pub fn key(&self) -> EndpointKey {
        if self.id != 0 {
            EndpointKey::Id(self.id)
        } else {
            EndpointKey::Name(self.name.clone())
        }
    }

    /// Map a client-supplied model through this endpoint's alias table.
    ///
    /// Returns the upstream name for a matching alias, passes known names
    /// through, and leaves unknown models untouched.
    pub fn map_model<'a>(&'a self, requested: &'a str) -> &'a str {
        for mapping in &self.models {
            if !mapping.alias.is_empty() && mapping.alias == requested {
                return &mapping.name;
            }
        }
        requested
    }

    /// Total order used inside a router group: priority ascending, ties by
    /// name.
    pub fn priority_cmp(&self, other: &Endpoint) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Endpoint identity usable as a map key across reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKey {
    Id(i64),
    Name(String),
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointKey::Id(id) => write!(f, "#{id}"),
            EndpointKey::Name(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str, priority: i32) -> Endpoint {
        Endpoint {
            id: 0,
            name: name.to_string(),
            api_url: "https://u.test".to_string(),
            api_key: String::new(),
            interface_type: InterfaceType::Claude,
            transformer: None,
            model: None,
            models: Vec::new(),
            proxy_url: None,
            headers: Vec::new(),
            priority,
            enabled: true,
            active: false,
            vendor_id: 0,
        }
    }

    #[test]
    fn key_prefers_id() {
        let mut e = endpoint("a", 1);
        assert_eq!(e.key(), EndpointKey::Name("a".to_string()));
        e.id = 7;
        assert_eq!(e.key(), EndpointKey::Id(7));
    }

    #[test]
    fn ordering_breaks_ties_by_name() {
        let a = endpoint("alpha", 2);
        let b = endpoint("beta", 1);
        let c = endpoint("aaa", 2);
        assert_eq!(a.priority_cmp(&b), Ordering::Greater);
        assert_eq!(a.priority_cmp(&c), Ordering::Greater);
        assert_eq!(c.priority_cmp(&a), Ordering::Less);
    }

    #[test]
    fn model_alias_maps_and_names_pass_through() {
        let mut e = endpoint("a", 1);
        e.models = vec![
            ModelMapping {
                name: "upstream-large".to_string(),
                alias: "claude-3".to_string(),
            },
            ModelMapping {
                name: "upstream-small".to_string(),
                alias: String::new(),
            },
        ];
        assert_eq!(e.map_model("claude-3"), "upstream-large");
        assert_eq!(e.map_model("upstream-small"), "upstream-small");
        assert_eq!(e.map_model("unknown"), "unknown");
    }
}
