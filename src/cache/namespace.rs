// Namespace naming: (role, generation) <-> canonical cache name
// Author: kelexine (https://github.com/kelexine)

use serde::Serialize;
use std::fmt;

/// What a namespace holds. All roles share one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Resources preloaded at install time.
    Static,
    /// Runtime cache for generic requests.
    Dynamic,
    /// Runtime cache for the API endpoint.
    DynamicApi,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Static, Role::Dynamic, Role::DynamicApi];

    fn prefix(&self) -> &'static str {
        match self {
            Role::Static => "simple-cache",
            Role::Dynamic => "dynamic-cache",
            Role::DynamicApi => "dynamic-cache-api",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Static => "static",
            Role::Dynamic => "dynamic",
            Role::DynamicApi => "dynamic_api",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub role: Role,
    pub generation: u64,
}

impl Namespace {
    pub fn new(role: Role, generation: u64) -> Self {
        Self { role, generation }
    }

    /// Canonical store name, e.g. `dynamic-cache-api-v30`.
    pub fn name(&self) -> String {
        format!("{}-v{}", self.role.prefix(), self.generation)
    }

    /// Inverse of [`Namespace::name`]. Foreign names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let (prefix, generation) = name.rsplit_once("-v")?;
        if generation.is_empty() || !generation.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let generation = generation.parse().ok()?;
        let role = Role::ALL.into_iter().find(|r| r.prefix() == prefix)?;
        Some(Self { role, generation })
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
