//! Domain registry: the in-memory table of domains, commands, and events.
//!
//! The registry is pure data plus registration/lookup logic. It is shared
//! host-wide behind `Arc<tokio::sync::RwLock<_>>`: registration happens
//! rarely (startup or an explicit hot-load) under the write lock, while
//! every dispatch takes a short read lock.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::Handler;
use crate::error::{CoreError, Result};

/// Version of a domain.
///
/// A domain created implicitly by a command/event registration under an
/// unseen name is `Unversioned`; this is an explicit state, not a magic
/// null, though it still serializes as JSON `null` for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainVersion {
    Unversioned,
    Versioned { major: u32, minor: u32 },
}

#[derive(Serialize, Deserialize)]
struct VersionParts {
    major: u32,
    minor: u32,
}

impl Serialize for DomainVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match *self {
            DomainVersion::Unversioned => serializer.serialize_none(),
            DomainVersion::Versioned { major, minor } => {
                VersionParts { major, minor }.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for DomainVersion {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let parts = Option::<VersionParts>::deserialize(deserializer)?;
        Ok(parts.map_or(DomainVersion::Unversioned, |v| DomainVersion::Versioned {
            major: v.major,
            minor: v.minor,
        }))
    }
}

/// Documentation metadata for one parameter or return value.
///
/// Not enforced at the protocol layer; surfaced verbatim through
/// [`DomainRegistry::domain_descriptions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ArgSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A registered command. Immutable after registration.
#[derive(Clone)]
pub struct Command {
    pub handler: Handler,
    pub description: String,
    pub parameters: Vec<ArgSpec>,
    pub returns: Vec<ArgSpec>,
}

/// A registered broadcast event. Immutable after registration.
#[derive(Debug, Clone)]
pub struct Event {
    pub parameters: Vec<ArgSpec>,
}

struct Domain {
    version: DomainVersion,
    commands: HashMap<String, Command>,
    events: HashMap<String, Event>,
}

impl Domain {
    fn new(version: DomainVersion) -> Self {
        Self {
            version,
            commands: HashMap::new(),
            events: HashMap::new(),
        }
    }
}

/// Serializable snapshot of one command, for introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescription {
    pub description: String,
    #[serde(rename = "isAsync")]
    pub is_async: bool,
    pub parameters: Vec<ArgSpec>,
    pub returns: Vec<ArgSpec>,
}

/// Serializable snapshot of one event, for introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescription {
    pub parameters: Vec<ArgSpec>,
}

/// Serializable snapshot of one domain, for introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainDescription {
    pub version: DomainVersion,
    pub commands: BTreeMap<String, CommandDescription>,
    pub events: BTreeMap<String, EventDescription>,
}

/// The host-wide table of domains → commands/events.
///
/// Domains are never deleted at runtime. Every registered command belongs
/// to exactly one domain; command and event names are unique within their
/// domain.
#[derive(Default)]
pub struct DomainRegistry {
    domains: HashMap<String, Domain>,
    // Module identities (data pointers) whose init() has already run.
    pub(crate) initialized_modules: HashSet<usize>,
}

impl DomainRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a domain, creating it if absent.
    ///
    /// Registration is idempotent by name: re-registering an existing
    /// domain is a logged conflict and does not overwrite, but the call
    /// still succeeds. (Contrast with [`DomainRegistry::register_command`],
    /// which treats duplicates as fatal; the asymmetry is deliberate.)
    pub fn register_domain(&mut self, name: &str, version: DomainVersion) {
        if self.domains.contains_key(name) {
            warn!("domain already registered, keeping existing entry: {}", name);
            return;
        }
        debug!("registering domain: {}", name);
        self.domains.insert(name.to_string(), Domain::new(version));
    }

    /// Register a command under a domain, auto-creating an unversioned
    /// domain if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateCommand`] if `(domain, name)` already
    /// has a command. Duplicate command registration indicates a bug in the
    /// registering module and is fatal to that module's load.
    pub fn register_command(
        &mut self,
        domain: &str,
        name: &str,
        handler: Handler,
        description: impl Into<String>,
        parameters: Vec<ArgSpec>,
        returns: Vec<ArgSpec>,
    ) -> Result<()> {
        let entry = self
            .domains
            .entry(domain.to_string())
            .or_insert_with(|| Domain::new(DomainVersion::Unversioned));

        if entry.commands.contains_key(name) {
            return Err(CoreError::DuplicateCommand {
                domain: domain.to_string(),
                command: name.to_string(),
            });
        }

        debug!("registering command: {}.{}", domain, name);
        entry.commands.insert(
            name.to_string(),
            Command {
                handler,
                description: description.into(),
                parameters,
                returns,
            },
        );
        Ok(())
    }

    /// Register an event under a domain, auto-creating an unversioned
    /// domain if needed.
    ///
    /// Unlike commands, a duplicate event registration is a logged conflict
    /// only; the existing event is kept and the call succeeds. Downstream
    /// domains rely on this lenient path, so it stays asymmetric with
    /// [`DomainRegistry::register_command`].
    pub fn register_event(&mut self, domain: &str, name: &str, parameters: Vec<ArgSpec>) {
        let entry = self
            .domains
            .entry(domain.to_string())
            .or_insert_with(|| Domain::new(DomainVersion::Unversioned));

        if entry.events.contains_key(name) {
            warn!("event already registered, keeping existing entry: {}.{}", domain, name);
            return;
        }

        debug!("registering event: {}.{}", domain, name);
        entry.events.insert(name.to_string(), Event { parameters });
    }

    #[must_use]
    pub fn has_domain(&self, name: &str) -> bool {
        self.domains.contains_key(name)
    }

    /// Look up a command's handler. Returns an owned clone so the caller
    /// can release the registry lock before invoking it.
    #[must_use]
    pub fn command_handler(&self, domain: &str, command: &str) -> Option<Handler> {
        self.domains
            .get(domain)
            .and_then(|d| d.commands.get(command))
            .map(|c| c.handler.clone())
    }

    /// Deep-copied, serializable snapshot of the full registry.
    ///
    /// Used for client introspection (the HTTP `/api` body) and for telling
    /// clients which domains exist after a hot-load.
    #[must_use]
    pub fn domain_descriptions(&self) -> BTreeMap<String, DomainDescription> {
        self.domains
            .iter()
            .map(|(name, domain)| {
                let commands = domain
                    .commands
                    .iter()
                    .map(|(cmd_name, cmd)| {
                        (
                            cmd_name.clone(),
                            CommandDescription {
                                description: cmd.description.clone(),
                                is_async: cmd.handler.is_async(),
                                parameters: cmd.parameters.clone(),
                                returns: cmd.returns.clone(),
                            },
                        )
                    })
                    .collect();
                let events = domain
                    .events
                    .iter()
                    .map(|(ev_name, ev)| {
                        (
                            ev_name.clone(),
                            EventDescription {
                                parameters: ev.parameters.clone(),
                            },
                        )
                    })
                    .collect();
                (
                    name.clone(),
                    DomainDescription {
                        version: domain.version,
                        commands,
                        events,
                    },
                )
            })
            .collect()
    }
}
