//! Domain module loading.
//!
//! Extension modules register their commands and events through a
//! [`DomainModule::init`] entry point. The host controls which module a
//! path resolves to via a [`ModuleResolver`]; the registry only ever sees
//! resolved modules, so the loading policy (static table, reflection,
//! dynamic libraries) stays a host concern.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::registry::DomainRegistry;

/// An extension module that can register domains, commands, and events.
pub trait DomainModule: Send + Sync {
    /// Register this module's surface. Called at most once per module
    /// identity, regardless of how many paths resolve to it.
    ///
    /// # Errors
    ///
    /// Any error aborts the load batch this module is part of.
    fn init(&self, registry: &mut DomainRegistry) -> Result<()>;
}

/// What a module path resolves to.
#[derive(Clone)]
pub enum ResolvedModule {
    /// A module exposing an `init` entry point.
    Domain(Arc<dyn DomainModule>),
    /// Something resolvable that exposes no `init` entry point; loading it
    /// is a fatal [`CoreError::MissingInit`].
    Opaque,
}

/// Maps module paths to modules. Implementations decide what a "path"
/// means; the registry only requires that the mapping is stable.
pub trait ModuleResolver: Send + Sync {
    /// Resolve one path.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ModuleNotFound`] for unknown paths.
    fn resolve(&self, path: &str) -> Result<ResolvedModule>;
}

/// A host-controlled path → module table.
///
/// Paths are lexically normalized before lookup so that two spellings of
/// the same path (`./ext/foo`, `ext//foo`) resolve to the same entry.
#[derive(Default)]
pub struct StaticModuleResolver {
    entries: HashMap<String, ResolvedModule>,
}

impl StaticModuleResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, module: Arc<dyn DomainModule>) {
        self.entries
            .insert(normalize_path(path), ResolvedModule::Domain(module));
    }

    /// Register a path that resolves but has no `init` entry point.
    pub fn insert_opaque(&mut self, path: &str) {
        self.entries
            .insert(normalize_path(path), ResolvedModule::Opaque);
    }
}

impl ModuleResolver for StaticModuleResolver {
    fn resolve(&self, path: &str) -> Result<ResolvedModule> {
        self.entries
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| CoreError::ModuleNotFound(path.to_string()))
    }
}

/// Lexical path normalization: collapses `//` and `.` segments and folds
/// `..` where possible, without touching the filesystem.
fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

impl DomainRegistry {
    /// Load domain modules by path, sequentially.
    ///
    /// Each resolved module's `init` runs at most once, deduplicated by
    /// module identity rather than by path string. The first failure aborts
    /// the whole batch (paths after it are not attempted); a resolve or
    /// missing-init failure leaves the registry unchanged for that module.
    ///
    /// # Errors
    ///
    /// Propagates resolver failures, [`CoreError::MissingInit`], and
    /// wrapped `init` failures.
    pub fn load_modules_from_paths(
        &mut self,
        paths: &[String],
        resolver: &dyn ModuleResolver,
    ) -> Result<bool> {
        for path in paths {
            match resolver.resolve(path)? {
                ResolvedModule::Opaque => {
                    return Err(CoreError::MissingInit(path.clone()));
                }
                ResolvedModule::Domain(module) => {
                    // Identity is the Arc's data pointer: two paths that
                    // resolve to the same module share one init call.
                    let identity = Arc::as_ptr(&module).cast::<()>() as usize;
                    if !self.initialized_modules.insert(identity) {
                        debug!("module already initialized, skipping: {}", path);
                        continue;
                    }
                    info!("initializing domain module: {}", path);
                    module.init(self).map_err(|err| CoreError::ModuleInit {
                        path: path.clone(),
                        source: Box::new(err),
                    })?;
                }
            }
        }
        Ok(true)
    }
}
