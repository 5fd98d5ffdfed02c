//! Operation and variable registry.
//!
//! Modules contribute handlers through [`OperationSource`]s; a single discovery
//! pass folds them into a [`RegistryBuilder`] and freezes the result into an
//! [`OperationRegistry`] that is read-only for the rest of the process.

mod coerce;
mod params;

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use bevy::prelude::World;

use crate::error::{DiscoveryError, InvocationError, RegistrationError};
use crate::logging::{LogLevel, ServerLog};
use crate::response::ResponseHandle;

pub use coerce::{coerce_args, coerce_value};
pub use params::{
    ArgValue, Args, Autocomplete, AutocompleteFn, ParamDescriptor, ParamSpec, ParamType,
};

pub const DEFAULT_CATEGORY: &str = "Miscellaneous";

pub type OperationFn =
    dyn Fn(&mut World, &mut ResponseHandle, &Args) -> Result<(), InvocationError> + Send + Sync;

pub type VariableFn = dyn Fn() -> String + Send + Sync;

/// Display metadata and parameters for an operation being registered.
#[derive(Clone)]
pub struct OperationMeta {
    pub path: String,
    pub category: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl OperationMeta {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            category: DEFAULT_CATEGORY.to_string(),
            description: String::new(),
            params: Vec::new(),
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }
}

pub struct OperationDescriptor {
    pub path: String,
    pub category: String,
    pub description: String,
    pub params: Vec<ParamDescriptor>,
    pub handler: Arc<OperationFn>,
}

pub struct VariableDescriptor {
    pub name: String,
    pub accessor: Arc<VariableFn>,
}

impl VariableDescriptor {
    /// Reads the current value. A panicking accessor reads as `None`.
    pub fn read(&self) -> Option<String> {
        panic::catch_unwind(AssertUnwindSafe(|| (self.accessor)())).ok()
    }
}

/// Collapses any leading separators into exactly one.
pub fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim().trim_start_matches('/'))
}

/// Returns `key`, or `key_2`, `key_3`, ... whichever is free first.
pub fn unique_key(taken: impl Fn(&str) -> bool, key: &str) -> String {
    if !taken(key) {
        return key.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{key}_{counter}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    operations: Vec<Arc<OperationDescriptor>>,
    paths: HashMap<String, usize>,
    variables: Vec<Arc<VariableDescriptor>>,
    variable_names: HashMap<String, usize>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation and returns the path it ended up under.
    ///
    /// A path already in use is suffixed instead of overwritten. Parameter
    /// types and defaults are validated here so a bad declaration never
    /// reaches request handling.
    pub fn register<F>(&mut self, meta: OperationMeta, handler: F) -> Result<String, RegistrationError>
    where
        F: Fn(&mut World, &mut ResponseHandle, &Args) -> Result<(), InvocationError>
            + Send
            + Sync
            + 'static,
    {
        let normalized = normalize_path(&meta.path);
        if normalized == "/" {
            return Err(RegistrationError::EmptyPath);
        }
        let params = validate_params(&normalized, meta.params)?;
        let path = unique_key(|k| self.paths.contains_key(k), &normalized);

        self.paths.insert(path.clone(), self.operations.len());
        self.operations.push(Arc::new(OperationDescriptor {
            path: path.clone(),
            category: meta.category,
            description: meta.description,
            params,
            handler: Arc::new(handler),
        }));
        Ok(path)
    }

    /// Registers a variable accessor and returns the name it ended up under.
    pub fn register_variable<F>(&mut self, name: impl Into<String>, accessor: F) -> String
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        let name = unique_key(|k| self.variable_names.contains_key(k), &name.into());
        self.variable_names
            .insert(name.clone(), self.variables.len());
        self.variables.push(Arc::new(VariableDescriptor {
            name: name.clone(),
            accessor: Arc::new(accessor),
        }));
        name
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn build(self) -> OperationRegistry {
        OperationRegistry {
            operations: self.operations,
            paths: self.paths,
            variables: self.variables,
            variable_names: self.variable_names,
        }
    }
}

fn validate_params(
    path: &str,
    specs: Vec<ParamSpec>,
) -> Result<Vec<ParamDescriptor>, RegistrationError> {
    let mut seen = HashSet::new();
    let mut params = Vec::with_capacity(specs.len());
    for spec in specs {
        if !seen.insert(spec.name.clone()) {
            return Err(RegistrationError::DuplicateParameter {
                path: path.to_string(),
                parameter: spec.name,
            });
        }
        let ty: ParamType =
            spec.type_name
                .parse()
                .map_err(|()| RegistrationError::UnsupportedType {
                    path: path.to_string(),
                    parameter: spec.name.clone(),
                    type_name: spec.type_name.clone(),
                })?;
        let default = spec
            .default
            .as_deref()
            .map(|raw| coerce_value(&spec.name, raw, ty))
            .transpose()
            .map_err(|source| RegistrationError::InvalidDefault {
                path: path.to_string(),
                parameter: spec.name.clone(),
                source,
            })?;
        params.push(ParamDescriptor {
            name: spec.name,
            ty,
            default,
            autocomplete: spec.autocomplete,
        });
    }
    Ok(params)
}

/// Frozen registry. Safe to read from any thread without locking.
#[derive(Default)]
pub struct OperationRegistry {
    operations: Vec<Arc<OperationDescriptor>>,
    paths: HashMap<String, usize>,
    variables: Vec<Arc<VariableDescriptor>>,
    variable_names: HashMap<String, usize>,
}

impl OperationRegistry {
    pub fn resolve(&self, path: &str) -> Option<&Arc<OperationDescriptor>> {
        self.paths.get(path).map(|&i| &self.operations[i])
    }

    /// Operations in registration order.
    pub fn list_all(&self) -> &[Arc<OperationDescriptor>] {
        &self.operations
    }

    pub fn resolve_variable(&self, name: &str) -> Option<&Arc<VariableDescriptor>> {
        self.variable_names.get(name).map(|&i| &self.variables[i])
    }

    pub fn variables(&self) -> &[Arc<VariableDescriptor>] {
        &self.variables
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.variables.is_empty()
    }
}

/// Anything that can contribute operations and variables to the registry.
pub trait OperationSource: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn contribute(&self, registry: &mut RegistryBuilder) -> Result<(), DiscoveryError>;
}

/// Adapts a closure into an [`OperationSource`].
pub struct SourceFn<F> {
    name: String,
    contribute: F,
}

impl<F> SourceFn<F>
where
    F: Fn(&mut RegistryBuilder) -> Result<(), DiscoveryError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, contribute: F) -> Self {
        Self {
            name: name.into(),
            contribute,
        }
    }
}

impl<F> OperationSource for SourceFn<F>
where
    F: Fn(&mut RegistryBuilder) -> Result<(), DiscoveryError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn contribute(&self, registry: &mut RegistryBuilder) -> Result<(), DiscoveryError> {
        (self.contribute)(registry)
    }
}

/// Runs every source into one registry. A failing or panicking source is
/// logged and skipped; whatever it registered before failing is kept.
pub fn discover(sources: &[Box<dyn OperationSource>], log: &ServerLog) -> OperationRegistry {
    let mut builder = RegistryBuilder::new();
    for source in sources {
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| source.contribute(&mut builder)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log.warn(format!("Skipping source '{}': {err}", source.name())),
            Err(_) => log.warn(format!(
                "Skipping source '{}': panicked during discovery",
                source.name()
            )),
        }
    }
    let registry = builder.build();
    if registry.list_all().is_empty() {
        log.log_message("No command handlers found.", LogLevel::Normal);
    } else {
        log.log_message(
            format!(
                "Discovered {} command handlers and {} game variables.",
                registry.list_all().len(),
                registry.variables().len()
            ),
            LogLevel::Normal,
        );
    }
    registry
}

/// Write-once slot the discovery thread publishes the registry into.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    slot: Arc<OnceLock<Arc<OperationRegistry>>>,
}

impl SharedRegistry {
    pub fn ready(registry: OperationRegistry) -> Self {
        let shared = Self::default();
        shared.publish(registry);
        shared
    }

    /// Returns false if a registry was already published.
    pub fn publish(&self, registry: OperationRegistry) -> bool {
        self.slot.set(Arc::new(registry)).is_ok()
    }

    pub fn get(&self) -> Option<Arc<OperationRegistry>> {
        self.slot.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }
}
