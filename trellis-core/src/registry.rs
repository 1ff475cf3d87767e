//! Per-module endpoint registry
//!
//! Each module keeps its endpoints in definition order, keyed by
//! [`UniqueKey`], together with a dispatcher compiled from them.
//! Updates to one module are serialized by that module's lock, so its
//! dispatcher is always built from a complete snapshot. Modules are
//! independent of each other.

use crate::callbacks::{Raise, Respond};
use crate::core_fn::CoreFn;
use crate::definition::{EndpointDescriptor, ParamType};
use crate::dispatcher::Dispatcher;
use crate::error::EndpointError;
use crate::handler::Handler;
use crate::http::{Method, Request};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use trellis_config::Settings;

static GLOBAL: Lazy<EndpointRegistry> = Lazy::new(|| EndpointRegistry::from_settings(Settings::global()));

/// Identity of an endpoint within a module.
///
/// Patterns are compared as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueKey {
    pub method: Method,
    pub path: String,
    pub regexes: BTreeMap<String, String>,
}

impl UniqueKey {
    pub fn of(descriptor: &EndpointDescriptor) -> Self {
        Self {
            method: descriptor.method,
            path: descriptor.route.path().to_string(),
            regexes: descriptor.route.regexes().clone(),
        }
    }
}

/// Everything registered for one endpoint.
#[derive(Clone)]
pub struct EndpointInfo {
    pub core_fn: CoreFn,
    pub handler: Handler,
    pub descriptor: Arc<EndpointDescriptor>,
}

impl std::fmt::Debug for EndpointInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointInfo")
            .field("core_fn", &self.core_fn)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered map of endpoints.
///
/// Overwriting a key keeps its position.
#[derive(Debug, Clone, Default)]
pub struct OrderedEndpoints {
    entries: Vec<(UniqueKey, EndpointInfo)>,
    index: HashMap<UniqueKey, usize>,
}

impl OrderedEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite in place; returns the replaced info.
    pub fn insert(&mut self, key: UniqueKey, info: EndpointInfo) -> Option<EndpointInfo> {
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, info)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, info));
                None
            }
        }
    }

    pub fn get(&self, key: &UniqueKey) -> Option<&EndpointInfo> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UniqueKey, &EndpointInfo)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &UniqueKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Entries matching `keep`, order preserved
    pub fn filter<F>(&self, keep: F) -> Self
    where
        F: Fn(&UniqueKey) -> bool,
    {
        let mut out = Self::new();
        for (key, info) in self.iter().filter(|(key, _)| keep(key)) {
            out.insert(key.clone(), info.clone());
        }
        out
    }
}

#[derive(Default)]
struct ModuleEndpoints {
    endpoints: Mutex<OrderedEndpoints>,
    dispatcher: RwLock<Arc<Dispatcher>>,
}

/// Serializable documentation for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointDoc {
    pub method: Method,
    pub path: String,
    pub regexes: BTreeMap<String, String>,
    pub docstring: Option<String>,
    #[serde(rename = "async")]
    pub is_async: bool,
    pub params: BTreeMap<ParamType, Value>,
    pub response: Option<Value>,
    pub metadata: Map<String, Value>,
}

/// Registry of endpoints for every module.
pub struct EndpointRegistry {
    modules: DashMap<String, Arc<ModuleEndpoints>>,
    bulk: AtomicBool,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
            bulk: AtomicBool::new(false),
        }
    }

    /// Starts in bulk mode when `bulk_compile` is set.
    pub fn from_settings(settings: &Settings) -> Self {
        let registry = Self::new();
        registry.bulk.store(settings.bulk_compile, Ordering::Release);
        registry
    }

    /// Process-wide registry
    pub fn global() -> &'static EndpointRegistry {
        &GLOBAL
    }

    fn module(&self, module: &str) -> Arc<ModuleEndpoints> {
        if let Some(existing) = self.modules.get(module) {
            return Arc::clone(&existing);
        }
        Arc::clone(&self.modules.entry(module.to_string()).or_default())
    }

    /// Insert or overwrite an endpoint and rebuild the module's dispatcher.
    ///
    /// In bulk mode the rebuild waits for [`finish_bulk`](Self::finish_bulk).
    pub fn update_endpoint(&self, module: &str, key: UniqueKey, info: EndpointInfo) {
        let entry = self.module(module);
        let mut endpoints = entry.endpoints.lock();
        let replaced = endpoints.insert(key.clone(), info).is_some();
        debug!(
            module,
            method = %key.method,
            path = %key.path,
            replaced,
            "registered endpoint"
        );
        if !self.is_bulk() {
            *entry.dispatcher.write() = Arc::new(Dispatcher::compile(&endpoints));
        }
    }

    /// Endpoints of a module, optionally narrowed by method and path.
    pub fn list_endpoints(
        &self,
        module: &str,
        method: Option<Method>,
        path: Option<&str>,
    ) -> OrderedEndpoints {
        let Some(entry) = self.modules.get(module).map(|e| Arc::clone(&e)) else {
            return OrderedEndpoints::new();
        };
        let endpoints = entry.endpoints.lock();
        endpoints.filter(|key| {
            method.is_none_or(|m| key.method == m) && path.is_none_or(|p| key.path == p)
        })
    }

    /// First endpoint registered for `method` and `path`.
    pub fn get_info(&self, module: &str, method: Method, path: &str) -> Option<EndpointInfo> {
        let entry = self.modules.get(module).map(|e| Arc::clone(&e))?;
        let endpoints = entry.endpoints.lock();
        endpoints
            .iter()
            .find(|(key, _)| key.method == method && key.path == path)
            .map(|(_, info)| info.clone())
    }

    pub fn get_core_fn(&self, module: &str, method: Method, path: &str) -> Option<CoreFn> {
        self.get_info(module, method, path).map(|info| info.core_fn)
    }

    /// Remove every endpoint of a module.
    pub fn reset(&self, module: &str) {
        if let Some(entry) = self.modules.get(module).map(|e| Arc::clone(&e)) {
            let mut endpoints = entry.endpoints.lock();
            endpoints.clear();
            *entry.dispatcher.write() = Arc::new(Dispatcher::empty());
            debug!(module, "reset endpoints");
        }
    }

    /// Current dispatcher of a module.
    pub fn dispatcher(&self, module: &str) -> Arc<Dispatcher> {
        self.modules
            .get(module)
            .map(|entry| Arc::clone(&entry.dispatcher.read()))
            .unwrap_or_else(|| Arc::new(Dispatcher::empty()))
    }

    pub fn dispatch(
        &self,
        module: &str,
        request: Request,
        respond: Respond,
        raise: Raise,
    ) -> Result<(), EndpointError> {
        self.dispatcher(module).dispatch(request, respond, raise)
    }

    pub fn is_bulk(&self) -> bool {
        self.bulk.load(Ordering::Acquire)
    }

    /// Defer dispatcher rebuilds until [`finish_bulk`](Self::finish_bulk).
    pub fn begin_bulk(&self) {
        self.bulk.store(true, Ordering::Release);
    }

    pub fn finish_bulk(&self) {
        self.bulk.store(false, Ordering::Release);
        self.rebuild_dispatchers();
    }

    /// Rebuild every module's dispatcher from its endpoints.
    pub fn rebuild_dispatchers(&self) {
        let entries: Vec<(String, Arc<ModuleEndpoints>)> = self
            .modules
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (module, entry) in entries {
            let endpoints = entry.endpoints.lock();
            let dispatcher = Dispatcher::compile(&endpoints);
            debug!(module = %module, routes = dispatcher.len(), "rebuilt dispatcher");
            *entry.dispatcher.write() = Arc::new(dispatcher);
        }
    }

    /// Module ids, sorted
    pub fn modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        modules.sort();
        modules
    }

    /// Documentation for every endpoint of a module, in order.
    pub fn describe(&self, module: &str) -> Vec<EndpointDoc> {
        self.list_endpoints(module, None, None)
            .iter()
            .map(|(key, info)| {
                let descriptor = &info.descriptor;
                let params = descriptor
                    .params
                    .iter()
                    .map(|(param_type, spec)| {
                        let schema = spec
                            .schema
                            .as_ref()
                            .map(|s| json!(s.as_ref()))
                            .unwrap_or(Value::Null);
                        (*param_type, json!({"binding": spec.binding, "schema": schema}))
                    })
                    .collect();
                EndpointDoc {
                    method: key.method,
                    path: key.path.clone(),
                    regexes: key.regexes.clone(),
                    docstring: descriptor.docstring.clone(),
                    is_async: descriptor.is_async(),
                    params,
                    response: descriptor.response_schema.as_ref().map(|s| json!(s.as_ref())),
                    metadata: descriptor.metadata.clone(),
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("modules", &self.modules())
            .field("bulk", &self.is_bulk())
            .finish()
    }
}
