//! Sessions and resolved configurations.
//!
//! A [`Session`] owns everything that outlives a single lookup: the
//! frozen scope snapshot, session options, the registered function table,
//! the plugin registry and the lazily resolved configuration with its
//! providers. Sessions are safe to share between threads; each thread
//! drives its own [`Invocation`].
//!
//! Plugin processes span the session. Call [`Session::shutdown`] (or let
//! the session drop) to terminate them.

mod invocation;

pub use invocation::CallOptions;
pub use invocation::Invocation;
pub(crate) use invocation::Mode;

use crate::config::Config;
use crate::error::LookupError;
use crate::explain::{Event, Explainer, NodeKind};
use crate::merge::MergeStrategy;
use crate::plugin::PluginRegistry;
use crate::provider::{
    create_provider, DataHashFunc, DataDigFunc, DataProvider, FunctionRegistry, LookupKeyFunc,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_types::{Key, Map, Scope, Value};
use tracing::warn;

/// Well-known session option keys.
pub mod options {
    /// Absolute path of the configuration file.
    pub const HIERA_CONFIG: &str = "hiera_config";
    /// Directory the configuration file name is resolved against.
    pub const HIERA_ROOT: &str = "hiera_root";
    /// Configuration file name, `hiera.yaml` unless overridden.
    pub const HIERA_CONFIG_FILENAME: &str = "hiera_config_filename";
    /// Serialization dialect; accepted for compatibility.
    pub const HIERA_DIALECT: &str = "hiera_dialect";
    /// Scope variables as a map value.
    pub const SCOPE: &str = "scope";
    /// Name of the registered-function table option.
    pub const HIERA_FUNCTIONS: &str = "hiera_functions";
}

const DEFAULT_CONFIG_FILENAME: &str = "hiera.yaml";

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    options: Map,
    scope: Map,
    functions: FunctionRegistry,
}

impl SessionBuilder {
    /// Sets a session option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Sets the configuration file path (`hiera_config`).
    #[must_use]
    pub fn with_config_path(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().display().to_string();
        self.with_option(options::HIERA_CONFIG, Value::from(path))
    }

    /// Sets the configuration root directory (`hiera_root`).
    #[must_use]
    pub fn with_config_root(self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().display().to_string();
        self.with_option(options::HIERA_ROOT, Value::from(root))
    }

    /// Sets the scope variables for the session.
    #[must_use]
    pub fn with_scope(mut self, vars: Map) -> Self {
        self.scope = vars;
        self
    }

    /// Registers a `data_hash` function under `name`.
    #[must_use]
    pub fn register_data_hash(mut self, name: impl Into<String>, f: DataHashFunc) -> Self {
        self.functions.register_data_hash(name, f);
        self
    }

    /// Registers a `data_dig` function under `name`.
    #[must_use]
    pub fn register_data_dig(mut self, name: impl Into<String>, f: DataDigFunc) -> Self {
        self.functions.register_data_dig(name, f);
        self
    }

    /// Registers a `lookup_key` function under `name`.
    #[must_use]
    pub fn register_lookup_key(mut self, name: impl Into<String>, f: LookupKeyFunc) -> Self {
        self.functions.register_lookup_key(name, f);
        self
    }

    /// Builds the session. The config path is taken from `hiera_config`,
    /// or assembled from `hiera_root` (default: the current directory) and
    /// `hiera_config_filename` (default: `hiera.yaml`).
    #[must_use]
    pub fn build(self) -> Session {
        let mut scope_vars = self.scope;
        if scope_vars.is_empty() {
            if let Some(Value::Map(m)) = self.options.get(options::SCOPE) {
                scope_vars = m.clone();
            }
        }

        let config_path = match self
            .options
            .get(options::HIERA_CONFIG)
            .and_then(Value::as_str)
        {
            Some(path) => PathBuf::from(path),
            None => {
                let root = match self.options.get(options::HIERA_ROOT).and_then(Value::as_str)
                {
                    Some(root) => PathBuf::from(root),
                    None => std::env::current_dir().unwrap_or_else(|e| {
                        warn!(error = %e, "Failed to get current directory, using '.'");
                        PathBuf::from(".")
                    }),
                };
                let file = self
                    .options
                    .get(options::HIERA_CONFIG_FILENAME)
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_CONFIG_FILENAME);
                root.join(file)
            }
        };

        Session {
            options: self.options,
            scope: Scope::new(scope_vars),
            config_path,
            functions: self.functions,
            plugins: PluginRegistry::new(),
            resolved: RwLock::new(None),
            cancelled: AtomicBool::new(false),
        }
    }
}

/// Long-lived lookup context: caches, scope snapshot, plugins.
pub struct Session {
    options: Map,
    scope: Scope,
    config_path: PathBuf,
    functions: FunctionRegistry,
    plugins: PluginRegistry,
    resolved: RwLock<Option<Arc<ResolvedConfig>>>,
    cancelled: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config_path", &self.config_path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Creates a per-call invocation. `extra_scope` is layered over the
    /// session scope; `explainer` attaches lookup tracing.
    #[must_use]
    pub fn invocation(
        &self,
        extra_scope: Option<Map>,
        explainer: Option<Explainer>,
    ) -> Invocation<'_> {
        Invocation::new(self, extra_scope, explainer)
    }

    #[must_use]
    pub fn options(&self) -> &Map {
        &self.options
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    #[must_use]
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Requests cancellation: subsequent lookups fail with
    /// [`LookupError::Cancelled`]. Cached results stay valid.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Terminates plugin processes. Also runs on drop; calling it twice
    /// is harmless.
    pub fn shutdown(&self) {
        self.plugins.shutdown();
    }

    /// The resolved configuration, built on first use.
    ///
    /// The build runs outside the lock: a recursive lookup during the
    /// `lookup_options` bootstrap re-enters here and is stopped by the
    /// invocation's name stack, not by a lock.
    pub(crate) fn resolved_config(
        &self,
        invocation: &mut Invocation<'_>,
    ) -> Result<Arc<ResolvedConfig>, LookupError> {
        if let Some(resolved) = self.resolved.read().clone() {
            return Ok(resolved);
        }
        let built = Arc::new(ResolvedConfig::build(self, invocation)?);
        let mut slot = self.resolved.write();
        if let Some(existing) = slot.clone() {
            return Ok(existing);
        }
        *slot = Some(Arc::clone(&built));
        Ok(built)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A configuration with its providers built and `lookup_options`
/// bootstrapped.
pub struct ResolvedConfig {
    config: Config,
    providers: Vec<Box<dyn DataProvider>>,
    default_providers: Vec<Box<dyn DataProvider>>,
    lookup_options: HashMap<String, Map>,
}

impl ResolvedConfig {
    fn build(session: &Session, invocation: &mut Invocation<'_>) -> Result<Self, LookupError> {
        let config = Config::load(session.config_path())?;

        let (providers, default_providers) = invocation.with_mode(Mode::Config, |inv| {
            let defaults = config.defaults().resolve(inv, None, config.root())?;
            let mut providers = Vec::with_capacity(config.hierarchy().len());
            for entry in config.hierarchy() {
                let resolved = entry.resolve(inv, Some(&defaults), config.root())?;
                providers.push(create_provider(resolved));
            }
            let mut default_providers = Vec::with_capacity(config.default_hierarchy().len());
            for entry in config.default_hierarchy() {
                let resolved = entry.resolve(inv, Some(&defaults), config.root())?;
                default_providers.push(create_provider(resolved));
            }
            Ok::<_, LookupError>((providers, default_providers))
        })?;

        let mut resolved = Self {
            config,
            providers,
            default_providers,
            lookup_options: HashMap::new(),
        };
        resolved.bootstrap_lookup_options(invocation)?;
        Ok(resolved)
    }

    /// Once per config resolve: a deep-merge lookup of the literal key
    /// `lookup_options`, with method interpolation and further
    /// lookup-options consultation disabled.
    fn bootstrap_lookup_options(
        &mut self,
        invocation: &mut Invocation<'_>,
    ) -> Result<(), LookupError> {
        let key = Key::parse("lookup_options")?;
        let strategy = MergeStrategy::deep();

        let value = invocation.with_mode(Mode::LookupOptions, |inv| {
            inv.explain(
                NodeKind::Lookup {
                    key: key.source().to_owned(),
                },
                |inv| {
                    inv.with_lookup(&key, |inv| {
                        inv.explain(
                            NodeKind::Merge {
                                strategy: strategy.name().to_owned(),
                            },
                            |inv| {
                                let value = strategy.lookup(&self.providers, inv, |p, inv| {
                                    p.unchecked_lookup(&key, inv, &strategy)
                                })?;
                                if let Some(v) = &value {
                                    inv.explain_accept(Event::Result, None, Some(v.clone()));
                                }
                                Ok(value)
                            },
                        )
                    })
                },
            )
        })?;

        if let Some(Value::Map(by_key)) = value {
            for (root, opts) in by_key {
                if let Value::Map(opts) = opts {
                    self.lookup_options.insert(root, opts);
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn providers(&self) -> &[Box<dyn DataProvider>] {
        &self.providers
    }

    #[must_use]
    pub fn default_providers(&self) -> &[Box<dyn DataProvider>] {
        &self.default_providers
    }

    /// The bootstrapped options for a key root, if any.
    #[must_use]
    pub fn lookup_options(&self, root: &str) -> Option<&Map> {
        self.lookup_options.get(root)
    }
}
