//! Capability tables: name → factory for providers, plugins and outputs.
//!
//! Tables are plain values built once at startup and passed by reference into
//! agent assembly. Each entry carries display metadata for the listing
//! commands and a factory closure that builds an instance from a
//! [`ComponentConfig`].

use std::sync::Arc;

use crate::config::ComponentConfig;
use crate::error::ConfigurationError;
use crate::output::OutputSink;
use crate::plugins::Plugin;
use crate::providers::Provider;

/// Factory closure stored in a [`Registry`].
pub type Factory<T> =
    Box<dyn Fn(&str, &ComponentConfig) -> Result<Arc<T>, ConfigurationError> + Send + Sync>;

/// Display metadata for one registered component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Canonical name used in config (e.g. `"openai"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Alternative names accepted in config
    pub aliases: &'static [&'static str],
    /// One-line summary shown by the listing commands
    pub description: &'static str,
}

struct Entry<T: ?Sized> {
    info: ComponentInfo,
    factory: Factory<T>,
}

/// Name → factory table for one capability family.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: Vec<Entry<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Empty table; `kind` names the family in error messages.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Add an entry, replacing any entry with the same canonical name.
    pub fn register<F>(&mut self, info: ComponentInfo, factory: F)
    where
        F: Fn(&str, &ComponentConfig) -> Result<Arc<T>, ConfigurationError> + Send + Sync + 'static,
    {
        self.entries.retain(|entry| entry.info.name != info.name);
        self.entries.push(Entry {
            info,
            factory: Box::new(factory),
        });
    }

    fn find(&self, name: &str) -> Option<&Entry<T>> {
        let name = name.trim();
        self.entries.iter().find(|entry| {
            entry.info.name.eq_ignore_ascii_case(name)
                || entry
                    .info
                    .aliases
                    .iter()
                    .any(|alias| alias.eq_ignore_ascii_case(name))
        })
    }

    /// Metadata for a canonical name or alias.
    pub fn info(&self, name: &str) -> Option<&ComponentInfo> {
        self.find(name).map(|entry| &entry.info)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Build the component registered under `name` (canonical or alias).
    ///
    /// The factory receives the name as written by the caller, so an alias
    /// stays visible in the component's errors.
    pub fn create(
        &self,
        name: &str,
        config: &ComponentConfig,
    ) -> Result<Arc<T>, ConfigurationError> {
        let entry = self.find(name).ok_or_else(|| {
            ConfigurationError::new(format!(
                "unknown {} `{}`; available: {}",
                self.kind,
                name,
                self.names().join(", ")
            ))
        })?;
        tracing::debug!(kind = self.kind, name, canonical = entry.info.name, "Creating component");
        (entry.factory)(name.trim(), config)
    }

    /// Entries in registration order.
    pub fn infos(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.entries.iter().map(|entry| &entry.info)
    }

    /// Canonical names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.info.name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three capability tables used to assemble an agent.
pub struct Registries {
    pub providers: Registry<dyn Provider>,
    pub plugins: Registry<dyn Plugin>,
    pub outputs: Registry<dyn OutputSink>,
}

impl Registries {
    /// Tables holding every compiled-in component.
    pub fn builtin() -> Self {
        Self {
            providers: crate::providers::builtin_registry(),
            plugins: crate::plugins::builtin_registry(),
            outputs: crate::output::builtin_registry(),
        }
    }

    /// Empty tables, for callers that register their own components.
    pub fn empty() -> Self {
        Self {
            providers: Registry::new("provider"),
            plugins: Registry::new("plugin"),
            outputs: Registry::new("output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    trait Named: Send + Sync {
        fn label(&self) -> String;
    }

    struct Fixed(String);

    impl Named for Fixed {
        fn label(&self) -> String {
            self.0.clone()
        }
    }

    fn info(name: &'static str, aliases: &'static [&'static str]) -> ComponentInfo {
        ComponentInfo {
            name,
            display_name: name,
            aliases,
            description: "",
        }
    }

    fn table() -> Registry<dyn Named> {
        let mut registry: Registry<dyn Named> = Registry::new("widget");
        registry.register(info("alpha", &["a"]), |name, _| {
            Ok(Arc::new(Fixed(format!("alpha via {name}"))) as Arc<dyn Named>)
        });
        registry.register(info("beta", &[]), |_, config| {
            let label = config.require_str("beta", "label")?;
            Ok(Arc::new(Fixed(label.to_string())) as Arc<dyn Named>)
        });
        registry
    }

    #[test]
    fn create_by_name_and_alias() {
        let registry = table();
        let cfg = ComponentConfig::new();
        assert_eq!(registry.create("alpha", &cfg).unwrap().label(), "alpha via alpha");
        assert_eq!(registry.create("A", &cfg).unwrap().label(), "alpha via A");
    }

    #[test]
    fn factory_errors_propagate() {
        let registry = table();
        assert!(registry.create("beta", &ComponentConfig::new()).is_err());
        let cfg = ComponentConfig::new().with("label", "ok");
        assert_eq!(registry.create("beta", &cfg).unwrap().label(), "ok");
    }

    #[test]
    fn unknown_name_lists_available() {
        let err = table().create("gamma", &ComponentConfig::new()).err().unwrap();
        assert!(err.message.contains("unknown widget `gamma`"));
        assert!(err.message.contains("alpha, beta"));
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = table();
        registry.register(info("alpha", &[]), |_, _| {
            Ok(Arc::new(Fixed("new".into())) as Arc<dyn Named>)
        });
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.create("alpha", &ComponentConfig::new()).unwrap().label(), "new");
        assert!(!registry.contains("a"));
    }

    #[test]
    fn builtin_tables_have_unique_names_and_aliases() {
        let registries = Registries::builtin();
        let tables: Vec<Vec<&ComponentInfo>> = vec![
            registries.providers.infos().collect(),
            registries.plugins.infos().collect(),
            registries.outputs.infos().collect(),
        ];
        for infos in tables {
            assert!(!infos.is_empty());
            let mut seen = HashSet::new();
            for info in infos {
                assert!(seen.insert(info.name), "duplicate name {}", info.name);
                for alias in info.aliases {
                    assert_ne!(*alias, info.name);
                    assert!(seen.insert(alias), "duplicate alias {alias}");
                }
            }
        }
    }

    #[test]
    fn empty_tables_are_empty() {
        let registries = Registries::empty();
        assert!(registries.providers.is_empty());
        assert!(registries.plugins.is_empty());
        assert!(registries.outputs.is_empty());
    }
}
