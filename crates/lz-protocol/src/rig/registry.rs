use std::collections::BTreeMap;
use std::sync::Arc;

use super::icom::{IcomPlugin, KNOWN_ADDRESSES};
use super::kenwood::KenwoodPlugin;
use super::RigPlugin;
use crate::error::ProtocolError;

/// Rig plugins by name
///
/// Names are `"<manufacturer> <model>"` and are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn RigPlugin>>,
}

impl PluginRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every plugin shipped with this crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(KenwoodPlugin::new()));
        registry.register(Arc::new(IcomPlugin::new()));
        for (model, addr) in KNOWN_ADDRESSES {
            registry.register(Arc::new(IcomPlugin::with_address(*model, *addr)));
        }
        registry
    }

    fn key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Add a plugin, replacing any plugin of the same name
    pub fn register(&mut self, plugin: Arc<dyn RigPlugin>) -> Option<Arc<dyn RigPlugin>> {
        self.plugins.insert(Self::key(&plugin.name()), plugin)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn RigPlugin>, ProtocolError> {
        self.plugins
            .get(&Self::key(name))
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownPlugin(name.to_string()))
    }

    /// Display names of the registered plugins, sorted
    pub fn names(&self) -> Vec<String> {
        self.plugins.values().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let registry = PluginRegistry::builtin();
        let plugin = registry.get("kenwood all models").unwrap();
        assert_eq!(plugin.manufacturer(), "Kenwood");

        let plugin = registry.get("ICOM IC-7300").unwrap();
        assert_eq!(plugin.model(), "IC-7300");
    }

    #[test]
    fn test_builtin_icom_models() {
        let registry = PluginRegistry::builtin();
        let expected = [
            ("IC-703", 0x68),
            ("IC-706", 0x4E),
            ("IC-706MKIIG", 0x58),
            ("IC-718", 0x5E),
            ("IC-746", 0x56),
            ("IC-746Pro", 0x66),
            ("IC-756Pro", 0x5C),
            ("IC-756Pro-II", 0x64),
            ("IC-756Pro-III", 0x6E),
            ("IC-7000", 0x70),
            ("IC-7100", 0x88),
            ("IC-7200", 0x76),
            ("IC-7300", 0x94),
            ("IC-7600", 0x7A),
            ("IC-7700", 0x74),
            ("IC-7800", 0x6A),
            ("IC-9100", 0x7C),
        ];
        for (model, addr) in expected {
            let plugin = registry.get(&format!("Icom {}", model)).unwrap();
            assert_eq!(plugin.model(), model);
            assert_eq!(
                IcomPlugin::for_model(model).unwrap().civ_address(),
                addr,
                "{}",
                model
            );
        }
    }

    #[test]
    fn test_unknown_plugin() {
        let registry = PluginRegistry::builtin();
        assert_eq!(
            registry.get("Yaesu FT-857").unwrap_err(),
            ProtocolError::UnknownPlugin("Yaesu FT-857".into())
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = PluginRegistry::new();
        assert!(registry.is_empty());
        assert!(registry
            .register(Arc::new(IcomPlugin::with_address("Custom", 0x10)))
            .is_none());
        assert!(registry
            .register(Arc::new(IcomPlugin::with_address("custom", 0x20)))
            .is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["Icom custom".to_string()]);
    }
}
