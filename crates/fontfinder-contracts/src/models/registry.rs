use indexmap::IndexMap;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim().trim_start_matches("models/"))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

// First entry is the default for its capability.
fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, capabilities: &[&str], context_window: Option<u64>| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: "gemini".to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                context_window,
            },
        );
    };

    insert(DEFAULT_MODEL, &["text", "vision", "json_schema"], Some(1_048_576));
    insert("gemini-2.5-pro", &["text", "vision", "json_schema"], Some(1_048_576));
    insert(
        "gemini-2.5-flash-lite",
        &["text", "vision", "json_schema"],
        Some(1_048_576),
    );
    insert("gemini-2.0-flash", &["text", "vision", "json_schema"], Some(1_048_576));
    insert("gemini-2.5-flash-image", &["image"], None);

    map
}

#[cfg(test)]
mod tests {
    use super::{ModelRegistry, DEFAULT_MODEL};

    #[test]
    fn default_registry_leads_with_default_vision_model() {
        let registry = ModelRegistry::new(None);
        let vision = registry.by_capability("vision");
        assert_eq!(vision.first().map(|m| m.name.as_str()), Some(DEFAULT_MODEL));
        assert!(vision.iter().all(|model| model.provider == "gemini"));
    }

    #[test]
    fn lookup_accepts_models_prefix() {
        let registry = ModelRegistry::new(None);
        assert!(registry.get("models/gemini-2.5-pro").is_some());
        assert!(registry.ensure("gemini-2.5-flash-image", "vision").is_none());
    }
}
