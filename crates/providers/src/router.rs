//! Model router — maps model ids to a provider and its sampling defaults.
//!
//! A request naming an unknown (or no) model id falls back to the default.

use std::collections::BTreeMap;
use std::sync::Arc;
use shihui_core::message::Message;
use shihui_core::provider::{Provider, ProviderRequest};
use tracing::{info, warn};
use crate::openai_compat::OpenAiCompatProvider;

/// A resolved model: which provider to call and with what defaults.
#[derive(Clone)]
pub struct ModelRoute {
    pub id: String,
    pub display_name: String,
    pub provider: Arc<dyn Provider>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelRoute {
    /// Build a request carrying this route's model and limits.
    pub fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

impl std::fmt::Debug for ModelRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRoute")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Routes completion requests to the configured models.
pub struct ModelRouter {
    routes: BTreeMap<String, ModelRoute>,
    default_model: String,
}

impl ModelRouter {
    /// Create an empty router with a default model id.
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            routes: BTreeMap::new(),
            default_model: default_model.into(),
        }
    }

    /// Register a route under its id.
    pub fn register(&mut self, route: ModelRoute) {
        self.routes.insert(route.id.clone(), route);
    }

    /// Convenience for registering a single provider as the default model.
    pub fn single(id: &str, provider: Arc<dyn Provider>, model: &str) -> Self {
        let mut router = Self::new(id);
        router.register(ModelRoute {
            id: id.to_string(),
            display_name: id.to_string(),
            provider,
            model: model.to_string(),
            max_tokens: 4000,
            temperature: 0.7,
        });
        router
    }

    /// Resolve a model id, falling back to the default model.
    pub fn resolve(&self, model_id: Option<&str>) -> Option<&ModelRoute> {
        if let Some(id) = model_id {
            if let Some(route) = self.routes.get(id) {
                return Some(route);
            }
            warn!(model_id = %id, default = %self.default_model, "Unknown model id, using default");
        }
        self.routes.get(&self.default_model)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// All registered routes, ordered by id.
    pub fn list(&self) -> impl Iterator<Item = &ModelRoute> {
        self.routes.values()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Build routes from configuration.
///
/// Models that are disabled or have no API key are skipped.
pub fn build_from_config(config: &shihui_config::AppConfig) -> ModelRouter {
    let mut router = ModelRouter::new(&config.default_model);

    for (id, model) in &config.models {
        if !model.enabled {
            continue;
        }
        let Some(api_key) = model.api_key.as_deref().filter(|k| !k.is_empty()) else {
            warn!(model_id = %id, "No API key configured, skipping model");
            continue;
        };

        let provider: Arc<dyn Provider> =
            Arc::new(OpenAiCompatProvider::new(id, &model.api_base, api_key));
        router.register(ModelRoute {
            id: id.clone(),
            display_name: model.name.clone(),
            provider,
            model: model.model.clone(),
            max_tokens: model.max_tokens,
            temperature: model.temperature,
        });
        info!(model_id = %id, model = %model.model, "Registered model");
    }

    router
}
