//! Model Registry (C2): a process-wide, read-mostly catalog of available
//! models, loaded once at startup (§4.2).

use arc_swap::ArcSwap;

use crate::error::{ReelflowError, Result};
use crate::models::catalog::Model;

/// Selection criteria for [`ModelRegistry::recommend`].
#[derive(Debug, Clone, Default)]
pub struct RecommendCriteria {
    pub max_duration: Option<u32>,
    pub needs_audio: Option<bool>,
    /// Requires the model to offer this quality option (§4.2, §3 catalog
    /// `parameters.quality.options`).
    pub quality: Option<String>,
    /// When set, models are sorted cheapest-first and the cheapest match
    /// wins; when unset, the highest-quality (most expensive) available
    /// match wins.
    pub budget: Option<rust_decimal::Decimal>,
}

/// Process-wide singleton over the model catalog. Reads are lock-free
/// (`ArcSwap::load`); `register`/`set_available` install a fresh snapshot
/// under a write path, per §5's "copy-on-write or a write lock" note.
pub struct ModelRegistry {
    models: ArcSwap<Vec<Model>>,
    default_id: String,
}

impl ModelRegistry {
    pub fn new(models: Vec<Model>, default_id: impl Into<String>) -> Self {
        Self { models: ArcSwap::from_pointee(models), default_id: default_id.into() }
    }

    pub fn all(&self) -> Vec<Model> {
        self.models.load().as_ref().clone()
    }

    pub fn by_provider(&self, provider: &str) -> Vec<Model> {
        self.models.load().iter().filter(|m| m.provider == provider).cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Model> {
        self.models.load().iter().find(|m| m.id == id).cloned()
    }

    pub fn is_available(&self, id: &str) -> bool {
        self.get(id).map(|m| m.is_available).unwrap_or(false)
    }

    /// The documented preferred model with a fallback chain: the configured
    /// default if still available, otherwise the first available model in
    /// catalog order. Fails hard if the registry is empty or nothing is
    /// available — an empty catalog is a deployment bug, not a runtime
    /// condition (§4.2).
    pub fn default_model(&self) -> Result<Model> {
        let models = self.models.load();
        if let Some(m) = models.iter().find(|m| m.id == self.default_id && m.is_available) {
            return Ok(m.clone());
        }
        models
            .iter()
            .find(|m| m.is_available)
            .cloned()
            .ok_or_else(|| ReelflowError::internal("model registry has no available models"))
    }

    /// Filters by criteria then sorts by cost: ascending when a budget is
    /// given (cheapest match wins), descending otherwise (best quality
    /// available wins) — §4.2.
    pub fn recommend(&self, criteria: &RecommendCriteria) -> Result<Model> {
        let models = self.models.load();
        let mut candidates: Vec<&Model> = models
            .iter()
            .filter(|m| m.is_available)
            .filter(|m| criteria.max_duration.is_none_or(|d| m.capabilities.max_duration_sec >= d))
            .filter(|m| criteria.needs_audio.is_none_or(|needs| !needs || m.capabilities.supports_audio))
            .filter(|m| match &criteria.quality {
                Some(q) => m.parameters.quality.options.iter().any(|o| o == q),
                None => true,
            })
            .collect();
        if candidates.is_empty() {
            return Err(ReelflowError::not_found("no model matches the given criteria"));
        }
        if criteria.budget.is_some() {
            candidates.sort_by_key(|m| m.pricing.cost_per_second);
        } else {
            candidates.sort_by_key(|m| std::cmp::Reverse(m.pricing.cost_per_second));
        }
        Ok(candidates[0].clone())
    }

    pub fn register(&self, model: Model) {
        let mut models = self.models.load().as_ref().clone();
        if let Some(existing) = models.iter_mut().find(|m| m.id == model.id) {
            *existing = model;
        } else {
            models.push(model);
        }
        self.models.store(std::sync::Arc::new(models));
    }

    pub fn set_available(&self, id: &str, available: bool) -> Result<()> {
        let mut models = self.models.load().as_ref().clone();
        let model = models.iter_mut().find(|m| m.id == id).ok_or_else(|| ReelflowError::not_found(format!("model {id} not found")))?;
        model.is_available = available;
        self.models.store(std::sync::Arc::new(models));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::catalog::{ChoiceParameter, ModelCapabilities, ModelParameters, ModelPricing, PricingTier, RangeParameter};

    fn model(id: &str, cost: i64, max_duration: u32) -> Model {
        Model {
            id: id.into(),
            provider: "veo".into(),
            capabilities: ModelCapabilities {
                max_duration_sec: max_duration,
                aspect_ratios: vec!["16:9".into()],
                resolutions: vec!["1080p".into()],
                supports_audio: false,
                supports_image_input: false,
                supports_negative_prompt: true,
            },
            parameters: ModelParameters {
                duration: RangeParameter { min: 1, max: max_duration, default: 5 },
                aspect_ratio: ChoiceParameter { options: vec!["16:9".into()], default: "16:9".into() },
                quality: ChoiceParameter { options: vec!["standard".into()], default: "standard".into() },
                guidance_scale: None,
                inference_steps: None,
            },
            pricing: ModelPricing { cost_per_second: Decimal::new(cost, 2), currency: "USD".into(), tier: PricingTier::Standard },
            is_available: true,
        }
    }

    #[test]
    fn default_model_falls_back_when_preferred_unavailable() {
        let registry = ModelRegistry::new(vec![model("a", 10, 30), model("b", 20, 60)], "a");
        registry.set_available("a", false).unwrap();
        assert_eq!(registry.default_model().unwrap().id, "b");
    }

    #[test]
    fn default_model_fails_hard_when_registry_empty() {
        let registry = ModelRegistry::new(vec![], "a");
        assert!(registry.default_model().is_err());
    }

    #[test]
    fn recommend_picks_cheapest_within_budget() {
        let registry = ModelRegistry::new(vec![model("cheap", 5, 30), model("pricey", 50, 60)], "cheap");
        let m = registry.recommend(&RecommendCriteria { budget: Some(Decimal::new(1, 0)), ..Default::default() }).unwrap();
        assert_eq!(m.id, "cheap");
    }

    #[test]
    fn recommend_filters_by_max_duration() {
        let registry = ModelRegistry::new(vec![model("short", 5, 10), model("long", 5, 60)], "short");
        let m = registry.recommend(&RecommendCriteria { max_duration: Some(30), ..Default::default() }).unwrap();
        assert_eq!(m.id, "long");
    }

    #[test]
    fn recommend_filters_by_quality_option() {
        let mut premium = model("premium", 20, 30);
        premium.parameters.quality = ChoiceParameter { options: vec!["standard".into(), "premium".into()], default: "standard".into() };
        let registry = ModelRegistry::new(vec![model("basic", 5, 30), premium], "basic");
        let m = registry.recommend(&RecommendCriteria { quality: Some("premium".into()), ..Default::default() }).unwrap();
        assert_eq!(m.id, "premium");
        assert!(registry.recommend(&RecommendCriteria { quality: Some("cinematic".into()), ..Default::default() }).is_err());
    }
}
