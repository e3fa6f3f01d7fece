use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModelCapabilities {
    pub max_duration_sec: u32,
    pub aspect_ratios: Vec<String>,
    pub resolutions: Vec<String>,
    pub supports_audio: bool,
    pub supports_image_input: bool,
    pub supports_negative_prompt: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RangeParameter<T> {
    pub min: T,
    pub max: T,
    pub default: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChoiceParameter {
    pub options: Vec<String>,
    pub default: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModelParameters {
    pub duration: RangeParameter<u32>,
    pub aspect_ratio: ChoiceParameter,
    pub quality: ChoiceParameter,
    pub guidance_scale: Option<RangeParameter<f64>>,
    pub inference_steps: Option<RangeParameter<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PricingTier {
    Economy,
    Standard,
    Premium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModelPricing {
    pub cost_per_second: Decimal,
    pub currency: String,
    pub tier: PricingTier,
}

/// A named generator with declared capability bounds (§3, §4.2). One
/// provider owns one or more models. Registry is process-wide, loaded at
/// startup; `is_available` may be flipped at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Model {
    pub id: String,
    pub provider: String,
    pub capabilities: ModelCapabilities,
    pub parameters: ModelParameters,
    pub pricing: ModelPricing,
    pub is_available: bool,
}

impl Model {
    /// §3 invariant (f): a parameter outside the declared range is a
    /// creation-time rejection. Returns the first violation found, if any.
    pub fn validate_parameters(&self, params: &crate::models::job::GenerationParameters) -> Option<String> {
        if let Some(duration) = params.duration
            && (duration < self.parameters.duration.min || duration > self.parameters.duration.max)
        {
            return Some(format!(
                "duration {duration} out of range [{}, {}] for model {}",
                self.parameters.duration.min, self.parameters.duration.max, self.id
            ));
        }
        if let Some(ar) = &params.aspect_ratio
            && !self.parameters.aspect_ratio.options.iter().any(|o| o == ar)
        {
            return Some(format!("aspect ratio {ar} not supported by model {}", self.id));
        }
        if let Some(q) = &params.quality
            && !self.parameters.quality.options.iter().any(|o| o == q)
        {
            return Some(format!("quality {q} not supported by model {}", self.id));
        }
        if params.negative_prompt.is_some() && !self.capabilities.supports_negative_prompt {
            return Some(format!("model {} does not support negative prompts", self.id));
        }
        if let Some(gs) = params.guidance_scale {
            match &self.parameters.guidance_scale {
                Some(range) if gs < range.min || gs > range.max => {
                    return Some(format!("guidance scale {gs} out of range for model {}", self.id));
                }
                None => return Some(format!("model {} does not support guidance scale", self.id)),
                _ => {}
            }
        }
        None
    }

    pub fn estimate_cost(&self, duration_seconds: u32) -> Decimal {
        self.pricing.cost_per_second * Decimal::from(duration_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::GenerationParameters;

    fn sample_model() -> Model {
        Model {
            id: "veo-3".into(),
            provider: "veo".into(),
            capabilities: ModelCapabilities {
                max_duration_sec: 60,
                aspect_ratios: vec!["16:9".into(), "9:16".into()],
                resolutions: vec!["1080p".into()],
                supports_audio: true,
                supports_image_input: false,
                supports_negative_prompt: true,
            },
            parameters: ModelParameters {
                duration: RangeParameter { min: 1, max: 60, default: 5 },
                aspect_ratio: ChoiceParameter { options: vec!["16:9".into(), "9:16".into()], default: "16:9".into() },
                quality: ChoiceParameter { options: vec!["standard".into(), "high".into()], default: "standard".into() },
                guidance_scale: None,
                inference_steps: None,
            },
            pricing: ModelPricing { cost_per_second: Decimal::new(10, 2), currency: "USD".into(), tier: PricingTier::Standard },
            is_available: true,
        }
    }

    #[test]
    fn duration_boundary_accepted_and_rejected() {
        let m = sample_model();
        let mut p = GenerationParameters { duration: Some(60), ..Default::default() };
        assert!(m.validate_parameters(&p).is_none());
        p.duration = Some(61);
        assert!(m.validate_parameters(&p).is_some());
        p.duration = Some(0);
        assert!(m.validate_parameters(&p).is_some());
    }

    #[test]
    fn unsupported_aspect_ratio_rejected() {
        let m = sample_model();
        let p = GenerationParameters { aspect_ratio: Some("1:1".into()), ..Default::default() };
        assert!(m.validate_parameters(&p).is_some());
    }

    #[test]
    fn cost_estimate_is_rate_times_duration() {
        let m = sample_model();
        assert_eq!(m.estimate_cost(10), Decimal::new(100, 2));
    }
}
