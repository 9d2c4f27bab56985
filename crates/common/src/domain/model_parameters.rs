use crate::domain::result::{DomainError, DomainResult};
use crate::garde::validate_struct;
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Parameters forwarded to the downstream text-generation model.
///
/// Validated once when configuration is loaded. Keys this worker does not
/// know about are preserved in `extra` and forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ModelParameters {
    /// Sampling temperature; lower values favour higher-probability tokens
    #[garde(range(min = 0.0, max = 1.0))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Nucleus sampling cut-off on cumulative probability
    #[garde(range(min = 0.0, max = 1.0))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// Maximum number of generated tokens
    #[garde(range(min = 1, max = 2048))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gen_len: Option<u32>,

    #[garde(skip)]
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ModelParameters {
    /// Parse and validate parameters from a JSON object string.
    /// An empty string yields the defaults.
    pub fn from_json(raw: &str) -> DomainResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let params: Self = serde_json::from_str(raw)
            .map_err(|e| DomainError::ValidationError(format!("model_parameters: {}", e)))?;
        validate_struct(&params)?;
        Ok(params)
    }
}
