use serde::{Deserialize, Serialize};

/// Options passed in for translation, used throughout the translator and
/// by the top-level compile step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranslationOptions {
    /// Allows a final projection that cannot be translated to be evaluated
    /// by the caller instead of failing.
    pub enable_client_side_projection: bool,
    /// Runs the optimizer passes before rendering.
    pub optimize: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            enable_client_side_projection: false,
            optimize: true,
        }
    }
}

impl TranslationOptions {
    pub fn new(enable_client_side_projection: bool, optimize: bool) -> Self {
        Self {
            enable_client_side_projection,
            optimize,
        }
    }
}
