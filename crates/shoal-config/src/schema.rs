use jsonschema::JSONSchema;
use serde_json::Value;

use crate::error::ConfigError;

/// The recipe JSON schema, embedded at compile time (teacher pattern for
/// fixed data — see the registry's `oci-layout` marker and `nclav-config`'s
/// constant strings).
pub const RECIPE_SCHEMA_JSON: &str = include_str!("../schema/recipe.schema.json");

/// Compiled validator over [`RECIPE_SCHEMA_JSON`]. Construct once and reuse;
/// `jsonschema::JSONSchema` compilation is not cheap enough to redo per
/// request.
pub struct RecipeValidator {
    compiled: JSONSchema,
}

impl RecipeValidator {
    pub fn new() -> Result<Self, ConfigError> {
        let schema_doc: Value = serde_json::from_str(RECIPE_SCHEMA_JSON)?;
        let compiled = JSONSchema::compile(&schema_doc)
            .map_err(|e| ConfigError::SchemaCompile(e.to_string()))?;
        Ok(RecipeValidator { compiled })
    }

    /// Validates `recipe` against the embedded schema, returning the first
    /// validation error message on failure, matching the controller's
    /// "invalid recipe -> 400 with the first validator message" contract.
    pub fn validate(&self, recipe: &Value) -> Result<(), String> {
        self.compiled
            .validate(recipe)
            .map_err(|mut errors| {
                errors
                    .next()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "recipe failed schema validation".to_string())
            })
    }
}

impl Default for RecipeValidator {
    fn default() -> Self {
        Self::new().expect("embedded recipe schema must compile")
    }
}
