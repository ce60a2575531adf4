//! Prompt construction: ingredient parsing, nutrition targets, and the
//! textual schema the model was trained on.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Numeric nutrition targets for one generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutritionTarget {
    pub calories: u32,
    pub protein_g: f32,
    pub carbs_g: f32,
    pub fat_g: f32,
}

impl Default for NutritionTarget {
    fn default() -> Self {
        Self {
            calories: 500,
            protein_g: 30.0,
            carbs_g: 40.0,
            fat_g: 20.0,
        }
    }
}

/// Split raw comma-separated input into trimmed ingredient names.
///
/// Empty elements are preserved: a trailing comma yields a trailing
/// empty string. Kept for compatibility with the training-time parser.
pub fn parse_ingredients(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

/// One generation request, produced fresh per user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub ingredients: Vec<String>,
    pub target: NutritionTarget,
}

impl GenerationRequest {
    /// Parse a request from raw ingredient input.
    ///
    /// Rejects empty or whitespace-only input before any core work
    /// happens; the split itself never filters.
    pub fn new(raw_ingredients: &str, target: NutritionTarget) -> Result<Self> {
        if raw_ingredients.trim().is_empty() {
            return Err(Error::EmptyInput);
        }
        Ok(Self {
            ingredients: parse_ingredients(raw_ingredients),
            target,
        })
    }

    /// Render this request into the model's prompt schema.
    pub fn prompt(&self) -> String {
        format_prompt(&self.ingredients, &self.target)
    }
}

/// Render the exact textual prompt schema the tokenizer and model were
/// trained on. This template is the training contract: it must match
/// the corpus formatter bit-for-bit and is never edited independently.
pub fn format_prompt(ingredients: &[String], target: &NutritionTarget) -> String {
    format!(
        "ingredients: {} | nutrition: calories={} protein={} carbs={} fat={} | recipe:",
        ingredients.join(", "),
        target.calories,
        target.protein_g,
        target.carbs_g,
        target.fat_g,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_comma_preserves_empty_element() {
        let parsed = parse_ingredients("chicken breast, broccoli, ");
        assert_eq!(parsed, vec!["chicken breast", "broccoli", ""]);
    }

    #[test]
    fn elements_are_trimmed() {
        let parsed = parse_ingredients("  garlic ,olive oil");
        assert_eq!(parsed, vec!["garlic", "olive oil"]);
    }

    #[test]
    fn empty_input_is_rejected_before_parsing() {
        let err = GenerationRequest::new("   ", NutritionTarget::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }

    #[test]
    fn prompt_is_deterministic_and_complete() {
        let target = NutritionTarget {
            calories: 500,
            protein_g: 30.0,
            carbs_g: 40.0,
            fat_g: 20.5,
        };
        let ingredients = vec!["chicken breast".to_string(), "broccoli".to_string()];
        let prompt = format_prompt(&ingredients, &target);
        assert_eq!(
            prompt,
            "ingredients: chicken breast, broccoli | nutrition: \
             calories=500 protein=30 carbs=40 fat=20.5 | recipe:"
        );
        assert_eq!(prompt, format_prompt(&ingredients, &target));
    }
}
