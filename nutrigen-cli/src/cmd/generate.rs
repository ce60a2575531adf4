//! `nutrigen generate` -- the user-facing surface of the pipeline.
//!
//! Validates input, reports load failures as messages instead of
//! faults, and prints the request echo alongside the cleaned recipe.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use nutrigen_core::{
    generate_recipe, ArtifactPaths, Error, GenerationParams, GenerationRequest, NutritionTarget,
    ResourceCell,
};

/// Loaded once per process; every invocation observes the same outcome.
static RESOURCES: ResourceCell = ResourceCell::new();

pub struct Args {
    pub ingredients: String,
    pub calories: u32,
    pub protein: f32,
    pub carbs: f32,
    pub fat: f32,
    pub max_length: usize,
    pub temperature: f64,
    pub top_k: usize,
    pub models_dir: PathBuf,
}

pub fn execute(args: Args) -> Result<()> {
    if !(200..=2000).contains(&args.calories) {
        anyhow::bail!("--calories must be between 200 and 2000");
    }
    for (name, value) in [
        ("--protein", args.protein),
        ("--carbs", args.carbs),
        ("--fat", args.fat),
    ] {
        if !(0.0..=200.0).contains(&value) {
            anyhow::bail!("{name} must be between 0 and 200");
        }
    }

    let target = NutritionTarget {
        calories: args.calories,
        protein_g: args.protein,
        carbs_g: args.carbs,
        fat_g: args.fat,
    };

    // Empty input short-circuits before any model work happens.
    let request = match GenerationRequest::new(&args.ingredients, target) {
        Ok(request) => request,
        Err(Error::EmptyInput) => {
            eprintln!("Please enter some ingredients first.");
            return Ok(());
        }
        Err(e) => anyhow::bail!(e.to_string()),
    };

    let paths = ArtifactPaths::in_dir(&args.models_dir);
    let resources = match RESOURCES.get_or_load(&paths) {
        Ok(resources) => {
            tracing::info!(device = ?resources.device, "resources ready");
            resources
        }
        Err(e) => {
            eprintln!("Check that the artifacts exist under {}.", args.models_dir.display());
            anyhow::bail!("model failed to load: {e}");
        }
    };

    let params = GenerationParams {
        max_length: args.max_length,
        temperature: args.temperature,
        top_k: args.top_k,
    };

    let start = Instant::now();
    let output = match generate_recipe(resources, &request, &params) {
        Ok(output) => output,
        Err(e) => anyhow::bail!("an error occurred during generation: {e}"),
    };
    let elapsed = start.elapsed();

    println!("Based on: {}", request.ingredients.join(", "));
    println!(
        "Goals: {}kcal | P:{}g | C:{}g | F:{}g",
        target.calories, target.protein_g, target.carbs_g, target.fat_g
    );
    println!();
    println!("{}", output.text);

    eprintln!();
    eprintln!("--- generation stats ---");
    eprintln!("Prompt tokens:    {}", output.prompt_tokens);
    eprintln!("Generated tokens: {}", output.generated_tokens);
    eprintln!("Total time:       {:.2}s", elapsed.as_secs_f64());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(ingredients: &str, models_dir: &str) -> Args {
        Args {
            ingredients: ingredients.to_string(),
            calories: 500,
            protein: 30.0,
            carbs: 40.0,
            fat: 20.0,
            max_length: 4,
            temperature: 0.0,
            top_k: 1,
            models_dir: PathBuf::from(models_dir),
        }
    }

    #[test]
    fn empty_ingredients_warn_without_invoking_the_core() {
        assert!(execute(args("   ", "/nonexistent/nutrigen")).is_ok());
    }

    #[test]
    fn out_of_range_calories_are_rejected() {
        let mut a = args("chicken", "/nonexistent/nutrigen");
        a.calories = 5000;
        assert!(execute(a).is_err());
    }

    #[test]
    fn load_failure_returns_an_error_instead_of_exiting() {
        let err = execute(args("chicken breast", "/nonexistent/nutrigen")).unwrap_err();
        assert!(err.to_string().contains("failed to load"));
    }
}
