//! NutriGen CLI -- generate recipes from ingredients and dietary goals.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(
    name = "nutrigen",
    about = "NutriGen - recipe generation from ingredients and nutrition targets",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a recipe from available ingredients.
    Generate {
        /// Comma-separated ingredient list (e.g. "chicken breast, broccoli, garlic").
        #[arg(short, long)]
        ingredients: String,

        /// Target calories (kcal), 200 to 2000.
        #[arg(long, default_value_t = 500)]
        calories: u32,

        /// Target protein (g), 0 to 200.
        #[arg(long, default_value_t = 30.0)]
        protein: f32,

        /// Target carbohydrates (g), 0 to 200.
        #[arg(long, default_value_t = 40.0)]
        carbs: f32,

        /// Target fat (g), 0 to 200.
        #[arg(long, default_value_t = 20.0)]
        fat: f32,

        /// Maximum tokens to generate.
        #[arg(long, default_value_t = 300)]
        max_length: usize,

        /// Sampling temperature.
        #[arg(long, default_value_t = 0.8)]
        temperature: f64,

        /// Top-k sampling cutoff.
        #[arg(long, default_value_t = 50)]
        top_k: usize,

        /// Directory holding the tokenizer and checkpoint artifacts.
        #[arg(long, default_value = "models")]
        models_dir: PathBuf,
    },
    /// Show the selected device and available backends.
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            ingredients,
            calories,
            protein,
            carbs,
            fat,
            max_length,
            temperature,
            top_k,
            models_dir,
        } => cmd::generate::execute(cmd::generate::Args {
            ingredients,
            calories,
            protein,
            carbs,
            fat,
            max_length,
            temperature,
            top_k,
            models_dir,
        }),
        Commands::Info => cmd::info::execute(),
    }
}
