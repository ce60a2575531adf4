//! `nutrigen info` -- show the selected device and available backends.

use anyhow::Result;

pub fn execute() -> Result<()> {
    println!("NutriGen v{}", nutrigen_core::VERSION);
    println!();

    let device = nutrigen_core::select_device();
    println!("Device: {device:?}");

    println!("Backends:");
    #[cfg(feature = "metal")]
    println!("  - Metal (enabled)");
    #[cfg(not(feature = "metal"))]
    println!("  - Metal (disabled)");

    #[cfg(feature = "cuda")]
    println!("  - CUDA (enabled)");
    #[cfg(not(feature = "cuda"))]
    println!("  - CUDA (disabled)");

    println!("  - CPU (always available)");

    Ok(())
}
