//! Stage listing

use anyhow::Result;
use clipcraft_core::StageRegistry;
use colored::*;

use crate::render::format_duration;

/// Print the default stage registry
pub fn list_stages(json: bool) -> Result<()> {
    let registry = StageRegistry::default_pipeline();

    if json {
        let stages: Vec<_> = registry.iter().collect();
        println!("{}", serde_json::to_string_pretty(&stages)?);
        return Ok(());
    }

    println!(
        "{}",
        format!("Pipeline has {} stage(s):", registry.len()).bold()
    );
    println!();
    for (index, stage) in registry.iter().enumerate() {
        println!(
            "  {} {} {}",
            format!("{}.", index + 1).cyan(),
            stage.title.bold(),
            format!("({})", stage.id).dimmed()
        );
        println!("     {}", stage.description);
        println!(
            "     Estimated: {}",
            format_duration(stage.estimated_duration)
        );
        println!();
    }
    println!(
        "  Total estimated: {}",
        format_duration(registry.estimated_total()).bold()
    );

    Ok(())
}
