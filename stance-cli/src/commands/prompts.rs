//! `stance prompts` commands - Inspect and restore prompt templates

use anyhow::Result;
use stance_core::prompts::{write_defaults, PromptKind};
use stance_core::{Config, PromptSet};

pub fn show() -> Result<()> {
    let prompts = PromptSet::load()?;

    for kind in PromptKind::ALL {
        let template = prompts.get(kind);

        println!("📝 {} ({})", template.name, kind.file_name());
        if !template.description.is_empty() {
            println!("   {}", template.description);
        }
        if let Some(model) = &template.model {
            println!("   Model: {}", model);
        }
        match &template.source_path {
            Some(path) => println!("   Source: {}", path.display()),
            None => println!("   Source: built-in"),
        }

        println!("{}", "─".repeat(60));
        println!("{}", template.body);
        println!("{}\n", "─".repeat(60));
    }

    Ok(())
}

pub fn init(force: bool) -> Result<()> {
    let dir = Config::prompts_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine prompts directory"))?;

    let written = write_defaults(&dir, force)?;
    if written.is_empty() {
        println!("⚠️  Prompt files already exist in: {}", dir.display());
        println!("   Use --force to overwrite.");
        return Ok(());
    }

    for path in &written {
        println!("✅ Wrote {}", path.display());
    }
    println!("\n📝 Edit these files to customize the prompts.");

    Ok(())
}
