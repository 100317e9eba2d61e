//! `stance config` commands - View and manage configuration

use anyhow::Result;
use stance_core::Config;

/// Show current configuration
pub fn show(config: Config) -> Result<()> {
    println!("╭─────────────────────────────────────────╮");
    println!("│         Stance Configuration            │");
    println!("├─────────────────────────────────────────┤");
    println!("│ Gemini                                  │");
    println!("│   Binary:       {:<23} │", truncate(&config.gemini.binary, 23));
    println!("│   Analyzer:     {:<23} │", config.gemini.analyzer_model);
    println!("│   Summarizer:   {:<23} │", config.gemini.summarizer_model());
    println!("│   Generator:    {:<23} │", config.gemini.generator_model);
    println!("│   Timeout:      {:<23} │", format!("{}s", config.gemini.timeout_secs));
    println!("├─────────────────────────────────────────┤");
    println!("│ Forum                                   │");
    println!("│   URL:          {:<23} │", truncate(&config.forum.base_url, 23));
    println!("│   Timeout:      {:<23} │", format!("{}s", config.forum.timeout_secs));
    println!("│   Sub-replies:  {:<23} │", format!("first {} posts", config.forum.max_comment_posts));
    println!("├─────────────────────────────────────────┤");
    println!("│ Analysis                                │");
    println!("│   Pages/chunk:  {:<23} │", config.analysis.pages_per_chunk);
    println!("│   Chunk chars:  {:<23} │", config.analysis.max_chunk_chars);
    println!("│   Reply chars:  {:<23} │", config.analysis.max_reply_context_chars);
    println!("│   Cache:        {:<23} │", if config.cache.enabled { "on" } else { "off" });
    println!("├─────────────────────────────────────────┤");
    println!("│ Reply modes                             │");
    for mode in &config.reply.modes {
        println!("│   • {:<35} │", truncate(&mode.name, 35));
    }
    println!("├─────────────────────────────────────────┤");
    println!("│ Logging                                 │");
    println!("│   Level:        {:<23} │", config.logging.level);
    println!("╰─────────────────────────────────────────╯");

    println!("\n📁 Paths:");
    let paths = [
        ("Config:  ", Config::default_config_path()),
        ("Cache:   ", Config::default_cache_path()),
        ("Prompts: ", Config::prompts_dir()),
    ];
    for (label, path) in paths {
        if let Some(path) = path {
            println!(
                "   {} {} {}",
                label,
                path.display(),
                if path.exists() { "✓" } else { "(not created)" }
            );
        }
    }

    Ok(())
}

/// Initialize default configuration
pub fn init(force: bool) -> Result<()> {
    let path = Config::default_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

    if path.exists() && !force {
        println!(
            "⚠️  Configuration file already exists at: {}",
            path.display()
        );
        println!("   Use --force to overwrite.");
        return Ok(());
    }

    Config::ensure_dirs()?;

    let config = Config::default();
    config.save_to_file(&path)?;

    println!("✅ Created configuration file at: {}", path.display());
    println!("\n📝 Default configuration:");
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars - 1).collect();
        format!("{}…", cut)
    }
}
