use crate::config::Config;
use anyhow::{Context, Result};
use facewatch_core::{CacheBuilder, OnnxPipeline};

pub fn run(config: &Config) -> Result<()> {
    let model_dir = config.model_dir.clone();
    let mut builder = CacheBuilder::new(move || OnnxPipeline::load(&model_dir));
    if config.build.workers > 0 {
        builder = builder.with_workers(config.build.workers);
    }

    let report = builder
        .build(&config.build.faces_dir, &config.cache_path)
        .with_context(|| {
            format!(
                "building {} from {}",
                config.cache_path.display(),
                config.build.faces_dir.display()
            )
        })?;

    println!("Cache: {}", config.cache_path.display());
    println!("  images found:    {}", report.discovered);
    println!("  already cached:  {}", report.skipped);
    println!("  added:           {}", report.added);
    println!("  no face found:   {}", report.no_face);
    println!("  failed:          {}", report.failed);
    Ok(())
}
