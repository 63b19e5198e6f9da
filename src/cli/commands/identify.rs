//! Identity lookup command.

use tokio::runtime::Runtime;

use anisource::Engine;
use anisource::config::Config;
use anisource::identity::IdentityResolution;

/// Resolve a title through the identity cache and print the binding.
pub fn cmd_identify(
    rt: &Runtime,
    mut config: Config,
    title: &str,
    min_confidence: Option<f32>,
) -> anyhow::Result<()> {
    if let Some(confidence) = min_confidence {
        config.identity.min_confidence = confidence;
    }
    if !config.identity.enabled {
        anyhow::bail!("identity lookups are disabled in the config ([identity] enabled = false)");
    }

    let engine = Engine::builder(config).build()?;

    rt.block_on(async {
        match engine.identify(title).await {
            IdentityResolution::Resolved(found) => {
                println!("Title:      {}", title);
                println!("Matched:    {}", found.matched_title);
                println!("Id:         {}", found.external_id);
                println!("Confidence: {:.0}%", found.confidence * 100.0);
            }
            IdentityResolution::Unresolved => {
                println!("No confident match for {:?}", title);
                println!("Results for this title will be cached by name.");
            }
        }
    });
    Ok(())
}
