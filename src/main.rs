use anyhow::{bail, Result};
use clap::Parser;

use website_mirror::{init_logging, MirrorCommand, MirrorConfig, WebsiteMirror};

#[tokio::main]
async fn main() -> Result<()> {
    let args = MirrorCommand::parse();
    init_logging(args.verbose)?;

    let mirror = WebsiteMirror::new(MirrorConfig::from_command(&args))?;
    let summary = mirror.mirror_website().await?;

    println!("📊 {summary}");
    if summary.defects > 0 {
        bail!("{} internal consistency failures while mirroring", summary.defects);
    }

    println!("✅ Website mirroring completed successfully!");
    Ok(())
}
