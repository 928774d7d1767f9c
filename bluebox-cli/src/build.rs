use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use bluebox::{ArchiveSummary, Bluebox, CargoProducer, PrebuiltProducer};
use tracing::{info, warn};

use crate::cli::Cli;

/// Configure a [`Bluebox`] from the command line and write the archive.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut bluebox = match (&cli.stage_dir, &cli.guest_manifest) {
        (Some(dir), _) => Bluebox::with_producer(PrebuiltProducer::new(dir)),
        (None, Some(manifest)) => Bluebox::with_producer(CargoProducer::new(manifest)),
        (None, None) => Bluebox::new(),
    };

    if let Some(arch) = &cli.arch {
        bluebox.setarch(arch)?;
    }
    for var in &cli.env {
        bluebox.setenv(&var.key, &var.value);
    }
    for exec in &cli.executables {
        bluebox.execute(&exec.path, exec.args.clone())?;
    }
    for embedding in &cli.embeddings {
        bluebox.embed(embedding)?;
    }

    let summary = match write_archive(&bluebox, &cli.output) {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(rm) = fs::remove_file(&cli.output) {
                warn!("Failed to remove {}: {}", cli.output.display(), rm);
            }
            return Err(e);
        }
    };

    for entry in &summary.entries {
        info!(name = %entry.name, size = entry.size, mode = entry.permissions, "archived");
    }
    println!(
        "{}: {} entries, {} bytes",
        cli.output.display(),
        summary.entries.len(),
        summary.bytes
    );
    Ok(())
}

fn write_archive(bluebox: &Bluebox, output: &Path) -> anyhow::Result<ArchiveSummary> {
    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let summary = bluebox.generate(&mut writer)?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(summary)
}
