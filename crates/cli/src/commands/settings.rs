use anyhow::Context;
use strata_migrations::MigrationConfig;

use crate::GlobalArgs;

/// Merge the layered configuration with explicit command line flags
pub fn resolve(global: &GlobalArgs) -> anyhow::Result<MigrationConfig> {
    let mut config = MigrationConfig::load(global.config.as_deref())
        .context("Failed to load configuration")?;
    apply_flags(&mut config, global);
    Ok(config)
}

fn apply_flags(config: &mut MigrationConfig, global: &GlobalArgs) {
    if let Some(url) = &global.database {
        config.database_url = Some(url.clone());
    }
    if let Some(dir) = &global.migrations_dir {
        config.migrations_dir = dir.clone();
    }
}
