use std::path::Path;

use anyhow::Result;
use layernet::{config::TopologyConfig, Config};

pub(super) fn gen_config(output: &Path) -> Result<()> {
    TopologyConfig::default().save(output)
}
