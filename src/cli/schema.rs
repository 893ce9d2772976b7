use crate::error::Result;
use crate::metrics::MetricsEngine;
use crate::session::{load_metrics_config, load_taxonomy};
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings()?;
    let taxonomy = load_taxonomy(&settings)?;
    let engine = MetricsEngine::new(load_metrics_config(&settings, None)?, &taxonomy)?;
    println!("{}", serde_json::to_string_pretty(&engine.schema())?);
    Ok(())
}
