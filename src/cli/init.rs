use colored::Colorize;

use crate::db::{get_metadata, set_metadata};
use crate::error::Result;
use crate::session::open_database;
use crate::settings::{load_settings, save_settings, settings_path, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings()?;
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    let conn = open_database(&settings)?;
    if get_metadata(&conn, "initialized_at")?.is_none() {
        set_metadata(&conn, "initialized_at", &chrono::Local::now().to_rfc3339())?;
    }
    save_settings(&settings)?;

    println!("{}", "tallyman is ready.".green().bold());
    println!("Settings:   {}", settings_path().display());
    println!("Data dir:   {}", settings.data_path().display());
    println!("Database:   {}", settings.db_path().display());
    match &settings.external_endpoint {
        Some(endpoint) => println!("Classifier: {endpoint}"),
        None => println!("Classifier: (none, external tier disabled)"),
    }
    Ok(())
}
