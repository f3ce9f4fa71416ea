use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;

pub struct AppState {
    pub db: Database,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> rusqlite::Result<Arc<Self>> {
        let db = Database::open(Path::new(&config.db_path))?;
        db.initialize()?;

        Ok(Arc::new(Self { db, config }))
    }
}
