pub mod maintenance;

pub use maintenance::PurgeRunLogApp;

use crate::domain::app::StaticLoader;
use crate::infrastructure::config::AdminConfig;

/// The loader the shipped binary runs with
///
/// Registers the built-in maintenance apps; embedders build their own
/// loader (or extend this one) with their job classes.
pub fn builtin_loader(config: &AdminConfig) -> StaticLoader {
    let mut loader = StaticLoader::new();
    let database = config.database.clone();
    let retention_days = config.run_log_retention_days;
    loader.register(PurgeRunLogApp::CLASS_PATH, move || {
        Box::new(PurgeRunLogApp::new(database.clone(), retention_days))
    });
    loader
}
