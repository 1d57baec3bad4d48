use crate::db::Database;

/// Shared handler state. Pending sessions and short-lived media caches live
/// in the key-value store, not in process memory, so the only shared handle
/// is the database itself.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        AppState { db }
    }
}
