//! Shared server state

use std::sync::{Arc, Mutex, MutexGuard};

use bicanh_core::{Database, Error, Notifier, Result};

/// Everything a request handler needs
pub struct AppState {
    db: Mutex<Database>,
    pub notifier: Arc<dyn Notifier>,
    pub meeting_credit: i64,
}

impl AppState {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, meeting_credit: i64) -> Self {
        Self {
            db: Mutex::new(db),
            notifier,
            meeting_credit,
        }
    }

    /// Exclusive access to the database for one request
    pub fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "database lock poisoned",
            ))
        })
    }
}
