use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::autosave::AutosaveHandle;
use crate::wizard::WizardSession;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon state owned by the request loop. `db` is the read-side connection;
/// all draft-slot writes go through the autosave worker instead.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub autosave: Option<AutosaveHandle>,
    pub session: Option<WizardSession>,
}
