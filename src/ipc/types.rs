use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::EnvOverrides;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The signed-in caller. Only the address is kept; the role is derived
/// again on every request from the stored staff lists.
#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<Session>,
    pub env: EnvOverrides,
}

impl AppState {
    pub fn new(env: EnvOverrides) -> Self {
        Self {
            workspace: None,
            db: None,
            session: None,
            env,
        }
    }
}
