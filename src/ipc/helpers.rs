use rusqlite::Connection;

use crate::config::{self, CommentLogConfig};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::AppState;
use crate::ledger::{AcademicYear, CommentAction, CommentAddress, CommentState, LedgerError};
use crate::policy::{AccessContext, Role};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<LedgerError> for HandlerErr {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::YearClosed { .. } => HandlerErr::new("year_closed", e.to_string()),
            LedgerError::InvalidTransition { .. } => HandlerErr::new("invalid_state", e.to_string()),
        }
    }
}

/// Maps a storage failure to the given error code.
pub fn db_err(code: &'static str) -> impl Fn(anyhow::Error) -> HandlerErr {
    move |e| HandlerErr::new(code, e.to_string())
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

/// Present, string, and non-blank after trimming.
pub fn required_text(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let s = required_str(params, key)?;
    let s = s.trim();
    if s.is_empty() {
        return Err(HandlerErr::new(
            "bad_params",
            format!("{} must not be empty", key),
        ));
    }
    Ok(s.to_string())
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn string_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Ok(Vec::new());
    };
    let arr = v
        .as_array()
        .ok_or_else(|| HandlerErr::new("bad_params", format!("{} must be an array", key)))?;
    arr.iter()
        .map(|e| {
            e.as_str().map(|s| s.to_string()).ok_or_else(|| {
                HandlerErr::new("bad_params", format!("{} entries must be strings", key))
            })
        })
        .collect()
}

/// `(studentId, year, commentKey)` from params. The year is kept verbatim;
/// a blank one is rejected later by the year gate, not here.
pub fn comment_address(params: &serde_json::Value) -> Result<CommentAddress, HandlerErr> {
    Ok(CommentAddress {
        student_id: required_str(params, "studentId")?,
        year: AcademicYear::new(required_str(params, "year")?),
        comment_key: required_str(params, "commentKey")?,
    })
}

pub fn conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// The current caller, with configuration and staff lists read fresh from
/// the workspace.
pub struct Caller<'a> {
    pub conn: &'a Connection,
    pub config: CommentLogConfig,
    pub access: AccessContext,
}

impl Caller<'_> {
    pub fn email(&self) -> &str {
        self.access.user_email.as_deref().unwrap_or("")
    }

    pub fn role(&self) -> Role {
        self.access.role()
    }

    pub fn require_role(&self, allowed: &[Role], what: &str) -> Result<Role, HandlerErr> {
        let role = self.role();
        if allowed.contains(&role) {
            Ok(role)
        } else {
            log::warn!(
                "event=access_denied module=ipc status=forbidden role={} action={}",
                role.as_str(),
                what
            );
            Err(HandlerErr::new(
                "forbidden",
                format!("{} is not allowed for role {}", what, role.as_str()),
            ))
        }
    }

    /// Rejects writes while maintenance mode is on.
    pub fn require_writable(&self) -> Result<(), HandlerErr> {
        if self.config.maintenance_mode {
            return Err(HandlerErr::new(
                "maintenance",
                "the comment log is under maintenance; changes are disabled",
            ));
        }
        Ok(())
    }

    /// Year gate for a lifecycle move on an existing comment.
    pub fn advance(&self, year: &AcademicYear, action: CommentAction) -> Result<CommentState, HandlerErr> {
        let from = match action {
            CommentAction::Persist => CommentState::Created,
            _ => CommentState::Active,
        };
        Ok(from.apply(action, year, &self.config.current_academic_year)?)
    }
}

pub fn load_config(state: &AppState) -> Result<CommentLogConfig, HandlerErr> {
    let conn = conn(state)?;
    config::load(conn, &state.env).map_err(db_err("db_query_failed"))
}

pub fn caller(state: &AppState) -> Result<Caller<'_>, HandlerErr> {
    let conn = conn(state)?;
    let Some(session) = state.session.as_ref() else {
        return Err(HandlerErr::new("not_signed_in", "sign in first"));
    };
    let config = config::load(conn, &state.env).map_err(db_err("db_query_failed"))?;
    let staff = db::staff_lists_get(conn).map_err(db_err("db_query_failed"))?;
    let access = AccessContext::new(
        Some(session.email.clone()),
        staff,
        config.current_academic_year.clone(),
    );
    Ok(Caller {
        conn,
        config,
        access,
    })
}
