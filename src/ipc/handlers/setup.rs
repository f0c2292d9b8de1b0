use crate::config;
use crate::ipc::helpers::{caller, db_err, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::policy::Role;
use serde_json::json;

fn setup_get(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    Ok(json!({
        "commentLog": who.config,
        "envOverrides": {
            "currentAcademicYear": state.env.current_academic_year.is_some(),
            "allowedEmailDomain": state.env.allowed_email_domain.is_some(),
        }
    }))
}

fn setup_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    // Not gated on maintenance mode: this is how maintenance is switched off.
    who.require_role(&[Role::Admin], "setup.update")?;

    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new("bad_params", "patch must be an object"));
    };

    // Patch the stored section, not the env-overridden view of it.
    let stored = config::load(who.conn, &config::EnvOverrides::default())
        .map_err(db_err("db_query_failed"))?;
    let next = config::merge_patch(&stored, patch)
        .map_err(|e| HandlerErr::new("bad_params", e.to_string()))?;
    config::save(who.conn, &next).map_err(db_err("db_update_failed"))?;

    let effective = config::load(who.conn, &state.env).map_err(db_err("db_query_failed"))?;
    log::info!(
        "event=setup_update module=setup status=ok fields={}",
        patch.keys().cloned().collect::<Vec<_>>().join(",")
    );
    Ok(json!({ "commentLog": effective }))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = setup_get(state);
    respond(&req.id, result)
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = setup_update(state, req);
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
