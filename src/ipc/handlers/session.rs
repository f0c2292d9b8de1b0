use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{caller, db_err, load_config, required_text, respond, string_list, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::policy::{Role, StaffLists};
use serde_json::json;

fn sign_in(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let config = load_config(state)?;
    let email = required_text(&req.params, "email")?.to_ascii_lowercase();
    if !config.allows_email(&email) {
        state.session = None;
        log::warn!("event=sign_in module=session status=denied reason=domain");
        let message = if config.allowed_email_domain.is_empty() {
            "Access denied. A valid email address is required.".to_string()
        } else {
            format!(
                "Access denied. Only users with an {} email address can sign in.",
                config.allowed_email_domain
            )
        };
        return Err(HandlerErr::new("domain_not_allowed", message));
    }

    state.session = Some(Session { email });
    let who = caller(state)?;
    log::info!(
        "event=sign_in module=session status=ok role={}",
        who.role().as_str()
    );
    Ok(json!({
        "email": who.email(),
        "role": who.role(),
        "menu": who.access.menu(),
        "currentAcademicYear": who.config.current_academic_year,
    }))
}

fn whoami(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    Ok(json!({
        "email": who.email(),
        "role": who.role(),
        "menu": who.access.menu(),
        "currentAcademicYear": who.config.current_academic_year,
    }))
}

fn staff_get(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    Ok(json!({
        "admins": who.access.staff.admins,
        "managers": who.access.staff.managers,
    }))
}

fn staff_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    who.require_writable()?;
    // A fresh workspace has no admins; the first caller may seed the lists.
    if !who.access.staff.admins.is_empty() {
        who.require_role(&[Role::Admin], "staff.set")?;
    }

    let requested = StaffLists {
        admins: string_list(&req.params, "admins")?,
        managers: string_list(&req.params, "managers")?,
    };
    let saved = db::staff_lists_replace(who.conn, &requested).map_err(db_err("db_update_failed"))?;
    log::info!(
        "event=staff_set module=session status=ok admins={} managers={}",
        saved.admins.len(),
        saved.managers.len()
    );
    Ok(json!({
        "admins": saved.admins,
        "managers": saved.managers,
    }))
}

fn handle_sign_in(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = sign_in(state, req);
    respond(&req.id, result)
}

fn handle_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    let was_signed_in = state.session.take().is_some();
    if was_signed_in {
        log::info!("event=sign_out module=session status=ok");
    }
    ok(&req.id, json!({ "signedOut": was_signed_in }))
}

fn handle_whoami(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = whoami(state);
    respond(&req.id, result)
}

fn handle_staff_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = staff_get(state);
    respond(&req.id, result)
}

fn handle_staff_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = staff_set(state, req);
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.signIn" => Some(handle_sign_in(state, req)),
        "session.signOut" => Some(handle_sign_out(state, req)),
        "session.whoami" => Some(handle_whoami(state, req)),
        "staff.get" => Some(handle_staff_get(state, req)),
        "staff.set" => Some(handle_staff_set(state, req)),
        _ => None,
    }
}
