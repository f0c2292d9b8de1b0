use crate::dates;
use crate::db;
use crate::ipc::helpers::{caller, db_err, optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, Comment};
use crate::policy::Role;
use crate::stats;
use crate::summary::{self, SummaryEntry};
use serde_json::json;

fn stats_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    who.require_role(&[Role::Admin], "stats.get")?;
    let today = match optional_str(&req.params, "today") {
        Some(raw) => dates::parse_iso_date(&raw)
            .ok_or_else(|| HandlerErr::new("bad_params", "today must be YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };

    let student_count = db::students_list(who.conn)
        .map_err(db_err("db_query_failed"))?
        .len();
    let comments = db::comments_all(who.conn).map_err(db_err("db_query_failed"))?;
    let report = stats::roster_stats(
        student_count,
        comments.iter().map(|c| c.date.as_str()),
        today,
    );
    Ok(json!({
        "today": dates::format_display_date(today),
        "stats": report,
    }))
}

/// Builds the summarization request body from the comments the caller can
/// see, in the same order the history view shows them.
fn summary_request(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let student = db::student_get(who.conn, &student_id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;

    let visible: Vec<Comment> = db::comments_for_student(who.conn, &student_id)
        .map_err(db_err("db_query_failed"))?
        .into_iter()
        .filter(|c| who.access.permissions_for(&c.author, &c.year).can_view)
        .collect();
    if visible.is_empty() {
        return Err(HandlerErr::new(
            "no_comments",
            "No comments available to summarize.",
        ));
    }

    let entries: Vec<SummaryEntry> = ledger::group_by_year(visible)
        .iter()
        .flat_map(|bucket| bucket.comments.iter().map(SummaryEntry::from))
        .collect();
    let name = student.details.display_name();
    let input = summary::build_input(&name, &entries).map_err(db_err("summary_failed"))?;
    log::info!(
        "event=summary_request module=analytics status=ok student_id={} entries={}",
        student_id,
        entries.len()
    );
    Ok(json!({
        "studentName": name,
        "entryCount": entries.len(),
        "body": summary::build_request(&input),
    }))
}

fn summary_extract(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    caller(state)?;
    let Some(response) = req.params.get("response") else {
        return Err(HandlerErr::new("bad_params", "missing response"));
    };
    let text = summary::extract_text(response).map_err(|e| {
        log::warn!("event=summary_extract module=analytics status=error error={e}");
        HandlerErr::new("bad_response", e.to_string())
    })?;
    let bullets = summary::bullet_points(&text);
    Ok(json!({ "text": text, "bullets": bullets }))
}

fn handle_stats_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = stats_get(state, req);
    respond(&req.id, result)
}

fn handle_summary_request(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = summary_request(state, req);
    respond(&req.id, result)
}

fn handle_summary_extract(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = summary_extract(state, req);
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.get" => Some(handle_stats_get(state, req)),
        "summary.request" => Some(handle_summary_request(state, req)),
        "summary.extract" => Some(handle_summary_extract(state, req)),
        _ => None,
    }
}
