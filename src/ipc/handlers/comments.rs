use std::collections::{BTreeSet, HashMap};

use crate::dates;
use crate::db;
use crate::ipc::helpers::{
    caller, comment_address, db_err, optional_str, required_str, required_text, respond, Caller,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, Comment, CommentAction, CommentAddress, Note};
use crate::notify::{self, NotifyReason};
use crate::policy::{Permissions, Role};
use serde_json::json;

fn comment_json(who: &Caller<'_>, c: &Comment) -> serde_json::Value {
    let permissions = who.access.permissions_for(&c.author, &c.year);
    let mut notes = c.notes.clone();
    ledger::sort_notes(&mut notes);
    json!({
        "key": c.key,
        "studentId": c.student_id,
        "year": c.year,
        "author": c.author,
        "text": c.text,
        "date": c.date,
        "time": c.time,
        "permissions": permissions,
        "hint": who.access.hint_for(&c.year),
        "notes": notes,
    })
}

/// Input date (picker or day-first form), or today when absent.
fn entry_date(params: &serde_json::Value) -> Result<String, HandlerErr> {
    match optional_str(params, "date") {
        Some(raw) => dates::normalize_input_date(&raw).ok_or_else(|| {
            HandlerErr::new("bad_params", "date must be YYYY-MM-DD or DD/MM/YYYY")
        }),
        None => Ok(dates::format_display_date(chrono::Local::now().date_naive())),
    }
}

fn now_time() -> String {
    dates::format_display_time(chrono::Local::now().time())
}

fn require_student(who: &Caller<'_>, student_id: &str) -> Result<crate::roster::Student, HandlerErr> {
    db::student_get(who.conn, student_id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))
}

/// Loads an addressed comment the caller may at least see.
fn load_visible(who: &Caller<'_>, addr: &CommentAddress) -> Result<(Comment, Permissions), HandlerErr> {
    let comment = db::comment_get(who.conn, addr)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", "comment not found"))?;
    let permissions = who.access.permissions_for(&comment.author, &comment.year);
    if !permissions.can_view {
        return Err(HandlerErr::new("forbidden", "this comment is not visible to you"));
    }
    Ok((comment, permissions))
}

fn comments_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let student = require_student(&who, &student_id)?;

    let all = db::comments_for_student(who.conn, &student_id).map_err(db_err("db_query_failed"))?;
    let total = all.len();
    let visible: Vec<Comment> = all
        .into_iter()
        .filter(|c| who.access.permissions_for(&c.author, &c.year).can_view)
        .collect();
    let visible_count = visible.len();

    let years: Vec<serde_json::Value> = ledger::group_by_year(visible)
        .iter()
        .map(|bucket| {
            json!({
                "year": bucket.year,
                "isCurrent": bucket.year.is_current(&who.config.current_academic_year),
                "comments": bucket.comments.iter().map(|c| comment_json(&who, c)).collect::<Vec<_>>(),
            })
        })
        .collect();

    let message = if total == 0 {
        Some("No comments available for this student.")
    } else if visible_count == 0 {
        Some("You have not added any comments for this student.")
    } else {
        None
    };

    Ok(json!({
        "studentId": student.id,
        "studentName": student.details.display_name(),
        "currentAcademicYear": who.config.current_academic_year,
        "canAddComment": !who.config.maintenance_mode,
        "years": years,
        "message": message,
    }))
}

fn comments_add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    who.require_writable()?;
    let student_id = required_str(&req.params, "studentId")?;
    let text = required_text(&req.params, "text")?;
    let date = entry_date(&req.params)?;
    require_student(&who, &student_id)?;

    let year = who.config.current_academic_year.clone();
    who.advance(&year, CommentAction::Persist)?;

    let time = now_time();
    let key = db::comment_insert(who.conn, &student_id, &year, who.email(), &text, &date, &time)
        .map_err(db_err("db_insert_failed"))?;
    let comment = Comment {
        key,
        student_id,
        year,
        author: who.email().to_string(),
        text,
        date,
        time,
        notes: Vec::new(),
    };
    log::info!(
        "event=comment_add module=comments status=ok student_id={} year={} key={}",
        comment.student_id,
        comment.year,
        comment.key
    );
    Ok(json!({
        "key": comment.key,
        "year": comment.year,
        "comment": comment_json(&who, &comment),
        "notification": notify::chat_message(&comment, NotifyReason::CommentAdded),
    }))
}

fn comments_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    who.require_writable()?;
    let addr = comment_address(&req.params)?;
    let text = required_text(&req.params, "text")?;

    let (mut comment, permissions) = load_visible(&who, &addr)?;
    who.advance(&comment.year, CommentAction::Edit)?;
    if !permissions.can_edit {
        return Err(HandlerErr::new("forbidden", "Only admins can edit or delete comments."));
    }

    let found = db::comment_update_text(who.conn, &comment.address(), &text)
        .map_err(db_err("db_update_failed"))?;
    if !found {
        return Err(HandlerErr::new("not_found", "comment not found"));
    }
    comment.text = text;
    log::info!(
        "event=comment_update module=comments status=ok student_id={} year={} key={}",
        addr.student_id,
        addr.year,
        addr.comment_key
    );
    Ok(json!({ "comment": comment_json(&who, &comment) }))
}

fn comments_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    who.require_writable()?;
    let addr = comment_address(&req.params)?;

    let (comment, permissions) = load_visible(&who, &addr)?;
    who.advance(&comment.year, CommentAction::Delete)?;
    if !permissions.can_delete {
        return Err(HandlerErr::new("forbidden", "Only admins can edit or delete comments."));
    }

    let found = db::comment_delete(who.conn, &comment.address())
        .map_err(db_err("db_delete_failed"))?;
    if !found {
        return Err(HandlerErr::new("not_found", "comment not found"));
    }
    log::info!(
        "event=comment_delete module=comments status=ok student_id={} year={} key={} notes={}",
        addr.student_id,
        addr.year,
        addr.comment_key,
        comment.notes.len()
    );
    Ok(json!({
        "deleted": true,
        "notification": notify::chat_message(&comment, NotifyReason::CommentDeleted),
    }))
}

fn comments_all(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    who.require_role(&[Role::Admin], "comments.all")?;
    let author_filter = optional_str(&req.params, "author")
        .filter(|a| a != "All")
        .map(|a| a.to_ascii_lowercase());

    let students: HashMap<String, crate::roster::Student> = db::students_list(who.conn)
        .map_err(db_err("db_query_failed"))?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let mut comments = db::comments_all(who.conn).map_err(db_err("db_query_failed"))?;

    let authors: BTreeSet<String> = comments
        .iter()
        .map(|c| c.author.clone())
        .filter(|a| !a.is_empty())
        .collect();

    comments.sort_by(ledger::newest_first);
    let items: Vec<serde_json::Value> = comments
        .iter()
        .filter(|c| match &author_filter {
            Some(a) => c.author.to_ascii_lowercase() == *a,
            None => true,
        })
        .map(|c| {
            let student = students.get(&c.student_id);
            let mut item = comment_json(&who, c);
            item["studentName"] = json!(student.map(|s| s.details.display_name()).unwrap_or_default());
            item["class"] = json!(student.map(|s| s.details.class.clone()).unwrap_or_default());
            item["section"] = json!(student.map(|s| s.details.section.clone()).unwrap_or_default());
            item
        })
        .collect();

    let message = if comments.is_empty() {
        Some("No comments available for any student.")
    } else if items.is_empty() {
        Some("No comments available for this user.")
    } else {
        None
    };

    Ok(json!({
        "authors": authors,
        "comments": items,
        "message": message,
    }))
}

fn notes_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    let addr = comment_address(&req.params)?;
    let (comment, _) = load_visible(&who, &addr)?;
    let mut notes: Vec<Note> = comment.notes;
    ledger::sort_notes(&mut notes);
    Ok(json!({ "notes": notes }))
}

fn notes_add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    who.require_writable()?;
    let addr = comment_address(&req.params)?;
    let text = required_text(&req.params, "text")?;
    let date = entry_date(&req.params)?;

    let (comment, permissions) = load_visible(&who, &addr)?;
    if !permissions.can_annotate {
        return Err(HandlerErr::new("forbidden", "you cannot add notes to this comment"));
    }
    who.advance(&comment.year, CommentAction::Annotate)?;

    let time = now_time();
    let key = db::note_insert(who.conn, &addr, who.email(), &text, &date, &time)
        .map_err(db_err("db_insert_failed"))?;
    log::info!(
        "event=note_add module=comments status=ok student_id={} year={} comment_key={} note_key={}",
        addr.student_id,
        addr.year,
        addr.comment_key,
        key
    );

    let mut notes = comment.notes;
    let note = Note {
        key,
        author: who.email().to_string(),
        text,
        date,
        time,
    };
    notes.push(note.clone());
    ledger::sort_notes(&mut notes);
    Ok(json!({ "note": note, "notes": notes }))
}

fn handle_comments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = comments_list(state, req);
    respond(&req.id, result)
}

fn handle_comments_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = comments_add(state, req);
    respond(&req.id, result)
}

fn handle_comments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = comments_update(state, req);
    respond(&req.id, result)
}

fn handle_comments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = comments_delete(state, req);
    respond(&req.id, result)
}

fn handle_comments_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = comments_all(state, req);
    respond(&req.id, result)
}

fn handle_notes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = notes_list(state, req);
    respond(&req.id, result)
}

fn handle_notes_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = notes_add(state, req);
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "comments.list" => Some(handle_comments_list(state, req)),
        "comments.add" => Some(handle_comments_add(state, req)),
        "comments.update" => Some(handle_comments_update(state, req)),
        "comments.delete" => Some(handle_comments_delete(state, req)),
        "comments.all" => Some(handle_comments_all(state, req)),
        "notes.list" => Some(handle_notes_list(state, req)),
        "notes.add" => Some(handle_notes_add(state, req)),
        _ => None,
    }
}
