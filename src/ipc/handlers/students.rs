use crate::db;
use crate::ipc::helpers::{caller, db_err, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::policy::Role;
use crate::roster::{Student, StudentDetails};
use serde_json::json;

fn student_json(s: &Student) -> serde_json::Value {
    json!({
        "id": s.id,
        "displayName": s.details.display_name(),
        "gradeSection": s.details.grade_section(),
        "dateOfBirth": s.details.date_of_birth,
        "details": s.details,
    })
}

fn parse_details(params: &serde_json::Value) -> Result<StudentDetails, HandlerErr> {
    let Some(raw) = params.get("details") else {
        return Err(HandlerErr::new("bad_params", "missing details"));
    };
    let details: StudentDetails = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid details: {e}")))?;
    details
        .normalized()
        .map_err(|m| HandlerErr::new("bad_params", m))
}

fn students_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    let students = db::students_list(who.conn).map_err(db_err("db_query_failed"))?;
    let rows: Vec<serde_json::Value> = students.iter().map(student_json).collect();
    Ok(json!({ "students": rows }))
}

fn students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    who.require_writable()?;
    who.require_role(&[Role::Admin, Role::Manager], "students.create")?;
    let details = parse_details(&req.params)?;

    let name = details.display_name();
    if db::student_name_taken(who.conn, &name, None).map_err(db_err("db_query_failed"))? {
        return Err(HandlerErr::new(
            "duplicate_student",
            "A student with this name already exists.",
        )
        .with_details(json!({ "displayName": name })));
    }

    let student_id = db::student_insert(who.conn, &details).map_err(db_err("db_insert_failed"))?;
    log::info!("event=student_create module=students status=ok student_id={student_id}");
    Ok(student_json(&Student {
        id: student_id,
        details,
    }))
}

fn students_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = caller(state)?;
    who.require_writable()?;
    who.require_role(&[Role::Admin, Role::Manager], "students.update")?;
    let student_id = required_str(&req.params, "studentId")?;
    let details = parse_details(&req.params)?;

    let name = details.display_name();
    if db::student_name_taken(who.conn, &name, Some(&student_id))
        .map_err(db_err("db_query_failed"))?
    {
        return Err(HandlerErr::new(
            "duplicate_student",
            "A student with this name already exists.",
        )
        .with_details(json!({ "displayName": name })));
    }

    let found = db::student_update(who.conn, &student_id, &details)
        .map_err(db_err("db_update_failed"))?;
    if !found {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    log::info!("event=student_update module=students status=ok student_id={student_id}");
    Ok(student_json(&Student {
        id: student_id,
        details,
    }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = students_list(state);
    respond(&req.id, result)
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = students_create(state, req);
    respond(&req.id, result)
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = students_update(state, req);
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        _ => None,
    }
}
