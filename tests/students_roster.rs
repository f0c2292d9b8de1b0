use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_commentlogd");
    let mut child = Command::new(exe)
        .env_remove("COMMENTLOG_CURRENT_YEAR")
        .env_remove("COMMENTLOG_ALLOWED_DOMAIN")
        .env_remove("COMMENTLOG_LOG_DIR")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn commentlogd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/error/code").and_then(|v| v.as_str())
}

#[test]
fn roster_create_update_and_role_gates() {
    let workspace = temp_dir("commentlog-roster");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.signIn",
        json!({ "email": "head@school.edu" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "staff.set",
        json!({ "admins": ["head@school.edu"], "managers": ["office@school.edu"] }),
    );

    // Managers maintain the roster too.
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.signIn",
        json!({ "email": "office@school.edu" }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "details": {
                "firstName": " meera ",
                "middleName": "k",
                "lastName": "iyer",
                "class": "10",
                "section": "a",
                "gender": "female",
                "dateOfBirth": "2009-04-30",
                "bloodGroup": "o+",
                "mobile": " 98450 12345 ",
                "hostel": "no"
            }
        }),
    );
    let student_id = created["id"].as_str().expect("student id").to_string();
    assert_eq!(created["displayName"], "MEERA K IYER");
    assert_eq!(created["gradeSection"], "10-A");
    assert_eq!(created["dateOfBirth"], "30/04/2009");
    assert_eq!(created["details"]["bloodGroup"], "O+");
    assert_eq!(created["details"]["mobile"], "98450 12345");
    assert_eq!(created["details"]["transportStatus"], "");

    let duplicate = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({
            "details": {
                "firstName": "Meera",
                "middleName": "K",
                "lastName": "Iyer",
                "class": "9",
                "section": "b",
                "gender": "f",
                "dateOfBirth": "01/01/2010"
            }
        }),
    );
    assert_eq!(error_code(&duplicate), Some("duplicate_student"));
    assert_eq!(
        duplicate.pointer("/error/message").and_then(|v| v.as_str()),
        Some("A student with this name already exists.")
    );

    let incomplete = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({
            "details": {
                "firstName": "Nikhil",
                "class": "8",
                "dateOfBirth": "2011-03-03"
            }
        }),
    );
    assert_eq!(error_code(&incomplete), Some("bad_params"));
    assert_eq!(
        incomplete.pointer("/error/message").and_then(|v| v.as_str()),
        Some("missing required fields: lastName, section, gender")
    );
    let bad_dob = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.create",
        json!({
            "details": {
                "firstName": "Nikhil",
                "lastName": "Das",
                "class": "8",
                "section": "a",
                "gender": "m",
                "dateOfBirth": "sometime"
            }
        }),
    );
    assert_eq!(error_code(&bad_dob), Some("bad_params"));

    // Re-saving under the same name is not a collision with itself.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.update",
        json!({
            "studentId": student_id,
            "details": {
                "firstName": "Meera",
                "middleName": "K",
                "lastName": "Iyer",
                "class": "11",
                "section": "a",
                "gender": "female",
                "dateOfBirth": "30/04/2009"
            }
        }),
    );
    assert_eq!(updated["gradeSection"], "11-A");
    let missing = request(
        &mut stdin,
        &mut reader,
        "10",
        "students.update",
        json!({
            "studentId": "nobody",
            "details": {
                "firstName": "Zed",
                "lastName": "Zed",
                "class": "1",
                "section": "a",
                "gender": "m",
                "dateOfBirth": "2019-01-01"
            }
        }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    // Plain staff can look up students but not change them.
    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "session.signIn",
        json!({ "email": "t1@school.edu" }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "12", "students.list", json!({}));
    let rows = listed["students"].as_array().expect("students");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], student_id.as_str());
    assert_eq!(rows[0]["details"]["class"], "11");
    let denied = request(
        &mut stdin,
        &mut reader,
        "13",
        "students.create",
        json!({
            "details": {
                "firstName": "Tara",
                "lastName": "Sen",
                "class": "3",
                "section": "a",
                "gender": "f",
                "dateOfBirth": "2017-05-05"
            }
        }),
    );
    assert_eq!(error_code(&denied), Some("forbidden"));

    let _ = std::fs::remove_dir_all(workspace);
}
