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

fn spawn_sidecar(envs: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_commentlogd");
    let mut cmd = Command::new(exe);
    cmd.env_remove("COMMENTLOG_CURRENT_YEAR")
        .env_remove("COMMENTLOG_ALLOWED_DOMAIN")
        .env_remove("COMMENTLOG_LOG_DIR");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut child = cmd
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
fn sign_in_enforces_the_allowed_domain() {
    let workspace = temp_dir("commentlog-session-domain");
    let (_child, mut stdin, mut reader) =
        spawn_sidecar(&[("COMMENTLOG_ALLOWED_DOMAIN", "school.edu")]);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let denied = request(
        &mut stdin,
        &mut reader,
        "2",
        "session.signIn",
        json!({ "email": "someone@gmail.com" }),
    );
    assert_eq!(error_code(&denied), Some("domain_not_allowed"));
    assert_eq!(
        denied.pointer("/error/message").and_then(|v| v.as_str()),
        Some("Access denied. Only users with an @school.edu email address can sign in.")
    );
    let whoami = request(&mut stdin, &mut reader, "3", "session.whoami", json!({}));
    assert_eq!(error_code(&whoami), Some("not_signed_in"));

    let signed_in = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.signIn",
        json!({ "email": "  Teacher@School.EDU " }),
    );
    assert_eq!(signed_in["email"], "teacher@school.edu");
    assert_eq!(signed_in["role"], "other");
    assert_eq!(signed_in["currentAcademicYear"], "2025-26");
    assert_eq!(signed_in["menu"]["manageStudents"], false);

    // A failed attempt ends the previous session too.
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "session.signIn",
        json!({ "email": "teacher@elsewhere.org" }),
    );
    let whoami = request(&mut stdin, &mut reader, "6", "session.whoami", json!({}));
    assert_eq!(error_code(&whoami), Some("not_signed_in"));

    let setup = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "session.signIn",
        json!({ "email": "teacher@school.edu" }),
    );
    assert_eq!(setup["role"], "other");
    let setup = request_ok(&mut stdin, &mut reader, "8", "setup.get", json!({}));
    assert_eq!(setup["commentLog"]["allowedEmailDomain"], "@school.edu");
    assert_eq!(setup["envOverrides"]["allowedEmailDomain"], true);
    assert_eq!(setup["envOverrides"]["currentAcademicYear"], false);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn roles_follow_staff_lists_on_every_request() {
    let workspace = temp_dir("commentlog-session-roles");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&[]);

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

    // First caller may seed an empty workspace.
    let staff = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "staff.set",
        json!({
            "admins": ["Head@School.edu", "head@school.edu", " "],
            "managers": ["office@school.edu"]
        }),
    );
    assert_eq!(staff["admins"], json!(["head@school.edu"]));
    assert_eq!(staff["managers"], json!(["office@school.edu"]));

    let me = request_ok(&mut stdin, &mut reader, "4", "session.whoami", json!({}));
    assert_eq!(me["role"], "admin");
    assert_eq!(
        me["menu"],
        json!({ "manageStudents": true, "statistics": true, "allComments": true })
    );

    let manager = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "session.signIn",
        json!({ "email": "office@school.edu" }),
    );
    assert_eq!(manager["role"], "manager");
    assert_eq!(
        manager["menu"],
        json!({ "manageStudents": true, "statistics": false, "allComments": false })
    );
    let blocked = request(
        &mut stdin,
        &mut reader,
        "6",
        "staff.set",
        json!({ "admins": ["office@school.edu"] }),
    );
    assert_eq!(error_code(&blocked), Some("forbidden"));
    let blocked = request(&mut stdin, &mut reader, "7", "stats.get", json!({}));
    assert_eq!(error_code(&blocked), Some("forbidden"));

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "session.signIn",
        json!({ "email": "head@school.edu" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "staff.set",
        json!({ "admins": ["head@school.edu"], "managers": [] }),
    );

    // Demotion applies to the next request without signing in again.
    request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "session.signIn",
        json!({ "email": "office@school.edu" }),
    );
    let me = request_ok(&mut stdin, &mut reader, "11", "session.whoami", json!({}));
    assert_eq!(me["role"], "other");

    let out = request_ok(&mut stdin, &mut reader, "12", "session.signOut", json!({}));
    assert_eq!(out["signedOut"], true);
    let again = request_ok(&mut stdin, &mut reader, "13", "session.signOut", json!({}));
    assert_eq!(again["signedOut"], false);
    let whoami = request(&mut stdin, &mut reader, "14", "session.whoami", json!({}));
    assert_eq!(error_code(&whoami), Some("not_signed_in"));

    let _ = std::fs::remove_dir_all(workspace);
}
