mod backup;
mod config;
mod dates;
mod db;
mod ipc;
mod ledger;
mod logging;
mod notify;
mod policy;
mod roster;
mod stats;
mod summary;

use std::io::{self, BufRead, Write};

fn init_logging_from_env() {
    let Some(log_dir) = std::env::var(config::ENV_LOG_DIR)
        .ok()
        .filter(|v| !v.trim().is_empty())
    else {
        return;
    };
    let level = std::env::var(config::ENV_LOG_LEVEL)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| logging::default_log_level().to_string());
    // stdout carries the protocol; setup problems go to stderr.
    if let Err(e) = logging::init_logging(&level, &log_dir) {
        eprintln!("commentlogd: logging disabled: {e}");
    }
}

fn main() {
    init_logging_from_env();
    let mut state = ipc::AppState::new(config::EnvOverrides::from_env());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                log::warn!("event=request_parse module=main status=error error={e}");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        log::debug!("event=request module=main method={}", req.method);
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    log::info!("event=app_stop module=main status=ok");
}
