use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::ledger::{AcademicYear, Comment, CommentAddress, Note};
use crate::policy::StaffLists;
use crate::roster::{Student, StudentDetails};

pub const DB_FILE: &str = "commentlog.sqlite3";

const ROLE_ADMIN: &str = "admin";
const ROLE_MANAGER: &str = "manager";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff_emails(
            role TEXT NOT NULL,
            email TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(role, email)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            middle_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            blood_group TEXT NOT NULL,
            class TEXT NOT NULL,
            section TEXT NOT NULL,
            date_of_birth TEXT NOT NULL,
            gender TEXT NOT NULL,
            class_teacher TEXT NOT NULL,
            hostel TEXT NOT NULL,
            mobile TEXT NOT NULL,
            transport_status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class, section)",
        [],
    )?;

    // A comment key is only unique inside its (student, year) bucket.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS comments(
            student_id TEXT NOT NULL,
            year TEXT NOT NULL,
            id TEXT NOT NULL,
            author TEXT NOT NULL,
            text TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(student_id, year, id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS comment_notes(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            year TEXT NOT NULL,
            comment_id TEXT NOT NULL,
            author TEXT NOT NULL,
            text TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id, year, comment_id) REFERENCES comments(student_id, year, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_comment_notes_comment
         ON comment_notes(student_id, year, comment_id)",
        [],
    )?;

    Ok(conn)
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn staff_lists_get(conn: &Connection) -> anyhow::Result<StaffLists> {
    let mut stmt =
        conn.prepare("SELECT role, email FROM staff_emails ORDER BY role, sort_order, email")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut staff = StaffLists::default();
    for (role, email) in rows {
        match role.as_str() {
            ROLE_ADMIN => staff.admins.push(email),
            ROLE_MANAGER => staff.managers.push(email),
            _ => {}
        }
    }
    Ok(staff)
}

/// Trims, lowercases, and drops blanks and repeats, keeping first-seen order.
pub fn normalize_email_list(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for e in raw {
        let e = e.trim().to_ascii_lowercase();
        if !e.is_empty() && !out.contains(&e) {
            out.push(e);
        }
    }
    out
}

pub fn staff_lists_replace(conn: &Connection, staff: &StaffLists) -> anyhow::Result<StaffLists> {
    let admins = normalize_email_list(&staff.admins);
    let managers = normalize_email_list(&staff.managers);

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM staff_emails", [])?;
    for (role, list) in [(ROLE_ADMIN, &admins), (ROLE_MANAGER, &managers)] {
        for (i, email) in list.iter().enumerate() {
            tx.execute(
                "INSERT INTO staff_emails(role, email, sort_order) VALUES(?, ?, ?)",
                params![role, email, i as i64],
            )?;
        }
    }
    tx.commit()?;
    Ok(StaffLists { admins, managers })
}

const STUDENT_COLUMNS: &str = "id, first_name, middle_name, last_name, blood_group, class, section,
    date_of_birth, gender, class_teacher, hostel, mobile, transport_status";

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        details: StudentDetails {
            first_name: r.get(1)?,
            middle_name: r.get(2)?,
            last_name: r.get(3)?,
            blood_group: r.get(4)?,
            class: r.get(5)?,
            section: r.get(6)?,
            date_of_birth: r.get(7)?,
            gender: r.get(8)?,
            class_teacher: r.get(9)?,
            hostel: r.get(10)?,
            mobile: r.get(11)?,
            transport_status: r.get(12)?,
        },
    })
}

pub fn students_list(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students
         ORDER BY class, section, first_name, middle_name, last_name, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn student_get(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    Ok(conn
        .query_row(&sql, [student_id], student_from_row)
        .optional()?)
}

/// Display names must stay unique across the roster so that name lookups
/// resolve to one student.
pub fn student_name_taken(
    conn: &Connection,
    display_name: &str,
    except_id: Option<&str>,
) -> anyhow::Result<bool> {
    Ok(students_list(conn)?
        .iter()
        .any(|s| s.details.display_name() == display_name && Some(s.id.as_str()) != except_id))
}

pub fn student_insert(conn: &Connection, d: &StudentDetails) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(
            id, first_name, middle_name, last_name, blood_group, class, section,
            date_of_birth, gender, class_teacher, hostel, mobile, transport_status, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            d.first_name,
            d.middle_name,
            d.last_name,
            d.blood_group,
            d.class,
            d.section,
            d.date_of_birth,
            d.gender,
            d.class_teacher,
            d.hostel,
            d.mobile,
            d.transport_status,
            now_stamp(),
        ],
    )?;
    Ok(id)
}

pub fn student_update(conn: &Connection, student_id: &str, d: &StudentDetails) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE students SET
            first_name = ?, middle_name = ?, last_name = ?, blood_group = ?, class = ?,
            section = ?, date_of_birth = ?, gender = ?, class_teacher = ?, hostel = ?,
            mobile = ?, transport_status = ?, updated_at = ?
         WHERE id = ?",
        params![
            d.first_name,
            d.middle_name,
            d.last_name,
            d.blood_group,
            d.class,
            d.section,
            d.date_of_birth,
            d.gender,
            d.class_teacher,
            d.hostel,
            d.mobile,
            d.transport_status,
            now_stamp(),
            student_id,
        ],
    )?;
    Ok(changed > 0)
}

fn comment_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        student_id: r.get(0)?,
        year: AcademicYear::new(r.get::<_, String>(1)?),
        key: r.get(2)?,
        author: r.get(3)?,
        text: r.get(4)?,
        date: r.get(5)?,
        time: r.get(6)?,
        notes: Vec::new(),
    })
}

fn note_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        key: r.get(0)?,
        author: r.get(1)?,
        text: r.get(2)?,
        date: r.get(3)?,
        time: r.get(4)?,
    })
}

/// All comments of one student, notes attached, in storage order.
pub fn comments_for_student(conn: &Connection, student_id: &str) -> anyhow::Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, year, id, author, text, date, time
         FROM comments WHERE student_id = ? ORDER BY year, created_at, id",
    )?;
    let mut comments = stmt
        .query_map([student_id], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT year, comment_id, id, author, text, date, time
         FROM comment_notes WHERE student_id = ? ORDER BY created_at, id",
    )?;
    let mut notes_by_comment: HashMap<(String, String), Vec<Note>> = HashMap::new();
    let rows = stmt.query_map([student_id], |r| {
        let year: String = r.get(0)?;
        let comment_id: String = r.get(1)?;
        let note = Note {
            key: r.get(2)?,
            author: r.get(3)?,
            text: r.get(4)?,
            date: r.get(5)?,
            time: r.get(6)?,
        };
        Ok(((year, comment_id), note))
    })?;
    for row in rows {
        let (k, note) = row?;
        notes_by_comment.entry(k).or_default().push(note);
    }

    for c in comments.iter_mut() {
        if let Some(notes) = notes_by_comment.remove(&(c.year.as_str().to_string(), c.key.clone())) {
            c.notes = notes;
        }
    }
    Ok(comments)
}

/// Every comment on the roster without notes.
pub fn comments_all(conn: &Connection) -> anyhow::Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, year, id, author, text, date, time
         FROM comments ORDER BY student_id, year, created_at, id",
    )?;
    let rows = stmt
        .query_map([], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn comment_get(conn: &Connection, addr: &CommentAddress) -> anyhow::Result<Option<Comment>> {
    let comment = conn
        .query_row(
            "SELECT student_id, year, id, author, text, date, time
             FROM comments WHERE student_id = ? AND year = ? AND id = ?",
            params![addr.student_id, addr.year.as_str(), addr.comment_key],
            comment_from_row,
        )
        .optional()?;
    match comment {
        Some(mut c) => {
            c.notes = notes_for_comment(conn, addr)?;
            Ok(Some(c))
        }
        None => Ok(None),
    }
}

pub fn comment_insert(
    conn: &Connection,
    student_id: &str,
    year: &AcademicYear,
    author: &str,
    text: &str,
    date: &str,
    time: &str,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO comments(student_id, year, id, author, text, date, time, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        params![student_id, year.as_str(), id, author, text, date, time, now_stamp()],
    )?;
    Ok(id)
}

/// Replaces the body only; author, date, time and notes stay as they are.
pub fn comment_update_text(conn: &Connection, addr: &CommentAddress, text: &str) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE comments SET text = ?, updated_at = ?
         WHERE student_id = ? AND year = ? AND id = ?",
        params![text, now_stamp(), addr.student_id, addr.year.as_str(), addr.comment_key],
    )?;
    Ok(changed > 0)
}

/// Removes a comment and its notes in one transaction.
pub fn comment_delete(conn: &Connection, addr: &CommentAddress) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM comment_notes WHERE student_id = ? AND year = ? AND comment_id = ?",
        params![addr.student_id, addr.year.as_str(), addr.comment_key],
    )?;
    let changed = tx.execute(
        "DELETE FROM comments WHERE student_id = ? AND year = ? AND id = ?",
        params![addr.student_id, addr.year.as_str(), addr.comment_key],
    )?;
    tx.commit()?;
    Ok(changed > 0)
}

pub fn notes_for_comment(conn: &Connection, addr: &CommentAddress) -> anyhow::Result<Vec<Note>> {
    let mut stmt = conn.prepare(
        "SELECT id, author, text, date, time FROM comment_notes
         WHERE student_id = ? AND year = ? AND comment_id = ?
         ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(
            params![addr.student_id, addr.year.as_str(), addr.comment_key],
            note_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Notes are insert-only; there is no update or delete.
pub fn note_insert(
    conn: &Connection,
    addr: &CommentAddress,
    author: &str,
    text: &str,
    date: &str,
    time: &str,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO comment_notes(id, student_id, year, comment_id, author, text, date, time, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            addr.student_id,
            addr.year.as_str(),
            addr.comment_key,
            author,
            text,
            date,
            time,
            now_stamp(),
        ],
    )?;
    Ok(id)
}
