//! Role classification and per-comment access decisions.
//!
//! Both halves are pure: the caller passes the latest staff lists and the
//! configured current year on every call, nothing is cached between calls.

use serde::Serialize;

use crate::ledger::AcademicYear;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    /// Creator of the comment under evaluation. Only meaningful per comment.
    Author,
    Other,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Author => "author",
            Self::Other => "other",
        }
    }

    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

fn normalize_email(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn list_contains(list: &[String], email: &str) -> bool {
    list.iter().any(|e| normalize_email(e) == email)
}

/// Admin beats manager; anything unmatched is `Other`. Never yields `Author`.
pub fn classify(user_email: Option<&str>, admins: &[String], managers: &[String]) -> Role {
    let Some(email) = user_email.map(normalize_email) else {
        return Role::Other;
    };
    if email.is_empty() {
        return Role::Other;
    }
    if list_contains(admins, &email) {
        Role::Admin
    } else if list_contains(managers, &email) {
        Role::Manager
    } else {
        Role::Other
    }
}

pub fn is_author(user_email: Option<&str>, comment_author: &str) -> bool {
    match user_email.map(normalize_email) {
        Some(email) if !email.is_empty() => email == normalize_email(comment_author),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_annotate: bool,
}

impl Permissions {
    pub const NONE: Permissions = Permissions {
        can_view: false,
        can_edit: false,
        can_delete: false,
        can_annotate: false,
    };
}

/// Decides what `role` may do with one comment.
///
/// - view: admin, manager, or the comment's author
/// - edit/delete: admin, and only while the comment's year is current
/// - annotate: whoever can view, in any year
pub fn decide(
    role: Role,
    is_author: bool,
    comment_year: &AcademicYear,
    current_year: &AcademicYear,
) -> Permissions {
    let can_view = role.is_privileged() || is_author;
    if !can_view {
        return Permissions::NONE;
    }
    let can_mutate = role == Role::Admin && comment_year.is_current(current_year);
    Permissions {
        can_view,
        can_edit: can_mutate,
        can_delete: can_mutate,
        can_annotate: true,
    }
}

/// Tooltip shown next to a visible comment.
pub fn hint(role: Role, comment_year: &AcademicYear, current_year: &AcademicYear) -> Option<&'static str> {
    if !comment_year.is_current(current_year) {
        return Some("You can add notes to comments from previous years.");
    }
    match role {
        Role::Admin => None,
        Role::Manager => Some("Managers can view all comments but cannot edit or delete."),
        Role::Author | Role::Other => Some("Only admins can edit or delete comments."),
    }
}

/// Navigation areas a role may open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuAccess {
    pub manage_students: bool,
    pub statistics: bool,
    pub all_comments: bool,
}

impl MenuAccess {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Admin => Self {
                manage_students: true,
                statistics: true,
                all_comments: true,
            },
            Role::Manager => Self {
                manage_students: true,
                statistics: false,
                all_comments: false,
            },
            Role::Author | Role::Other => Self {
                manage_students: false,
                statistics: false,
                all_comments: false,
            },
        }
    }
}

/// Staff lists as last loaded from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StaffLists {
    pub admins: Vec<String>,
    pub managers: Vec<String>,
}

/// Everything needed to evaluate one caller against many comments. Build a
/// new one per request so role changes take effect immediately.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub user_email: Option<String>,
    pub staff: StaffLists,
    pub current_year: AcademicYear,
}

impl AccessContext {
    pub fn new(user_email: Option<String>, staff: StaffLists, current_year: AcademicYear) -> Self {
        Self {
            user_email,
            staff,
            current_year,
        }
    }

    pub fn role(&self) -> Role {
        classify(
            self.user_email.as_deref(),
            &self.staff.admins,
            &self.staff.managers,
        )
    }

    pub fn menu(&self) -> MenuAccess {
        MenuAccess::for_role(self.role())
    }

    pub fn is_author(&self, comment_author: &str) -> bool {
        is_author(self.user_email.as_deref(), comment_author)
    }

    pub fn permissions_for(&self, comment_author: &str, comment_year: &AcademicYear) -> Permissions {
        decide(
            self.role(),
            self.is_author(comment_author),
            comment_year,
            &self.current_year,
        )
    }

    pub fn hint_for(&self, comment_year: &AcademicYear) -> Option<&'static str> {
        hint(self.role(), comment_year, &self.current_year)
    }
}
