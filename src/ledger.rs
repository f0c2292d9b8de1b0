//! Year-partitioned comment log: record shapes, addressing, ordering and the
//! per-comment lifecycle.
//!
//! A student's comments live under `year -> comment key -> comment`. Every
//! write names a comment by `(student id, year, comment key)`; only the
//! configured current academic year accepts new comments, edits or deletes.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::dates;

/// Opaque academic year label such as `2025-26`. Only equality matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcademicYear(String);

impl AcademicYear {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A blank label is malformed.
    pub fn is_well_formed(&self) -> bool {
        !self.0.trim().is_empty()
    }

    /// Malformed labels never match, not even each other.
    pub fn is_current(&self, current: &AcademicYear) -> bool {
        self.is_well_formed() && current.is_well_formed() && self.0 == current.0
    }
}

impl Display for AcademicYear {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentAddress {
    pub student_id: String,
    pub year: AcademicYear,
    pub comment_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub key: String,
    pub author: String,
    pub text: String,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub key: String,
    pub student_id: String,
    pub year: AcademicYear,
    pub author: String,
    pub text: String,
    pub date: String,
    pub time: String,
    pub notes: Vec<Note>,
}

impl Comment {
    pub fn address(&self) -> CommentAddress {
        CommentAddress {
            student_id: self.student_id.clone(),
            year: self.year.clone(),
            comment_key: self.key.clone(),
        }
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        dates::display_timestamp(&self.date, &self.time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearBucket {
    pub year: AcademicYear,
    pub comments: Vec<Comment>,
}

/// Newest first; rows whose date cannot be parsed go last, keyed for a
/// stable order.
pub fn newest_first(a: &Comment, b: &Comment) -> Ordering {
    match (a.timestamp(), b.timestamp()) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.key.cmp(&b.key)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.key.cmp(&b.key),
    }
}

/// Groups comments into year buckets, years newest label first. Empty
/// buckets are never produced.
pub fn group_by_year(comments: Vec<Comment>) -> Vec<YearBucket> {
    let mut by_year: BTreeMap<AcademicYear, Vec<Comment>> = BTreeMap::new();
    for c in comments {
        by_year.entry(c.year.clone()).or_default().push(c);
    }
    by_year
        .into_iter()
        .rev()
        .map(|(year, mut comments)| {
            comments.sort_by(newest_first);
            YearBucket { year, comments }
        })
        .collect()
}

/// Notes read oldest first.
pub fn sort_notes(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        let ta = dates::display_timestamp(&a.date, &a.time);
        let tb = dates::display_timestamp(&b.date, &b.time);
        match (ta, tb) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.key.cmp(&b.key)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.key.cmp(&b.key),
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentState {
    Created,
    Active,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAction {
    Persist,
    Edit,
    Delete,
    Annotate,
}

impl CommentAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persist => "persist",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Annotate => "annotate",
        }
    }

    fn year_gated(self) -> bool {
        !matches!(self, Self::Annotate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InvalidTransition {
        from: CommentState,
        action: CommentAction,
    },
    YearClosed {
        year: AcademicYear,
        action: CommentAction,
    },
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, action } => {
                write!(f, "cannot {} a comment in state {:?}", action.as_str(), from)
            }
            Self::YearClosed { year, action } => {
                if year.is_well_formed() {
                    write!(
                        f,
                        "cannot {} comments filed under {}; the year is closed",
                        action.as_str(),
                        year
                    )
                } else {
                    write!(f, "cannot {} a comment with no academic year", action.as_str())
                }
            }
        }
    }
}

impl Error for LedgerError {}

impl CommentState {
    /// Advances the lifecycle. Year gating is checked before the state, so a
    /// closed year reports `YearClosed` even for an otherwise valid move.
    pub fn apply(
        self,
        action: CommentAction,
        year: &AcademicYear,
        current: &AcademicYear,
    ) -> Result<CommentState, LedgerError> {
        if action.year_gated() && !year.is_current(current) {
            return Err(LedgerError::YearClosed {
                year: year.clone(),
                action,
            });
        }
        match (self, action) {
            (Self::Created, CommentAction::Persist) => Ok(Self::Active),
            (Self::Active, CommentAction::Edit) => Ok(Self::Active),
            (Self::Active, CommentAction::Annotate) => Ok(Self::Active),
            (Self::Active, CommentAction::Delete) => Ok(Self::Removed),
            (from, action) => Err(LedgerError::InvalidTransition { from, action }),
        }
    }
}
