//! Due item domain types
//!
//! A due item is a borrow or reserve record whose due date has been fetched
//! from the library API and which is waiting for its "due" notification.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Which kind of record a due item refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DueKind {
    Borrow,
    Reserve,
}

impl DueKind {
    /// Path segment of the due-items resource for this kind, relative to `/api/`
    pub fn resource_path(&self) -> &'static str {
        match self {
            DueKind::Borrow => "borrow_due",
            DueKind::Reserve => "reserve_due",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DueKind::Borrow => "borrow",
            DueKind::Reserve => "reserve",
        }
    }
}

impl fmt::Display for DueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "borrow" => Ok(DueKind::Borrow),
            "reserve" => Ok(DueKind::Reserve),
            other => Err(format!(
                "unknown due kind '{}', expected 'borrow' or 'reserve'",
                other
            )),
        }
    }
}

/// Opaque identifier of the underlying borrow/reserve record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Number(n) => write!(f, "{}", n),
            ItemId::Text(s) => f.write_str(s),
        }
    }
}

/// The user to notify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Pre-joined full name, sent by some endpoints instead of first/last
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DueUser {
    /// Name used to address the user, falling back to the e-mail address
    pub fn display_name(&self) -> String {
        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !joined.is_empty() {
            return joined;
        }

        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.email.clone(),
        }
    }
}

/// The book a record refers to, either nested or as a bare primary key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BookRef {
    Detail {
        id: i64,
        title: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Id(i64),
}

impl BookRef {
    pub fn id(&self) -> i64 {
        match self {
            BookRef::Detail { id, .. } => *id,
            BookRef::Id(id) => *id,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            BookRef::Detail { title, .. } => Some(title),
            BookRef::Id(_) => None,
        }
    }
}

/// A borrow or reserve record awaiting its due notification
///
/// `due_at` is fixed once the item has been fetched; the poller only ever
/// re-checks it, never reschedules. Fields the poller does not interpret are
/// kept in `extra` so that the item can be submitted back exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,

    pub user: DueUser,

    pub book: BookRef,

    #[serde(rename = "due_date")]
    pub due_at: DateTime<FixedOffset>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DueItem {
    /// Whether the item's due instant has been reached at `now`
    pub fn is_due(&self, now: DateTime<FixedOffset>) -> bool {
        now >= self.due_at
    }

    /// Short label for log lines
    ///
    /// Reserve records are served without their primary key, so those are
    /// labelled by user and book instead.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.to_string(),
            None => format!("{}/{}", self.user.email, self.book.id()),
        }
    }
}
