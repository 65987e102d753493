//! Test doubles for the scheduler loops

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use duewatch_client::{ClientError, DueItemApi, Result as ClientResult};
use duewatch_core::domain::{DueItem, DueKind, TimeWindow};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use super::Clock;
use crate::service::DeadLetterSink;

pub fn item_due_at(id: i64, due_at: DateTime<FixedOffset>) -> DueItem {
    serde_json::from_value(json!({
        "id": id,
        "user": {"id": 1, "email": "ann@example.com", "first_name": "Ann", "last_name": "Lee"},
        "book": {"id": 5, "title": "Dune"},
        "due_date": due_at.to_rfc3339(),
        "returned": false
    }))
    .unwrap()
}

/// Wall clock that follows tokio's (pausable) clock
pub struct PausedClock {
    wall_anchor: DateTime<FixedOffset>,
    anchor: Instant,
}

impl PausedClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            wall_anchor: DateTime::parse_from_rfc3339("2026-10-16T12:00:00+04:00").unwrap(),
            anchor: Instant::now(),
        })
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.wall_anchor + chrono::Duration::from_std(self.anchor.elapsed()).unwrap()
    }
}

/// In-memory due-items resource
///
/// Fetches answer from a script (`None` = a 503), one entry per call, and
/// return nothing once the script runs out.
pub struct FakeDueApi {
    clock: Arc<dyn Clock>,
    script: Mutex<VecDeque<Option<Vec<DueItem>>>>,
    fail_submits: bool,
    pub windows: Mutex<Vec<TimeWindow>>,
    pub submitted: Mutex<Vec<(String, DateTime<FixedOffset>)>>,
}

impl FakeDueApi {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            script: Mutex::new(VecDeque::new()),
            fail_submits: false,
            windows: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_submits(mut self) -> Self {
        self.fail_submits = true;
        self
    }

    pub fn then_return(self, items: Vec<DueItem>) -> Self {
        self.script.lock().unwrap().push_back(Some(items));
        self
    }

    pub fn then_fail(self) -> Self {
        self.script.lock().unwrap().push_back(None);
        self
    }

    pub fn submitted_labels(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(label, _)| label.clone())
            .collect()
    }
}

#[async_trait]
impl DueItemApi for FakeDueApi {
    fn kind(&self) -> DueKind {
        DueKind::Borrow
    }

    async fn fetch_due(&self, window: &TimeWindow) -> ClientResult<Vec<DueItem>> {
        self.windows.lock().unwrap().push(*window);
        match self.script.lock().unwrap().pop_front() {
            Some(Some(items)) => Ok(items),
            Some(None) => Err(ClientError::api_error(503, "unavailable")),
            None => Ok(Vec::new()),
        }
    }

    async fn submit_processed(&self, item: &DueItem) -> ClientResult<()> {
        self.submitted
            .lock()
            .unwrap()
            .push((item.label(), self.clock.now()));
        if self.fail_submits {
            Err(ClientError::api_error(400, "invalid"))
        } else {
            Ok(())
        }
    }
}

/// Dead-letter sink remembering what it was given
#[derive(Default)]
pub struct RecordingDeadLetters {
    pub recorded: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl DeadLetterSink for RecordingDeadLetters {
    async fn record(&self, _kind: DueKind, item: &DueItem, error: &str) -> anyhow::Result<()> {
        self.recorded
            .lock()
            .unwrap()
            .push((item.label(), error.to_string()));
        Ok(())
    }
}
