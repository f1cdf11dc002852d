use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::{project_timestamp_serde, wall_datetime_serde};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_key(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "Высокий",
            Priority::Medium => "Средний",
            Priority::Low => "Низкий",
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h" | "high" => Ok(Priority::High),
            "m" | "medium" => Ok(Priority::Medium),
            "l" | "low" => Ok(Priority::Low),
            other => Err(anyhow!("invalid priority: {other} (expected high, medium or low)")),
        }
    }
}

/// Subtask identifier as found in stored data: fresh subtasks carry numbers,
/// subtasks that went through an edit form carry their id as text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubtaskId {
    Number(serde_json::Number),
    Text(String),
}

impl SubtaskId {
    pub fn fresh(now: DateTime<Utc>, seq: usize) -> Self {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        SubtaskId::Number(serde_json::Number::from(millis.saturating_add(seq as u64)))
    }

    /// Textual form used for every comparison.
    pub fn as_key(&self) -> String {
        match self {
            SubtaskId::Number(n) => n.to_string(),
            SubtaskId::Text(s) => s.trim().to_string(),
        }
    }
}

impl PartialEq for SubtaskId {
    fn eq(&self, other: &Self) -> bool {
        self.as_key() == other.as_key()
    }
}

impl Eq for SubtaskId {}

impl fmt::Display for SubtaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: SubtaskId,

    pub title: String,

    #[serde(default, with = "wall_datetime_serde::option")]
    pub deadline: Option<NaiveDateTime>,

    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, with = "wall_datetime_serde::option")]
    pub date_time: Option<NaiveDateTime>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub completed: bool,

    #[serde(with = "project_timestamp_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(default, with = "project_timestamp_serde::option")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Subtask as supplied by the user. `id` is kept on edit and assigned when
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtaskDraft {
    pub id: Option<SubtaskId>,
    pub title: String,
    pub deadline: Option<NaiveDateTime>,
    pub completed: bool,
}

impl SubtaskDraft {
    pub fn new(title: impl Into<String>, deadline: Option<NaiveDateTime>) -> Self {
        Self {
            id: None,
            title: title.into(),
            deadline,
            completed: false,
        }
    }
}

impl From<&Subtask> for SubtaskDraft {
    fn from(subtask: &Subtask) -> Self {
        Self {
            id: Some(subtask.id.clone()),
            title: subtask.title.clone(),
            deadline: subtask.deadline,
            completed: subtask.completed,
        }
    }
}

/// User-editable fields of a task, shared by add and edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub date_time: Option<NaiveDateTime>,
    pub priority: Priority,
    pub subtasks: Vec<SubtaskDraft>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn trimmed_title(&self) -> Option<String> {
        let title = self.title.trim();
        (!title.is_empty()).then(|| title.to_string())
    }
}

impl From<&Task> for TaskDraft {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            date_time: task.date_time,
            priority: task.priority,
            subtasks: task.subtasks.iter().map(SubtaskDraft::from).collect(),
        }
    }
}

/// Turns drafts into subtasks: blank titles are dropped, titles trimmed,
/// missing ids assigned. With `fresh` every subtask gets a new id and starts
/// incomplete.
pub fn build_subtasks(drafts: &[SubtaskDraft], now: DateTime<Utc>, fresh: bool) -> Vec<Subtask> {
    drafts
        .iter()
        .filter(|draft| !draft.title.trim().is_empty())
        .enumerate()
        .map(|(seq, draft)| {
            let id = match (&draft.id, fresh) {
                (Some(id), false) => id.clone(),
                _ => SubtaskId::fresh(now, seq),
            };
            Subtask {
                id,
                title: draft.title.trim().to_string(),
                deadline: draft.deadline,
                completed: !fresh && draft.completed,
            }
        })
        .collect()
}

impl Task {
    pub fn from_draft(id: u64, title: String, draft: &TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            description: draft.description.trim().to_string(),
            date_time: draft.date_time,
            priority: draft.priority,
            completed: false,
            created_at: now,
            completed_at: None,
            subtasks: build_subtasks(&draft.subtasks, now, true),
            extra: BTreeMap::new(),
        }
    }

    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed = completed;
        self.completed_at = completed.then_some(now);
    }

    pub fn toggle_completed(&mut self, now: DateTime<Utc>) {
        self.set_completed(!self.completed, now);
    }

    pub fn find_subtask_mut(&mut self, id: &SubtaskId) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|subtask| subtask.id == *id)
    }

    /// Re-derives `completed` from the subtasks. Returns whether the flag
    /// changed. Tasks without subtasks are left alone.
    pub fn sync_completion_with_subtasks(&mut self, now: DateTime<Utc>) -> bool {
        if self.subtasks.is_empty() {
            return false;
        }
        let all_done = self.subtasks.iter().all(|subtask| subtask.completed);
        if all_done == self.completed {
            return false;
        }
        self.set_completed(all_done, now);
        true
    }

    pub fn completed_subtasks(&self) -> usize {
        self.subtasks.iter().filter(|subtask| subtask.completed).count()
    }
}
