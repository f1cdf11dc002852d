use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::stats::Stats;
use crate::task::{SubtaskId, Task, TaskDraft, build_subtasks};

pub const RECORD_FILE: &str = "daily_tasks.json";

/// The single persisted record holding every task, newest first.
#[derive(Debug, Clone)]
pub struct TaskStore {
    pub data_dir: PathBuf,
    pub record_path: PathBuf,
}

impl TaskStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let record_path = data_dir.join(RECORD_FILE);

        info!(
            data_dir = %data_dir.display(),
            record = %record_path.display(),
            "opened task store"
        );

        Ok(Self {
            data_dir,
            record_path,
        })
    }

    /// Reads the record. A missing, empty or unreadable record is an empty
    /// list; problems are logged and never surfaced.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Vec<Task> {
        let raw = match fs::read_to_string(&self.record_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %self.record_path.display(), "no task record yet");
                return vec![];
            }
            Err(err) => {
                warn!(file = %self.record_path.display(), error = %err, "failed reading task record");
                return vec![];
            }
        };

        if raw.trim().is_empty() {
            return vec![];
        }

        match serde_json::from_str::<Vec<Task>>(&raw) {
            Ok(tasks) => {
                debug!(count = tasks.len(), "loaded tasks");
                tasks
            }
            Err(err) => {
                warn!(
                    file = %self.record_path.display(),
                    error = %err,
                    "task record is malformed; treating as empty"
                );
                vec![]
            }
        }
    }

    /// Overwrites the record in one rename and returns fresh statistics.
    #[tracing::instrument(skip(self, tasks))]
    pub fn save(&self, tasks: &[Task]) -> anyhow::Result<Stats> {
        save_json_atomic(&self.record_path, tasks)
            .with_context(|| format!("failed to save {}", self.record_path.display()))?;
        let stats = Stats::from_tasks(tasks);
        debug!(
            total = stats.total,
            completed = stats.completed,
            pending = stats.pending,
            "saved tasks"
        );
        Ok(stats)
    }

    pub fn get(&self, id: u64) -> Option<Task> {
        self.load().into_iter().find(|task| task.id == id)
    }

    /// Creation-time id in milliseconds, bumped past the current maximum on
    /// collision.
    pub fn next_id(&self, tasks: &[Task], now: DateTime<Utc>) -> u64 {
        let stamp = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        if tasks.iter().any(|task| task.id == stamp) {
            tasks.iter().map(|task| task.id).max().unwrap_or(stamp) + 1
        } else {
            stamp
        }
    }

    #[tracing::instrument(skip(self, draft, now), fields(title = %draft.title))]
    pub fn add(&self, draft: &TaskDraft, now: DateTime<Utc>) -> anyhow::Result<Task> {
        let Some(title) = draft.trimmed_title() else {
            bail!("task title cannot be empty");
        };

        let mut tasks = self.load();
        let id = self.next_id(&tasks, now);
        let task = Task::from_draft(id, title, draft, now);

        tasks.insert(0, task.clone());
        self.save(&tasks)?;

        info!(id, subtasks = task.subtasks.len(), "task added");
        Ok(task)
    }

    #[tracing::instrument(skip(self, now))]
    pub fn toggle_complete(&self, id: u64, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut tasks = self.load();
        let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
            debug!("toggle on unknown task; ignoring");
            return Ok(false);
        };

        task.toggle_completed(now);
        info!(completed = task.completed, "task toggled");
        self.save(&tasks)?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, now), fields(subtask = %subtask_id))]
    pub fn toggle_subtask_complete(
        &self,
        task_id: u64,
        subtask_id: &SubtaskId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let mut tasks = self.load();
        let Some(task) = tasks.iter_mut().find(|task| task.id == task_id) else {
            debug!("subtask toggle on unknown task; ignoring");
            return Ok(false);
        };
        let Some(subtask) = task.find_subtask_mut(subtask_id) else {
            debug!("toggle on unknown subtask; ignoring");
            return Ok(false);
        };

        subtask.completed = !subtask.completed;
        let subtask_completed = subtask.completed;
        let parent_changed = task.sync_completion_with_subtasks(now);
        info!(
            subtask_completed,
            parent_completed = task.completed,
            parent_changed,
            "subtask toggled"
        );

        self.save(&tasks)?;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&self, id: u64) -> anyhow::Result<bool> {
        let mut tasks = self.load();
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            debug!("delete on unknown task; ignoring");
            return Ok(false);
        }

        self.save(&tasks)?;
        info!(remaining = tasks.len(), "task deleted");
        Ok(true)
    }

    /// Replaces the editable fields of a task and its whole subtask list.
    #[tracing::instrument(skip(self, draft, now))]
    pub fn edit(&self, id: u64, draft: &TaskDraft, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let Some(title) = draft.trimmed_title() else {
            bail!("task title cannot be empty");
        };

        let mut tasks = self.load();
        let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
            debug!("edit on unknown task; ignoring");
            return Ok(false);
        };

        task.title = title;
        task.description = draft.description.trim().to_string();
        task.date_time = draft.date_time;
        task.priority = draft.priority;
        task.subtasks = build_subtasks(&draft.subtasks, now, false);
        task.sync_completion_with_subtasks(now);

        info!(subtasks = task.subtasks.len(), completed = task.completed, "task edited");
        self.save(&tasks)?;
        Ok(true)
    }
}

#[tracing::instrument(skip(path, tasks))]
fn save_json_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut temp, tasks)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
