use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::calendar::{CalendarState, MonthGrid};
use crate::datastore::TaskStore;
use crate::filter::FilterMode;
use crate::stats::Stats;
use crate::task::{SubtaskId, Task, TaskDraft};

/// What a front end shows after any action: counters, the visible tasks
/// and the calendar grid, all derived from a fresh load.
#[derive(Debug, Clone)]
pub struct View {
    pub stats: Stats,
    pub filter: FilterMode,
    pub visible: Vec<Task>,
    pub grid: MonthGrid,
    pub date_label: String,
}

/// Per-process UI state: current filter, calendar and edit in progress.
#[derive(Debug)]
pub struct Session {
    store: TaskStore,
    filter: FilterMode,
    calendar: CalendarState,
    editing: Option<u64>,
    today: NaiveDate,
}

impl Session {
    pub fn new(store: TaskStore, today: NaiveDate) -> Self {
        Self {
            store,
            filter: FilterMode::default(),
            calendar: CalendarState::new(today),
            editing: None,
            today,
        }
    }

    pub fn with_filter(mut self, mode: FilterMode) -> Self {
        self.filter = mode;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn calendar(&self) -> &CalendarState {
        &self.calendar
    }

    pub fn calendar_mut(&mut self) -> &mut CalendarState {
        &mut self.calendar
    }

    pub fn editing(&self) -> Option<u64> {
        self.editing
    }

    #[tracing::instrument(skip(self))]
    pub fn view(&self) -> View {
        let tasks = self.store.load();
        View {
            stats: Stats::from_tasks(&tasks),
            filter: self.filter,
            visible: self.filter.apply(&tasks),
            grid: self.calendar.month_grid(&tasks, self.today),
            date_label: self.calendar.selected_label(),
        }
    }

    pub fn set_filter(&mut self, mode: FilterMode) -> View {
        debug!(filter = %mode, "filter changed");
        self.filter = mode;
        self.view()
    }

    pub fn select_date(&mut self, year: i32, month: u32, day: u32) -> anyhow::Result<View> {
        let mode = self.calendar.select_date(year, month, day)?;
        Ok(self.set_filter(mode))
    }

    pub fn change_month(&mut self, delta: i32) -> View {
        self.calendar.change_month(delta);
        self.view()
    }

    pub fn add(&mut self, draft: &TaskDraft, now: DateTime<Utc>) -> anyhow::Result<(Task, View)> {
        let task = self.store.add(draft, now)?;
        Ok((task, self.view()))
    }

    pub fn toggle_complete(&mut self, id: u64, now: DateTime<Utc>) -> anyhow::Result<(bool, View)> {
        let found = self.store.toggle_complete(id, now)?;
        Ok((found, self.view()))
    }

    pub fn toggle_subtask_complete(
        &mut self,
        task_id: u64,
        subtask_id: &SubtaskId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<(bool, View)> {
        let found = self.store.toggle_subtask_complete(task_id, subtask_id, now)?;
        Ok((found, self.view()))
    }

    pub fn delete(&mut self, id: u64) -> anyhow::Result<(bool, View)> {
        let removed = self.store.delete(id)?;
        if self.editing == Some(id) {
            self.editing = None;
        }
        Ok((removed, self.view()))
    }

    pub fn edit(
        &mut self,
        id: u64,
        draft: &TaskDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<(bool, View)> {
        let found = self.store.edit(id, draft, now)?;
        Ok((found, self.view()))
    }

    /// Starts editing `id` and hands back the current task for prefilling.
    #[tracing::instrument(skip(self))]
    pub fn begin_edit(&mut self, id: u64) -> Option<Task> {
        let task = self.store.get(id)?;
        info!("edit started");
        self.editing = Some(id);
        Some(task)
    }

    /// Applies `draft` to the task being edited. A blank title keeps the edit
    /// open; success or a vanished task closes it.
    pub fn commit_edit(
        &mut self,
        draft: &TaskDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<View>> {
        let Some(id) = self.editing else {
            debug!("commit without edit in progress; ignoring");
            return Ok(None);
        };
        let (_, view) = self.edit(id, draft, now)?;
        self.editing = None;
        Ok(Some(view))
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }
}
