use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chrono::NaiveDate;
use csv::Writer;
use tracing::{debug, info};

use crate::datetime::{format_project_timestamp, format_wall_display};
use crate::task::{Subtask, Task};

pub const REPORT_HEADERS: [&str; 8] = [
    "Название",
    "Описание",
    "Приоритет",
    "Выполнена",
    "Дата/время",
    "Дата создания",
    "Дата выполнения",
    "Подзадачи",
];

const EMPTY_CELL: &str = "-";

pub fn report_file_name(today: NaiveDate) -> String {
    format!("tasks-report-{}.csv", today.format("%Y-%m-%d"))
}

/// `title (✓|○[, deadline])` per subtask, joined with `; `.
pub fn subtask_summary(subtasks: &[Subtask]) -> String {
    subtasks
        .iter()
        .map(|subtask| {
            let mark = if subtask.completed { "✓" } else { "○" };
            match subtask.deadline {
                Some(deadline) => {
                    format!("{} ({mark}, {})", subtask.title, format_wall_display(deadline))
                }
                None => format!("{} ({mark})", subtask.title),
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn or_dash(value: String) -> String {
    if value.trim().is_empty() {
        EMPTY_CELL.to_string()
    } else {
        value
    }
}

pub fn report_row(task: &Task) -> [String; 8] {
    [
        task.title.clone(),
        or_dash(task.description.clone()),
        task.priority.label().to_string(),
        if task.completed { "Да" } else { "Нет" }.to_string(),
        or_dash(task.date_time.map(format_wall_display).unwrap_or_default()),
        format_project_timestamp(task.created_at),
        or_dash(task.completed_at.map(format_project_timestamp).unwrap_or_default()),
        or_dash(subtask_summary(&task.subtasks)),
    ]
}

/// Writes the report for `tasks`. An empty list is an error and nothing is
/// written.
#[tracing::instrument(skip(writer, tasks))]
pub fn write_report<W: Write>(writer: W, tasks: &[Task]) -> anyhow::Result<()> {
    if tasks.is_empty() {
        bail!("no tasks to export");
    }

    let mut csv_writer = Writer::from_writer(writer);
    csv_writer
        .write_record(REPORT_HEADERS)
        .context("failed to write report header")?;

    for task in tasks {
        csv_writer
            .write_record(report_row(task))
            .with_context(|| format!("failed to write report row for task {}", task.id))?;
    }

    csv_writer.flush().context("failed to flush report")?;
    debug!(rows = tasks.len(), "report written");
    Ok(())
}

/// Creates `tasks-report-<date>.csv` in `dir` and returns its path.
#[tracing::instrument(skip(tasks))]
pub fn export_to_dir(dir: &Path, tasks: &[Task], today: NaiveDate) -> anyhow::Result<PathBuf> {
    if tasks.is_empty() {
        bail!("no tasks to export");
    }

    let path = dir.join(report_file_name(today));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_report(file, tasks)?;

    info!(file = %path.display(), rows = tasks.len(), "exported task report");
    Ok(path)
}
