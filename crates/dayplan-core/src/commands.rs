use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::{Command, TaskFields, split_subtask_spec};
use crate::config::Config;
use crate::datetime::{parse_date_expr, project_today};
use crate::export::export_to_dir;
use crate::filter::FilterMode;
use crate::render::Renderer;
use crate::session::Session;
use crate::task::{Priority, SubtaskDraft, SubtaskId, TaskDraft};

#[instrument(skip(session, cfg, renderer, command, now))]
pub fn dispatch(
    session: &mut Session,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Add { title, fields } => cmd_add(session, cfg, &title.join(" "), &fields, now),
        Command::List { filter } => cmd_list(session, renderer, filter.as_deref(), now),
        Command::Info { id } => cmd_info(session, renderer, id),
        Command::Done { id } => cmd_done(session, id, now),
        Command::Subtask {
            task_id,
            subtask_id,
        } => cmd_subtask(session, task_id, &subtask_id, now),
        Command::Edit {
            id,
            title,
            fields,
            clear_subtasks,
        } => cmd_edit(session, id, title, &fields, clear_subtasks, now),
        Command::Delete { id, yes } => cmd_delete(session, cfg, id, yes),
        Command::Calendar {
            month,
            shift,
            select,
        } => cmd_calendar(session, renderer, month.as_deref(), shift, select.as_deref(), now),
        Command::Stats => cmd_stats(session, renderer),
        Command::Export { output } => cmd_export(session, &output, now),
        Command::Config => cmd_config(cfg),
    }
}

#[instrument(skip(session, cfg, fields, now))]
fn cmd_add(
    session: &mut Session,
    cfg: &Config,
    title: &str,
    fields: &TaskFields,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let mut draft = TaskDraft::new(title);
    draft.description = fields.description.clone().unwrap_or_default();
    draft.priority = parse_priority(fields.priority.as_deref())?.unwrap_or_default();
    draft.subtasks = parse_subtasks(&fields.subtasks, now);
    draft.date_time = match (&fields.due, fields.no_due) {
        (Some(expr), _) => Some(parse_date_expr(expr, now)?),
        (None, true) => None,
        (None, false) if cfg.get_bool("add.default_now").unwrap_or(true) => {
            Some(parse_date_expr("now", now)?)
        }
        (None, false) => None,
    };

    let (task, view) = session.add(&draft, now)?;
    debug!(pending = view.stats.pending, "task added");
    println!("Created task {}.", task.id);
    Ok(())
}

#[instrument(skip(session, renderer, now))]
fn cmd_list(
    session: &mut Session,
    renderer: &mut Renderer,
    filter: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let view = match filter {
        Some(raw) => session.set_filter(FilterMode::parse(raw, now)?),
        None => session.view(),
    };

    renderer.print_task_table(&view.visible)?;
    renderer.print_stats(&view.stats)?;
    Ok(())
}

#[instrument(skip(session, renderer))]
fn cmd_info(session: &mut Session, renderer: &mut Renderer, id: u64) -> anyhow::Result<()> {
    info!("command info");

    let task = session
        .store()
        .get(id)
        .ok_or_else(|| anyhow!("no task with id {id}"))?;
    renderer.print_task_info(&task)
}

#[instrument(skip(session, now))]
fn cmd_done(session: &mut Session, id: u64, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command done");

    let (found, _) = session.toggle_complete(id, now)?;
    if !found {
        println!("No task with id {id}.");
        return Ok(());
    }

    let state = session
        .store()
        .get(id)
        .map(|task| if task.completed { "completed" } else { "pending" })
        .unwrap_or("unknown");
    println!("Task {id} is now {state}.");
    Ok(())
}

#[instrument(skip(session, now))]
fn cmd_subtask(
    session: &mut Session,
    task_id: u64,
    subtask_id: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command subtask");

    let subtask_id = SubtaskId::Text(subtask_id.trim().to_string());
    let (found, _) = session.toggle_subtask_complete(task_id, &subtask_id, now)?;
    if !found {
        println!("No subtask {subtask_id} on task {task_id}.");
        return Ok(());
    }

    if let Some(task) = session.store().get(task_id) {
        println!(
            "Task {task_id}: {}/{} subtasks done, task {}.",
            task.completed_subtasks(),
            task.subtasks.len(),
            if task.completed { "completed" } else { "pending" }
        );
    }
    Ok(())
}

#[instrument(skip(session, title, fields, now))]
fn cmd_edit(
    session: &mut Session,
    id: u64,
    title: Option<String>,
    fields: &TaskFields,
    clear_subtasks: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command edit");

    let Some(task) = session.begin_edit(id) else {
        println!("No task with id {id}.");
        return Ok(());
    };

    let mut draft = TaskDraft::from(&task);
    if let Some(title) = title {
        draft.title = title;
    }
    if let Some(description) = &fields.description {
        draft.description = description.clone();
    }
    if let Some(priority) = parse_priority(fields.priority.as_deref())? {
        draft.priority = priority;
    }
    if let Some(expr) = &fields.due {
        draft.date_time = Some(parse_date_expr(expr, now)?);
    } else if fields.no_due {
        draft.date_time = None;
    }
    if clear_subtasks {
        draft.subtasks.clear();
    } else if !fields.subtasks.is_empty() {
        draft.subtasks = parse_subtasks(&fields.subtasks, now);
    }

    let result = session.commit_edit(&draft, now);
    if result.is_err() {
        session.cancel_edit();
    }
    result?;

    println!("Modified task {id}.");
    Ok(())
}

#[instrument(skip(session, cfg))]
fn cmd_delete(session: &mut Session, cfg: &Config, id: u64, yes: bool) -> anyhow::Result<()> {
    info!("command delete");

    let Some(task) = session.store().get(id) else {
        println!("No task with id {id}.");
        return Ok(());
    };

    let needs_confirmation = cfg.get_bool("confirmation").unwrap_or(true);
    if needs_confirmation && !yes && !confirm(&format!("Удалить задачу «{}»? (y/N) ", task.title))? {
        warn!("delete not confirmed; aborting");
        println!("Task {id} kept.");
        return Ok(());
    }

    let (removed, view) = session.delete(id)?;
    if removed {
        println!("Deleted task {id}. {} task(s) left.", view.stats.total);
    }
    Ok(())
}

#[instrument(skip(session, renderer, now))]
fn cmd_calendar(
    session: &mut Session,
    renderer: &mut Renderer,
    month: Option<&str>,
    shift: Option<i32>,
    select: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command calendar");

    if let Some(raw) = month {
        let (year, month) = parse_year_month(raw)?;
        session.calendar_mut().show_month(year, month)?;
    }

    let mut view = None;
    if let Some(expr) = select {
        let date = parse_date_expr(expr, now)?.date();
        if month.is_none() {
            session.calendar_mut().show_month(date.year(), date.month())?;
        }
        view = Some(session.select_date(date.year(), date.month(), date.day())?);
    }

    if let Some(delta) = shift {
        view = Some(session.change_month(delta));
    }

    let view = view.unwrap_or_else(|| session.view());
    renderer.print_calendar(&view.grid)?;

    if select.is_some() {
        println!();
        println!("{}", view.date_label);
        renderer.print_task_table(&view.visible)?;
    }
    Ok(())
}

#[instrument(skip(session, renderer))]
fn cmd_stats(session: &mut Session, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command stats");
    let view = session.view();
    renderer.print_stats(&view.stats)
}

#[instrument(skip(session, now))]
fn cmd_export(session: &mut Session, output: &Path, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command export");

    let tasks = session.store().load();
    if tasks.is_empty() {
        println!("Нет задач для экспорта");
        return Ok(());
    }

    let path = export_to_dir(output, &tasks, project_today(now))?;
    println!("Exported {} task(s) to {}.", tasks.len(), path.display());
    Ok(())
}

fn cmd_config(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}

fn parse_priority(raw: Option<&str>) -> anyhow::Result<Option<Priority>> {
    raw.map(str::parse::<Priority>).transpose()
}

/// A suffix after `@` that does not read as a date stays part of the title.
fn parse_subtasks(specs: &[String], now: DateTime<Utc>) -> Vec<SubtaskDraft> {
    specs
        .iter()
        .map(|spec| {
            let (title, deadline) = split_subtask_spec(spec);
            match deadline.map(|expr| parse_date_expr(expr, now)) {
                Some(Ok(deadline)) => SubtaskDraft::new(title.trim(), Some(deadline)),
                Some(Err(err)) => {
                    debug!(spec = %spec, error = %err, "subtask suffix is not a date; keeping it in the title");
                    SubtaskDraft::new(spec.trim(), None)
                }
                None => SubtaskDraft::new(title.trim(), None),
            }
        })
        .collect()
}

fn parse_year_month(raw: &str) -> anyhow::Result<(i32, u32)> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM, got: {raw}"))?;
    Ok((first.year(), first.month()))
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    let mut out = io::stdout().lock();
    write!(out, "{prompt}")?;
    out.flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed reading confirmation")?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "д" | "да"
    ))
}
