use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{MonthGrid, WEEKDAY_LABELS};
use crate::config::Config;
use crate::datetime::{format_project_timestamp, format_wall_display};
use crate::stats::Stats;
use crate::task::{Priority, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if tasks.is_empty() {
            writeln!(out, "Задач пока нет")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            " ".to_string(),
            "Priority".to_string(),
            "When".to_string(),
            "Title".to_string(),
            "Subtasks".to_string(),
        ];

        let rows = tasks
            .iter()
            .map(|task| {
                let id = self.paint(&task.id.to_string(), "33");
                let mark = if task.completed { "[x]" } else { "[ ]" }.to_string();
                let priority = self.paint_priority(task.priority);
                let when = task.date_time.map(format_wall_display).unwrap_or_default();
                let title = if task.completed {
                    self.paint(&task.title, "9")
                } else {
                    task.title.clone()
                };
                let subtasks = if task.subtasks.is_empty() {
                    String::new()
                } else {
                    format!("{}/{}", task.completed_subtasks(), task.subtasks.len())
                };
                vec![id, mark, priority, when, title, subtasks]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task), fields(id = task.id))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        writeln!(out, "priority    {}", task.priority.label())?;
        writeln!(
            out,
            "when        {}",
            task.date_time
                .map(format_wall_display)
                .unwrap_or_else(|| "Дата не указана".to_string())
        )?;
        writeln!(out, "completed   {}", if task.completed { "yes" } else { "no" })?;
        writeln!(out, "created     {}", format_project_timestamp(task.created_at))?;
        if let Some(done) = task.completed_at {
            writeln!(out, "done at     {}", format_project_timestamp(done))?;
        }

        if !task.subtasks.is_empty() {
            writeln!(out, "subtasks")?;
            for subtask in &task.subtasks {
                let mark = if subtask.completed { "[x]" } else { "[ ]" };
                let deadline = subtask
                    .deadline
                    .map(|d| format!("  ⏰ {}", format_wall_display(d)))
                    .unwrap_or_default();
                writeln!(out, "  {mark} {}  {}{deadline}", subtask.id, subtask.title)?;
            }
        }

        Ok(())
    }

    pub fn print_stats(&mut self, stats: &Stats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "total {}  completed {}  pending {}  ({:.0}%)",
            stats.total,
            stats.completed,
            stats.pending,
            stats.percent()
        )?;
        Ok(())
    }

    /// Month grid; days with tasks carry a `*`, today is highlighted and the
    /// selected day is bracketed.
    #[tracing::instrument(skip(self, grid), fields(year = grid.year, month = grid.month))]
    pub fn print_calendar(&mut self, grid: &MonthGrid) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "{:^35}", grid.title)?;
        for label in WEEKDAY_LABELS {
            write!(out, " {label:>3} ")?;
        }
        writeln!(out)?;

        for week in grid.weeks() {
            for slot in week {
                let Some(cell) = slot else {
                    write!(out, "     ")?;
                    continue;
                };
                let marker = if cell.has_tasks { "*" } else { " " };
                let day = if cell.is_selected {
                    format!("[{:>2}]", cell.day)
                } else {
                    format!(" {:>2} ", cell.day)
                };
                let day = if cell.is_today { self.paint(&day, "7") } else { day };
                write!(out, "{day}{marker}")?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::High => "31",
            Priority::Medium => "33",
            Priority::Low => "32",
        };
        self.paint(priority.label(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{strip_ansi, write_table};

    #[test]
    fn table_pads_by_display_width() {
        let mut out = Vec::new();
        write_table(
            &mut out,
            vec!["ID".to_string(), "Title".to_string()],
            vec![
                vec!["\x1b[33m1\x1b[0m".to_string(), "Купить молоко".to_string()],
                vec!["22".to_string(), "x".to_string()],
            ],
        )
        .expect("write table");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID Title         ");
        assert_eq!(strip_ansi(lines[2]), "1  Купить молоко ");
        assert_eq!(lines[3], "22 x             ");
    }
}
