use std::fmt;

use anyhow::anyhow;
use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use tracing::trace;

use crate::datetime::parse_date_expr;
use crate::task::Task;

/// Criterion selecting which tasks are
/// visible.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq
)]
pub enum FilterMode {
  #[default]
  All,
  Pending,
  Completed,
  Date(NaiveDate)
}

impl FilterMode {
  /// Accepts `all`, `pending`,
  /// `completed` and `date:<expr>`,
  /// where `<expr>` is anything
  /// [`parse_date_expr`] understands.
  #[tracing::instrument(skip(now))]
  pub fn parse(
    raw: &str,
    now: DateTime<Utc>
  ) -> anyhow::Result<Self> {
    let token = raw.trim();
    let lower =
      token.to_ascii_lowercase();

    match lower.as_str() {
      | "all" => Ok(FilterMode::All),
      | "pending" => {
        Ok(FilterMode::Pending)
      }
      | "completed" | "done" => {
        Ok(FilterMode::Completed)
      }
      | _ => {
        let Some(expr) = token
          .strip_prefix("date:")
          .or_else(|| {
            token.strip_prefix("date=")
          })
        else {
          return Err(anyhow!(
            "unknown filter: {token} \
             (expected all, pending, \
             completed or date:<date>)"
          ));
        };
        let when =
          parse_date_expr(expr, now)?;
        Ok(FilterMode::Date(
          when.date()
        ))
      }
    }
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    match self {
      | FilterMode::All => true,
      | FilterMode::Pending => {
        !task.completed
      }
      | FilterMode::Completed => {
        task.completed
      }
      | FilterMode::Date(day) => {
        task
          .date_time
          .map(|dt| dt.date() == *day)
          .unwrap_or(false)
      }
    }
  }

  /// Visible subset in store order.
  #[tracing::instrument(skip(
    self, tasks
  ))]
  pub fn apply(
    &self,
    tasks: &[Task]
  ) -> Vec<Task> {
    let visible: Vec<Task> = tasks
      .iter()
      .filter(|task| self.matches(task))
      .cloned()
      .collect();
    trace!(
      total = tasks.len(),
      visible = visible.len(),
      "applied filter"
    );
    visible
  }
}

impl fmt::Display for FilterMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | FilterMode::All => {
        f.write_str("all")
      }
      | FilterMode::Pending => {
        f.write_str("pending")
      }
      | FilterMode::Completed => {
        f.write_str("completed")
      }
      | FilterMode::Date(day) => {
        write!(
          f,
          "date:{}",
          day.format("%Y-%m-%d")
        )
      }
    }
  }
}
