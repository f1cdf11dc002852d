use std::collections::BTreeSet;

use anyhow::anyhow;
use chrono::{
  Datelike,
  Duration,
  NaiveDate
};
use serde::Serialize;
use tracing::debug;

use crate::filter::FilterMode;
use crate::task::Task;

const MONTH_NAMES: [&str; 12] = [
  "Январь",
  "Февраль",
  "Март",
  "Апрель",
  "Май",
  "Июнь",
  "Июль",
  "Август",
  "Сентябрь",
  "Октябрь",
  "Ноябрь",
  "Декабрь"
];

const MONTH_NAMES_GENITIVE: [&str;
  12] = [
  "января",
  "февраля",
  "марта",
  "апреля",
  "мая",
  "июня",
  "июля",
  "августа",
  "сентября",
  "октября",
  "ноября",
  "декабря"
];

pub const WEEKDAY_LABELS: [&str; 7] =
  ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];

/// Displayed month and selected date.
/// Transient; never persisted.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct CalendarState {
  current_month: NaiveDate,
  selected_date: NaiveDate
}

#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
pub struct DayCell {
  pub day:         u32,
  pub date:        NaiveDate,
  pub has_tasks:   bool,
  pub is_today:    bool,
  pub is_selected: bool
}

/// Monday-first month layout: blank
/// cells before the 1st, then one cell
/// per day.
#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
pub struct MonthGrid {
  pub year:           i32,
  pub month:          u32,
  pub title:          String,
  pub leading_blanks: usize,
  pub days:           Vec<DayCell>
}

impl MonthGrid {
  pub fn cell(
    &self,
    day: u32
  ) -> Option<&DayCell> {
    self
      .days
      .iter()
      .find(|cell| cell.day == day)
  }

  /// Rows of seven slots, `None` for
  /// blanks.
  pub fn weeks(
    &self
  ) -> Vec<Vec<Option<&DayCell>>> {
    let mut slots: Vec<
      Option<&DayCell>
    > = vec![None; self.leading_blanks];
    slots.extend(
      self.days.iter().map(Some)
    );
    while slots.len() % 7 != 0 {
      slots.push(None);
    }
    slots
      .chunks(7)
      .map(|row| row.to_vec())
      .collect()
  }
}

impl CalendarState {
  pub fn new(today: NaiveDate) -> Self {
    Self {
      current_month: first_day_of_month(
        today.year(),
        today.month()
      ),
      selected_date: today
    }
  }

  pub fn current_month(
    &self
  ) -> (i32, u32) {
    (
      self.current_month.year(),
      self.current_month.month()
    )
  }

  pub fn selected_date(
    &self
  ) -> NaiveDate {
    self.selected_date
  }

  /// Moves the displayed month by
  /// `delta`, rolling the year over.
  #[tracing::instrument(skip(self))]
  pub fn change_month(
    &mut self,
    delta: i32
  ) {
    self.current_month = shift_months(
      self.current_month,
      delta
    );
    debug!(
      year = self.current_month.year(),
      month = self.current_month.month(),
      "calendar month changed"
    );
  }

  pub fn show_month(
    &mut self,
    year: i32,
    month: u32
  ) -> anyhow::Result<()> {
    self.current_month =
      NaiveDate::from_ymd_opt(
        year, month, 1
      )
      .ok_or_else(|| {
        anyhow!(
          "invalid month: \
           {year}-{month:02}"
        )
      })?;
    Ok(())
  }

  /// Months are 1-based. Returns the
  /// date filter for the new selection.
  #[tracing::instrument(skip(self))]
  pub fn select_date(
    &mut self,
    year: i32,
    month: u32,
    day: u32
  ) -> anyhow::Result<FilterMode> {
    let date = NaiveDate::from_ymd_opt(
      year, month, day
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid date: \
         {year}-{month:02}-{day:02}"
      )
    })?;
    self.selected_date = date;
    debug!(%date, "calendar date selected");
    Ok(FilterMode::Date(date))
  }

  /// Current-date label, e.g.
  /// `1 мая 2024`.
  pub fn selected_label(&self) -> String
  {
    format_day_label(self.selected_date)
  }

  pub fn month_title(&self) -> String {
    month_title(
      self.current_month.year(),
      self.current_month.month()
    )
  }

  #[tracing::instrument(skip(
    self, tasks
  ))]
  pub fn month_grid(
    &self,
    tasks: &[Task],
    today: NaiveDate
  ) -> MonthGrid {
    let (year, month) =
      self.current_month();
    let first =
      first_day_of_month(year, month);
    let leading_blanks = first
      .weekday()
      .num_days_from_monday()
      as usize;

    let task_days: BTreeSet<NaiveDate> =
      tasks
        .iter()
        .filter_map(|task| {
          task
            .date_time
            .map(|dt| dt.date())
        })
        .collect();

    let days = (1..=days_in_month(
      year, month
    ))
      .filter_map(|day| {
        NaiveDate::from_ymd_opt(
          year, month, day
        )
      })
      .map(|date| DayCell {
        day: date.day(),
        date,
        has_tasks: task_days
          .contains(&date),
        is_today: date == today,
        is_selected: date
          == self.selected_date
      })
      .collect();

    MonthGrid {
      year,
      month,
      title: month_title(year, month),
      leading_blanks,
      days
    }
  }
}

pub fn month_title(
  year: i32,
  month: u32
) -> String {
  let name = MONTH_NAMES
    .get(month.saturating_sub(1) as usize)
    .copied()
    .unwrap_or("?");
  format!("{name} {year}")
}

pub fn format_day_label(
  date: NaiveDate
) -> String {
  let name = MONTH_NAMES_GENITIVE
    .get(date.month0() as usize)
    .copied()
    .unwrap_or("?");
  format!(
    "{} {name} {}",
    date.day(),
    date.year()
  )
}

fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  first_day_of_month(
    year,
    month as u32
  )
}

fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  let next = first_day_of_month(
    next_year, next_month
  );
  next
    .checked_sub_signed(Duration::days(
      1
    ))
    .unwrap_or(next)
}

fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::CalendarState;
  use crate::datetime::parse_wall;
  use crate::filter::FilterMode;
  use crate::task::{
    Task,
    TaskDraft
  };

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn dated_task(
    id: u64,
    when: &str
  ) -> Task {
    let now = Utc
      .with_ymd_and_hms(
        2024, 4, 30, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let mut draft =
      TaskDraft::new("dated");
    draft.date_time = parse_wall(when);
    Task::from_draft(
      id,
      "dated".to_string(),
      &draft,
      now
    )
  }

  #[test]
  fn may_2024_marks_task_days() {
    let state =
      CalendarState::new(date(
        2024, 5, 15
      ));
    let tasks = vec![
      dated_task(1, "2024-05-01T09:00"),
      dated_task(2, "2024-05-02T18:30"),
    ];

    let grid = state.month_grid(
      &tasks,
      date(2024, 5, 15)
    );
    assert_eq!(grid.title, "Май 2024");
    assert_eq!(grid.leading_blanks, 2);
    assert_eq!(grid.days.len(), 31);
    assert!(
      grid
        .cell(1)
        .expect("day 1")
        .has_tasks
    );
    assert!(
      grid
        .cell(2)
        .expect("day 2")
        .has_tasks
    );
    assert!(
      !grid
        .cell(3)
        .expect("day 3")
        .has_tasks
    );
    assert!(
      grid
        .cell(15)
        .expect("day 15")
        .is_today
    );
  }

  #[test]
  fn leading_blanks_follow_monday_start()
   {
    let mut state =
      CalendarState::new(date(
        2024, 9, 10
      ));
    let sunday_start =
      state.month_grid(&[], date(
        2024, 9, 10
      ));
    assert_eq!(
      sunday_start.leading_blanks,
      6
    );
    assert_eq!(
      sunday_start.weeks().len(),
      6
    );

    state.change_month(-2);
    let monday_start =
      state.month_grid(&[], date(
        2024, 9, 10
      ));
    assert_eq!(
      monday_start.month, 7
    );
    assert_eq!(
      monday_start.leading_blanks,
      0
    );
  }

  #[test]
  fn change_month_rolls_years() {
    let mut state =
      CalendarState::new(date(
        2024, 12, 31
      ));
    state.change_month(1);
    assert_eq!(
      state.current_month(),
      (2025, 1)
    );
    state.change_month(-13);
    assert_eq!(
      state.current_month(),
      (2023, 12)
    );
  }

  #[test]
  fn select_date_yields_date_filter() {
    let mut state =
      CalendarState::new(date(
        2024, 5, 1
      ));
    let mode = state
      .select_date(2024, 5, 2)
      .expect("valid selection");
    assert_eq!(
      mode,
      FilterMode::Date(date(
        2024, 5, 2
      ))
    );
    assert_eq!(
      state.selected_label(),
      "2 мая 2024"
    );
    assert!(
      state
        .select_date(2024, 2, 30)
        .is_err()
    );
  }
}
