use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Timelike,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "dayplan-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DAYPLAN_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "DAYPLAN_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "Europe/Moscow";

/// Storage format of wall-clock values,
/// the shape a `datetime-local` input
/// produces.
pub const WALL_FORMAT: &str =
  "%Y-%m-%dT%H:%M";

const WALL_INPUT_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%d.%m.%Y %H:%M",
  "%d.%m.%Y, %H:%M",
  "%d.%m.%Y %H:%M:%S",
  "%d.%m.%Y, %H:%M:%S"
];

const LOCALE_TIMESTAMP_FORMATS: &[&str] = &[
  "%d.%m.%Y, %H:%M:%S",
  "%d.%m.%Y %H:%M:%S",
  "%d.%m.%Y, %H:%M"
];

const DATE_INPUT_FORMATS: &[&str] =
  &["%Y-%m-%d", "%d.%m.%Y"];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

/// Wall-clock "now" in the project
/// timezone.
#[must_use]
pub fn project_now(
  now: DateTime<Utc>
) -> NaiveDateTime {
  now
    .with_timezone(project_timezone())
    .naive_local()
}

#[must_use]
pub fn project_today(
  now: DateTime<Utc>
) -> NaiveDate {
  project_now(now).date()
}

#[must_use]
pub fn format_project_timestamp(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(project_timezone())
    .format("%d.%m.%Y, %H:%M:%S")
    .to_string()
}

#[must_use]
pub fn format_wall(
  dt: NaiveDateTime
) -> String {
  dt.format(WALL_FORMAT).to_string()
}

#[must_use]
pub fn format_wall_display(
  dt: NaiveDateTime
) -> String {
  dt.format("%d.%m.%Y %H:%M")
    .to_string()
}

pub fn parse_wall(
  raw: &str
) -> Option<NaiveDateTime> {
  let trimmed = raw.trim();
  WALL_INPUT_FORMATS.iter().find_map(
    |fmt| {
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
      .ok()
    }
  )
}

/// Reads an instant either as RFC 3339
/// or in the `dd.mm.yyyy, HH:MM:SS`
/// locale form, which is taken as wall
/// time in the project timezone.
pub fn parse_project_timestamp(
  raw: &str
) -> Option<DateTime<Utc>> {
  let trimmed = raw.trim();
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    return Some(dt.with_timezone(&Utc));
  }

  let naive = LOCALE_TIMESTAMP_FORMATS
    .iter()
    .find_map(|fmt| {
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
      .ok()
    })?;
  project_timezone()
    .from_local_datetime(&naive)
    .earliest()
    .map(|dt| dt.with_timezone(&Utc))
}

fn parse_plain_date(
  raw: &str
) -> Option<NaiveDate> {
  let trimmed = raw.trim();
  DATE_INPUT_FORMATS.iter().find_map(
    |fmt| {
      NaiveDate::parse_from_str(
        trimmed, fmt
      )
      .ok()
    }
  )
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses a user-supplied date or
/// date-time into a wall-clock value in
/// the project timezone. Bare dates
/// resolve to midnight.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<NaiveDateTime> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let local_now = project_now(now);
  let today = local_now.date();

  match lower.as_str() {
    | "now" => {
      return Ok(truncate_to_minute(
        local_now
      ));
    }
    | "today" => {
      return Ok(midnight(today));
    }
    | "tomorrow" => {
      return Ok(midnight(add_days(
        today, 1
      )));
    }
    | "yesterday" => {
      return Ok(midnight(add_days(
        today, -1
      )));
    }
    | _ => {}
  }

  if let Some(dt) = parse_wall(token) {
    return Ok(dt);
  }

  if let Some(date) =
    parse_plain_date(token)
  {
    return Ok(midnight(date));
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(midnight(
      next_weekday_date(
        today,
        target_weekday
      )
    ));
  }

  if let Some((hour, minute)) =
    parse_clock_time(token)
  {
    let mut day = today;
    let candidate = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct clock \
           time candidate"
        )
      })?;
    if candidate <= local_now {
      day = add_days(day, 1);
    }
    return day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct next \
           clock time candidate"
        )
      });
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative amount"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let delta = match unit {
      | "d" => Duration::try_days(num),
      | "h" => Duration::try_hours(num),
      | _ => Duration::try_minutes(num)
    };
    let base =
      truncate_to_minute(local_now);
    let shifted =
      delta.and_then(|delta| {
        if sign == "-" {
          base.checked_sub_signed(delta)
        } else {
          base.checked_add_signed(delta)
        }
      });
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative date out of range: \
         {token}"
      )
    });
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {token}"
  ))
}

fn midnight(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(chrono::NaiveTime::MIN)
}

fn truncate_to_minute(
  dt: NaiveDateTime
) -> NaiveDateTime {
  dt.with_second(0)
    .and_then(|d| d.with_nanosecond(0))
    .unwrap_or(dt)
}

fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let current = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let wanted =
    target.num_days_from_monday()
      as i64;
  let mut delta =
    (wanted - current + 7) % 7;
  if delta == 0 {
    delta = 7;
  }
  add_days(from, delta)
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    let pm = ampm_match
      .as_str()
      .eq_ignore_ascii_case("pm");
    match (pm, raw_hour) {
      | (false, 12) => 0,
      | (true, 12) => 12,
      | (true, h) => h + 12,
      | (false, h) => h
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

/// Serde adapter for wall-clock values.
/// Reading accepts every input format
/// above; writing always uses
/// [`WALL_FORMAT`].
pub mod wall_datetime_serde {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &NaiveDateTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_wall(*dt)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_wall(&raw).ok_or_else(
      || {
        serde::de::Error::custom(
          format!(
            "invalid date-time: {raw}"
          )
        )
      }
    )
  }

  /// Empty strings and `null` both
  /// read as `None`.
  pub mod option {
    use chrono::NaiveDateTime;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<NaiveDateTime>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveDateTime>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw)
          if raw.trim().is_empty() =>
        {
          Ok(None)
        }
        | Some(raw) => {
          crate::datetime::parse_wall(
            &raw
          )
          .map(Some)
          .ok_or_else(|| {
            serde::de::Error::custom(
              format!(
                "invalid date-time: \
                 {raw}"
              )
            )
          })
        }
        | None => Ok(None)
      }
    }
  }
}

/// Serde adapter for instants such as
/// `createdAt`. Writing uses RFC 3339;
/// reading also takes the locale form.
pub mod project_timestamp_serde {
  use chrono::{
    DateTime,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::AutoSi,
        true
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_project_timestamp(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid timestamp: {raw}"
          )
        )
      })
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw)
          if raw.trim().is_empty() =>
        {
          Ok(None)
        }
        | Some(raw) => {
          crate::datetime::parse_project_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| {
              serde::de::Error::custom(
                format!(
                  "invalid timestamp: \
                   {raw}"
                )
              )
            })
        }
        | None => Ok(None)
      }
    }
  }
}
