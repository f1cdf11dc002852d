use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dayplan",
    version,
    about = "Daily task planner with subtasks and a calendar view",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "dayplanrc")]
    pub dayplanrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Fields shared by `add` and `edit`. Dates accept anything the date parser
/// understands (`2024-05-01T09:00`, `tomorrow`, `friday`, `+2d`, ...).
#[derive(Args, Debug, Clone, Default)]
pub struct TaskFields {
    #[arg(short = 'd', long = "description")]
    pub description: Option<String>,

    #[arg(long = "due", conflicts_with = "no_due")]
    pub due: Option<String>,

    #[arg(long = "no-due")]
    pub no_due: bool,

    #[arg(short = 'p', long = "priority")]
    pub priority: Option<String>,

    /// Subtask as `TITLE` or `TITLE@DEADLINE`; repeatable.
    #[arg(short = 's', long = "subtask", action = ArgAction::Append)]
    pub subtasks: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task.
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// Show tasks matching a filter (all, pending, completed, date:<date>).
    #[command(visible_alias = "ls")]
    List {
        #[arg(short = 'f', long = "filter")]
        filter: Option<String>,
    },

    /// Show one task with its subtasks.
    Info { id: u64 },

    /// Toggle completion of a task.
    #[command(visible_alias = "toggle")]
    Done { id: u64 },

    /// Toggle completion of a subtask.
    Subtask { task_id: u64, subtask_id: String },

    /// Change a task. `--subtask` replaces the whole subtask list.
    Edit {
        id: u64,

        #[arg(short = 't', long = "title")]
        title: Option<String>,

        #[command(flatten)]
        fields: TaskFields,

        #[arg(long = "clear-subtasks", conflicts_with = "subtasks")]
        clear_subtasks: bool,
    },

    /// Remove a task.
    #[command(visible_alias = "rm")]
    Delete {
        id: u64,

        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },

    /// Month grid with task markers; `--select` also lists that day's tasks.
    #[command(visible_alias = "cal")]
    Calendar {
        /// Month to show as `YYYY-MM`.
        #[arg(long = "month")]
        month: Option<String>,

        /// Months to move from the shown month, e.g. `-1` or `2`.
        #[arg(long = "shift", allow_hyphen_values = true)]
        shift: Option<i32>,

        #[arg(long = "select")]
        select: Option<String>,
    },

    /// Totals and completion percentage.
    Stats,

    /// Write a CSV report of every task.
    Export {
        #[arg(short = 'o', long = "output", default_value = ".")]
        output: PathBuf,
    },

    /// Print effective configuration.
    Config,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                rest.split_once(':')
                    .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// Splits `TITLE@DEADLINE` on the last `@`.
pub fn split_subtask_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.rsplit_once('@') {
        Some((title, deadline)) if !deadline.trim().is_empty() => (title, Some(deadline)),
        _ => (spec, None),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, preprocess_args, split_subtask_spec};

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let raw: Vec<OsString> = ["dayplan", "rc.color=off", "list", "rc.default.filter:pending"]
            .iter()
            .map(OsString::from)
            .collect();
        let pre = preprocess_args(&raw).expect("preprocess");
        assert_eq!(pre.cleaned_args, vec![OsString::from("dayplan"), OsString::from("list")]);
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.default.filter".to_string(), "pending".to_string()),
            ]
        );
    }

    #[test]
    fn add_collects_title_words_and_subtasks() {
        let cli = GlobalCli::parse_from([
            "dayplan", "add", "Buy", "milk", "-p", "low", "-s", "Shop@2024-05-01T08:00", "-s", "Pay",
        ]);
        let Some(Command::Add { title, fields }) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(title.join(" "), "Buy milk");
        assert_eq!(fields.priority.as_deref(), Some("low"));
        assert_eq!(fields.subtasks.len(), 2);
    }

    #[test]
    fn subtask_spec_splits_on_last_at() {
        assert_eq!(split_subtask_spec("mail a@b@friday"), ("mail a@b", Some("friday")));
        assert_eq!(split_subtask_spec("plain"), ("plain", None));
        assert_eq!(split_subtask_spec("trailing@"), ("trailing@", None));
    }

    #[test]
    fn calendar_shift_accepts_negative() {
        let cli = GlobalCli::parse_from(["dayplan", "calendar", "--shift", "-1"]);
        let Some(Command::Calendar { shift, .. }) = cli.command else {
            panic!("expected calendar command");
        };
        assert_eq!(shift, Some(-1));
    }
}
