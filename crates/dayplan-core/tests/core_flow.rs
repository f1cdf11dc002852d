use std::fs;

use chrono::{DateTime, Duration, TimeZone, Utc};
use dayplan_core::datastore::{RECORD_FILE, TaskStore};
use dayplan_core::datetime::{parse_wall, project_timezone};
use dayplan_core::filter::FilterMode;
use dayplan_core::stats::Stats;
use dayplan_core::task::{Priority, SubtaskDraft, SubtaskId, TaskDraft};
use tempfile::tempdir;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).single().expect("valid now")
}

fn draft(title: &str, when: Option<&str>, priority: Priority) -> TaskDraft {
    let mut draft = TaskDraft::new(title);
    draft.date_time = when.and_then(parse_wall);
    draft.priority = priority;
    draft
}

#[test]
fn add_buy_milk_updates_counts() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");

    let task = store
        .add(&draft("Buy milk", Some("2024-05-01T09:00"), Priority::Low), now())
        .expect("add task");
    assert_eq!(task.id, u64::try_from(now().timestamp_millis()).expect("positive millis"));
    assert!(!task.completed);
    assert!(task.completed_at.is_none());
    assert_eq!(task.created_at, now());

    let tasks = store.load();
    let stats = Stats::from_tasks(&tasks);
    assert_eq!((stats.total, stats.pending, stats.completed), (1, 1, 0));
    assert_eq!(tasks[0].priority, Priority::Low);
}

#[test]
fn blank_title_leaves_list_unchanged() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");
    store.add(&TaskDraft::new("keep me"), now()).expect("add task");

    assert!(store.add(&TaskDraft::new("   \t"), now()).is_err());
    assert_eq!(store.load().len(), 1);

    let id = store.load()[0].id;
    assert!(store.edit(id, &TaskDraft::new(""), now()).is_err());
    assert_eq!(store.load()[0].title, "keep me");
}

#[test]
fn newest_task_comes_first_and_ids_stay_unique() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");

    let first = store.add(&TaskDraft::new("first"), now()).expect("add first");
    let second = store.add(&TaskDraft::new("second"), now()).expect("add second");
    assert_ne!(first.id, second.id);

    let titles: Vec<String> = FilterMode::All
        .apply(&store.load())
        .into_iter()
        .map(|task| task.title)
        .collect();
    assert_eq!(titles, vec!["second", "first"]);
}

#[test]
fn subtasks_drive_parent_completion() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");

    let mut with_subtasks = TaskDraft::new("Trip");
    with_subtasks.subtasks = vec![
        SubtaskDraft::new("Tickets", parse_wall("2024-05-02T10:00")),
        SubtaskDraft::new("Hotel", None),
    ];
    let task = store.add(&with_subtasks, now()).expect("add task");
    let first = task.subtasks[0].id.clone();
    let second = task.subtasks[1].id.clone();
    assert_ne!(first, second);

    let later = now() + Duration::minutes(5);
    assert!(store.toggle_subtask_complete(task.id, &first, later).expect("toggle first"));
    assert!(!store.get(task.id).expect("task").completed);

    assert!(store.toggle_subtask_complete(task.id, &second, later).expect("toggle second"));
    let done = store.get(task.id).expect("task");
    assert!(done.completed);
    assert_eq!(done.completed_at, Some(later));

    // ids typed on the command line arrive as text
    let as_text = SubtaskId::Text(first.to_string());
    assert!(store.toggle_subtask_complete(task.id, &as_text, later).expect("toggle back"));
    let reopened = store.get(task.id).expect("task");
    assert!(!reopened.completed);
    assert!(reopened.completed_at.is_none());
}

#[test]
fn plain_task_toggles_directly() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");
    let task = store.add(&TaskDraft::new("plain"), now()).expect("add task");

    assert!(store.toggle_complete(task.id, now()).expect("toggle"));
    let toggled = store.get(task.id).expect("task");
    assert!(toggled.completed);
    assert_eq!(toggled.completed_at, Some(now()));

    assert!(store.toggle_complete(task.id, now()).expect("toggle back"));
    assert!(store.get(task.id).expect("task").completed_at.is_none());
}

#[test]
fn lookup_misses_are_silent_noops() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");
    let task = store.add(&TaskDraft::new("only"), now()).expect("add task");
    let before = fs::read_to_string(&store.record_path).expect("read record");

    assert!(!store.toggle_complete(task.id + 1, now()).expect("toggle miss"));
    let missing = SubtaskId::Text("nope".to_string());
    assert!(!store.toggle_subtask_complete(task.id, &missing, now()).expect("subtask miss"));
    assert!(!store.edit(task.id + 1, &TaskDraft::new("x"), now()).expect("edit miss"));
    assert!(!store.delete(task.id + 1).expect("delete miss"));

    let after = fs::read_to_string(&store.record_path).expect("read record");
    assert_eq!(before, after);
}

#[test]
fn delete_then_lookup_is_not_found() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");
    let doomed = store.add(&TaskDraft::new("doomed"), now()).expect("add task");
    store.add(&TaskDraft::new("kept"), now()).expect("add task");

    assert!(store.delete(doomed.id).expect("delete"));
    assert!(store.get(doomed.id).is_none());
    assert_eq!(store.load().len(), 1);
    assert!(!store.delete(doomed.id).expect("delete again"));
}

#[test]
fn edit_replaces_fields_and_keeps_identity() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");
    let mut original = draft("Draft", Some("2024-05-01T09:00"), Priority::Low);
    original.subtasks = vec![SubtaskDraft::new("one", None)];
    let task = store.add(&original, now()).expect("add task");

    let mut changed = draft("  Final  ", Some("2024-05-03T12:00"), Priority::High);
    changed.description = " details ".to_string();
    changed.subtasks = vec![
        SubtaskDraft {
            id: Some(task.subtasks[0].id.clone()),
            title: "one".to_string(),
            deadline: None,
            completed: true,
        },
        SubtaskDraft::new("two", None),
        SubtaskDraft::new("  ", None),
    ];
    let later = now() + Duration::hours(1);
    assert!(store.edit(task.id, &changed, later).expect("edit"));

    let edited = store.get(task.id).expect("task");
    assert_eq!(edited.id, task.id);
    assert_eq!(edited.created_at, task.created_at);
    assert_eq!(edited.title, "Final");
    assert_eq!(edited.description, "details");
    assert_eq!(edited.priority, Priority::High);
    assert_eq!(edited.subtasks.len(), 2);
    assert_eq!(edited.subtasks[0].id, task.subtasks[0].id);
    assert!(edited.subtasks[0].completed);
    assert!(!edited.completed);
}

#[test]
fn malformed_record_loads_as_empty() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");
    assert!(store.load().is_empty());

    fs::write(temp.path().join(RECORD_FILE), "{not json").expect("write garbage");
    assert!(store.load().is_empty());

    fs::write(temp.path().join(RECORD_FILE), "   \n").expect("write blank");
    assert!(store.load().is_empty());
}

#[test]
fn record_from_a_form_round_trips() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");
    let raw = r#"[{
        "id": 1714550400000,
        "title": "Imported",
        "description": "",
        "dateTime": "",
        "priority": "high",
        "completed": false,
        "createdAt": "2024-05-01T06:00:00Z",
        "completedAt": null,
        "subtasks": [
            {"id": "1714550400000.25", "title": "a", "deadline": "", "completed": true},
            {"id": 1714550400001.5, "title": "b", "deadline": "2024-05-02T08:00", "completed": false}
        ],
        "pinned": true
    }, {
        "id": 1714550300000,
        "title": "Saved by the form",
        "description": "",
        "dateTime": "2024-05-01T09:00",
        "priority": "medium",
        "completed": true,
        "createdAt": "01.05.2024, 09:00:00",
        "completedAt": "01.05.2024, 10:30:00",
        "subtasks": []
    }]"#;
    fs::write(temp.path().join(RECORD_FILE), raw).expect("write record");

    let tasks = store.load();
    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].date_time.is_none());
    let form_created = project_timezone()
        .from_local_datetime(&parse_wall("2024-05-01T09:00").expect("wall time"))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc));
    assert_eq!(Some(tasks[1].created_at), form_created);
    assert!(tasks[1].completed_at.is_some());
    assert!(tasks[0].subtasks[0].deadline.is_none());

    let numeric: SubtaskId = serde_json::from_str("1714550400001.5").expect("numeric id");
    assert!(store.toggle_subtask_complete(1714550400000, &numeric, now()).expect("toggle"));

    let reloaded = store.load();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(Some(reloaded[1].created_at), form_created);
    assert!(reloaded[0].completed);
    assert_eq!(reloaded[0].extra.get("pinned"), Some(&serde_json::json!(true)));
}

#[test]
fn pending_plus_completed_is_total() {
    let temp = tempdir().expect("tempdir");
    let store = TaskStore::open(temp.path()).expect("open store");
    for title in ["a", "b", "c"] {
        store.add(&TaskDraft::new(title), now()).expect("add task");
    }
    let id = store.load()[1].id;
    store.toggle_complete(id, now()).expect("toggle");

    let stats = store.save(&store.load()).expect("save");
    assert_eq!(stats.pending + stats.completed, stats.total);
    assert_eq!(stats.completed, 1);
    assert!((stats.percent() - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(Stats::default().percent(), 0.0);
}
