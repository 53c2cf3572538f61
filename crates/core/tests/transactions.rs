use gravity_renamer_core::{
    commit, detect_conflicts, generate_preview, undo, CommitError, Conflict, FileSystem,
    JournalStore, OperationStatus, Pipeline, PlanError, PreviewItem, RealFileSystem, RuleDefinition,
    Stage,
};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

fn pipeline(json: &str) -> Pipeline {
    let definitions: Vec<RuleDefinition> = serde_json::from_str(json).expect("rules json");
    Pipeline::from_definitions(definitions).expect("valid pipeline")
}

fn touch(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            fs::write(&path, name.as_bytes()).expect("write fixture");
            path
        })
        .collect()
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
        .filter(|name| name != "journals")
        .collect();
    names.sort();
    names
}

// Real filesystem whose process "dies" on the rename after `limit` successful ones.
struct KillAfter {
    limit: usize,
    calls: AtomicUsize,
}

impl FileSystem for KillAfter {
    fn exists(&self, path: &Path) -> bool {
        RealFileSystem.exists(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.limit {
            panic!("simulated crash before renaming {}", from.display());
        }
        RealFileSystem.rename(from, to)
    }

    fn read_dir_names(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        RealFileSystem.read_dir_names(dir)
    }

    fn is_case_sensitive(&self, dir: &Path) -> bool {
        RealFileSystem.is_case_sensitive(dir)
    }
}

#[test]
fn strip_prefix_and_counter_commit_in_input_order() {
    let temp = tempdir().expect("tempdir");
    let store = JournalStore::new(temp.path().join("journals"));
    let files = touch(temp.path(), &["old_01.jpg", "old_02.jpg"]);
    let rules = pipeline(
        r#"[{"type":"strip_prefix","prefix":"old_"},
            {"type":"counter","start":1,"padding":2,"separator":"_","step":1}]"#,
    );

    let items = generate_preview(&files, &rules, &RealFileSystem).expect("preview");
    assert!(items.iter().all(|item| item.conflicts.is_empty()));
    assert_eq!(items[0].new_path, temp.path().join("01_01.jpg"));
    assert_eq!(items[1].new_path, temp.path().join("02_02.jpg"));

    let outcome = commit(&items, &RealFileSystem, &store).expect("commit");
    assert_eq!(outcome.applied, 2);
    assert_eq!(listing(temp.path()), vec!["01_01.jpg", "02_02.jpg"]);
    assert_eq!(
        fs::read(temp.path().join("01_01.jpg")).expect("read"),
        b"old_01.jpg"
    );

    let report = undo(&outcome.journal, &RealFileSystem).expect("undo");
    assert_eq!(report.reverted, 2);
    assert_eq!(listing(temp.path()), vec!["old_01.jpg", "old_02.jpg"]);
}

#[test]
fn shared_target_is_a_collision_and_commit_is_refused() {
    let temp = tempdir().expect("tempdir");
    let store = JournalStore::new(temp.path().join("journals"));
    let files = touch(temp.path(), &["a.txt", "b.txt"]);
    let rules = pipeline(r#"[{"type":"regex_replace","pattern":"^[ab]$","replacement":"c"}]"#);

    let items = generate_preview(&files, &rules, &RealFileSystem).expect("preview");
    let c = temp.path().join("c.txt");
    assert_eq!(
        items[0].conflicts,
        vec![Conflict::Collision {
            path: c.clone(),
            with: vec![files[1].clone()]
        }]
    );
    assert_eq!(
        items[1].conflicts,
        vec![Conflict::Collision {
            path: c,
            with: vec![files[0].clone()]
        }]
    );

    let err = commit(&items, &RealFileSystem, &store).expect_err("refused");
    assert!(matches!(err, CommitError::Plan(_)));
    assert_eq!(listing(temp.path()), vec!["a.txt", "b.txt"]);
    assert!(store.list().expect("list").is_empty());
}

#[test]
fn undo_after_crash_reverts_only_completed_operations() {
    let temp = tempdir().expect("tempdir");
    let store = JournalStore::new(temp.path().join("journals"));
    let names: Vec<String> = (0..100).map(|i| format!("f{i:03}.dat")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let files = touch(temp.path(), &refs);
    let rules = pipeline(r#"[{"type":"literal","text":"new_","position":"start"}]"#);
    let items = generate_preview(&files, &rules, &RealFileSystem).expect("preview");

    let crashing = KillAfter {
        limit: 40,
        calls: AtomicUsize::new(0),
    };
    let crashed = panic::catch_unwind(AssertUnwindSafe(|| commit(&items, &crashing, &store)));
    assert!(crashed.is_err(), "commit must not survive the crash");

    let journal_path = store.latest().expect("latest").expect("journal written");
    assert!(gravity_renamer_core::status_log_path(&journal_path).exists());
    let journal = store.load(&journal_path).expect("load");
    assert_eq!(journal.count(OperationStatus::Done), 40);
    assert_eq!(journal.count(OperationStatus::Started), 1);

    let report = undo(&journal_path, &RealFileSystem).expect("undo");
    assert_eq!(report.reverted, 40);
    assert_eq!(report.not_applied, 60);
    assert!(report.is_complete());
    assert_eq!(listing(temp.path()), names);

    assert!(!gravity_renamer_core::status_log_path(&journal_path).exists());
    let journal = store.load(&journal_path).expect("reload");
    assert_eq!(journal.count(OperationStatus::Reverted), 40);
    assert_eq!(journal.count(OperationStatus::Started), 0);
}

#[test]
fn regex_with_empty_replacement_strips_digits_or_warns() {
    let temp = tempdir().expect("tempdir");
    let files = touch(temp.path(), &["file123.png", "noNumbers.png"]);
    let rules = pipeline(r#"[{"type":"regex_replace","pattern":"\\d+","replacement":""}]"#);

    let items = generate_preview(&files, &rules, &RealFileSystem).expect("preview");
    assert_eq!(items[0].new_path, temp.path().join("file.png"));
    assert!(items[0].warnings.is_empty());
    assert_eq!(items[1].new_path, temp.path().join("noNumbers.png"));
    assert_eq!(items[1].warnings.len(), 1);
    assert!(items[1].warnings[0].contains("zero"));
    assert!(items.iter().all(|item| item.conflicts.is_empty()));
}

#[test]
fn swap_commits_through_temporary_and_undoes_twice_safely() {
    let temp = tempdir().expect("tempdir");
    let store = JournalStore::new(temp.path().join("journals"));
    let files = touch(temp.path(), &["a.txt", "b.txt"]);
    let mut items: Vec<PreviewItem> = vec![
        PreviewItem {
            original_path: files[0].clone(),
            new_path: files[1].clone(),
            conflicts: Vec::new(),
            warnings: Vec::new(),
        },
        PreviewItem {
            original_path: files[1].clone(),
            new_path: files[0].clone(),
            conflicts: Vec::new(),
            warnings: Vec::new(),
        },
    ];
    detect_conflicts(&mut items, &RealFileSystem);
    assert!(items.iter().all(|item| !item.is_blocked()));

    let outcome = commit(&items, &RealFileSystem, &store).expect("commit");
    assert_eq!(outcome.applied, 2);
    assert_eq!(outcome.operations, 3);
    assert_eq!(fs::read(&files[0]).expect("read a"), b"b.txt");
    assert_eq!(fs::read(&files[1]).expect("read b"), b"a.txt");
    assert_eq!(listing(temp.path()), vec!["a.txt", "b.txt"]);

    let journal = store.load(&outcome.journal).expect("load");
    assert_eq!(journal.operations[0].stage, Stage::ToTemporary);
    assert_eq!(journal.operations[2].stage, Stage::FromTemporary);

    let first = undo(&outcome.journal, &RealFileSystem).expect("undo");
    assert_eq!(first.reverted, 3);
    assert!(first.is_complete());
    assert_eq!(fs::read(&files[0]).expect("read a"), b"a.txt");
    assert_eq!(fs::read(&files[1]).expect("read b"), b"b.txt");

    let second = undo(&outcome.journal, &RealFileSystem).expect("undo again");
    assert_eq!(second.reverted, 0);
    assert_eq!(second.already_reverted, 3);
    assert_eq!(listing(temp.path()), vec!["a.txt", "b.txt"]);
}

#[test]
fn case_only_rename_round_trips() {
    let temp = tempdir().expect("tempdir");
    let store = JournalStore::new(temp.path().join("journals"));
    let files = touch(temp.path(), &["photo.jpg"]);
    let rules = pipeline(r#"[{"type":"case_transform","transform":"uppercase"}]"#);

    let items = generate_preview(&files, &rules, &RealFileSystem).expect("preview");
    assert_eq!(items[0].new_path, temp.path().join("PHOTO.jpg"));
    assert!(items[0].conflicts.is_empty());

    let outcome = commit(&items, &RealFileSystem, &store).expect("commit");
    assert_eq!(listing(temp.path()), vec!["PHOTO.jpg"]);

    undo(&outcome.journal, &RealFileSystem).expect("undo");
    assert_eq!(listing(temp.path()), vec!["photo.jpg"]);
}

#[test]
fn source_removed_after_preview_blocks_commit() {
    let temp = tempdir().expect("tempdir");
    let store = JournalStore::new(temp.path().join("journals"));
    let files = touch(temp.path(), &["a.txt", "b.txt"]);
    let rules = pipeline(r#"[{"type":"literal","text":"_x"}]"#);
    let items = generate_preview(&files, &rules, &RealFileSystem).expect("preview");

    fs::remove_file(&files[1]).expect("remove");
    let err = commit(&items, &RealFileSystem, &store).expect_err("stale preview");
    let CommitError::Plan(plan_err) = err else {
        panic!("expected plan refusal");
    };
    assert!(plan_err.to_string().contains("1 item"));
    let PlanError::BlockingConflicts { blocked, .. } = plan_err else {
        panic!("expected blocking conflicts");
    };
    assert_eq!(blocked[0].path, files[1]);
    assert_eq!(
        blocked[0].conflicts,
        vec![Conflict::SourceNotFound {
            path: files[1].clone()
        }]
    );
    assert_eq!(listing(temp.path()), vec!["a.txt"]);
}
