use chrono::{Local, TimeZone};
use gravity_renamer_core::{
    commit, detect_conflicts, undo, FileMetadata, JournalStore, Pipeline, PreviewItem,
    RealFileSystem, RuleDefinition,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use tempfile::tempdir;

fn rule_pool() -> Vec<RuleDefinition> {
    let raw = r##"[
        {"type":"strip_prefix","prefix":"img"},
        {"type":"strip_suffix","suffix":"_x"},
        {"type":"filter_content","filter":"symbols"},
        {"type":"regex_replace","pattern":"[0-9]+","replacement":"#"},
        {"type":"literal","text":"-","position":"index","index":3},
        {"type":"counter","start":-5,"step":3,"padding":4,"separator":"_"},
        {"type":"case_transform","transform":"titlecase"},
        {"type":"case_transform","transform":"snakecase"},
        {"type":"date_insertion","format":"%Y%m%d","source":"exif","position":"start"}
    ]"##;
    serde_json::from_str(raw).expect("rule pool json")
}

fn pipeline_strategy() -> impl Strategy<Value = Pipeline> {
    proptest::sample::subsequence(rule_pool(), 0..=6)
        .prop_shuffle()
        .prop_map(|rules| Pipeline::from_definitions(rules).expect("pool rules are valid"))
}

proptest! {
    #[test]
    fn evaluation_is_deterministic(
        pipeline in pipeline_strategy(),
        name in "[a-zA-Z0-9_ .-]{0,16}",
        ordinal in 0usize..10_000,
        include_extension in any::<bool>(),
    ) {
        let pipeline = pipeline.with_extension(include_extension);
        let now = Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).single().expect("valid time");
        let mut metadata = FileMetadata::at(now);
        metadata.modified = Some(now);

        let first = pipeline.evaluate(&name, ordinal, &metadata);
        let second = pipeline.evaluate(&name, ordinal, &metadata);
        prop_assert_eq!(first, second);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn distinct_fresh_targets_have_no_conflicts(
        names in proptest::collection::btree_set("[a-z]{1,8}", 1..12),
    ) {
        let temp = tempdir().expect("tempdir");
        let mut items: Vec<PreviewItem> = names
            .iter()
            .map(|name| {
                let original = temp.path().join(format!("{name}.dat"));
                fs::write(&original, name.as_bytes()).expect("write");
                PreviewItem {
                    original_path: original,
                    new_path: temp.path().join(format!("renamed_{name}.dat")),
                    conflicts: Vec::new(),
                    warnings: Vec::new(),
                }
            })
            .collect();

        detect_conflicts(&mut items, &RealFileSystem);
        for item in &items {
            prop_assert!(item.conflicts.is_empty(), "{:?}", item.conflicts);
        }
    }

    #[test]
    fn any_permutation_commits_and_undoes_exactly(
        order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let temp = tempdir().expect("tempdir");
        let store = JournalStore::new(temp.path().join("journals"));
        let path = |i: usize| temp.path().join(format!("f{i}"));
        for i in 0..order.len() {
            fs::write(path(i), i.to_string()).expect("write");
        }
        let items: Vec<PreviewItem> = order
            .iter()
            .enumerate()
            .map(|(from, &to)| PreviewItem {
                original_path: path(from),
                new_path: path(to),
                conflicts: Vec::new(),
                warnings: Vec::new(),
            })
            .collect();

        let outcome = commit(&items, &RealFileSystem, &store).expect("commit");
        for (from, &to) in order.iter().enumerate() {
            prop_assert_eq!(fs::read_to_string(path(to)).expect("read"), from.to_string());
        }

        let report = undo(&outcome.journal, &RealFileSystem).expect("undo");
        prop_assert!(report.is_complete());
        prop_assert_eq!(report.reverted, outcome.operations);
        for i in 0..order.len() {
            prop_assert_eq!(fs::read_to_string(path(i)).expect("read"), i.to_string());
        }
        let names: BTreeSet<String> = fs::read_dir(temp.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        prop_assert_eq!(names.len(), order.len() + 1, "no temporaries left behind");

        let again = undo(&outcome.journal, &RealFileSystem).expect("undo again");
        prop_assert_eq!(again.already_reverted, outcome.operations);
        prop_assert_eq!(again.reverted, 0);
    }
}
