use std::fs;

use insta::assert_snapshot;
use pretty_assertions::assert_eq;

use libretrace::{action::Action, boundary::HistoryState, engine::Operation};

use crate::retrace_test::workspace_util::{assert_ok, TestWorkspace};

#[test]
fn create_file_round_trip() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();
    let path = test.path("notes.txt");

    assert_ok(&boundary.perform(test.caller(), Operation::CreateFile { path: path.clone() }));
    assert!(path.is_file());

    assert!(boundary.undo(test.caller()).success);
    assert!(!path.exists());

    assert!(boundary.redo(test.caller()).success);
    assert!(path.is_file());

    assert_eq!(
        boundary.get_state(test.caller()),
        HistoryState {
            can_undo: true,
            can_redo: false,
        }
    );
}

#[test]
fn create_folder_undo_refuses_new_contents() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();
    let path = test.path("assets");

    assert_ok(&boundary.perform(test.caller(), Operation::CreateFolder { path: path.clone() }));
    test.write("assets/logo.png", "png");

    let result = boundary.undo(test.caller());
    assert!(!result.success);
    assert_snapshot!(result.error.unwrap(), @"assets is no longer empty");

    assert!(path.join("logo.png").is_file());
    assert!(boundary.get_state(test.caller()).can_undo);
}

#[test]
fn rename_round_trip_keeps_contents() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();
    test.write("draft.txt", "hello");

    assert_ok(&boundary.perform(
        test.caller(),
        Operation::Rename {
            path: test.path("draft.txt"),
            new_name: "final.txt".to_owned(),
        },
    ));
    assert_eq!(test.read("final.txt"), "hello");

    assert!(boundary.undo(test.caller()).success);
    assert_eq!(test.read("draft.txt"), "hello");
    assert!(!test.path("final.txt").exists());

    assert!(boundary.redo(test.caller()).success);
    assert_eq!(test.read("final.txt"), "hello");
}

#[test]
fn rename_undo_fails_when_old_name_is_taken() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();
    test.write("draft.txt", "first");

    assert_ok(&boundary.perform(
        test.caller(),
        Operation::Rename {
            path: test.path("draft.txt"),
            new_name: "final.txt".to_owned(),
        },
    ));
    test.write("draft.txt", "second");

    let result = boundary.undo(test.caller());
    assert_snapshot!(result.error.unwrap(), @"draft.txt already exists");
    assert_eq!(test.read("draft.txt"), "second");
    assert_eq!(test.read("final.txt"), "first");
}

#[test]
fn move_batch_round_trip() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();
    test.write("src/a.txt", "a");
    test.write("src/nested/b.txt", "b");
    test.mkdir("dest");

    assert_ok(&boundary.perform(
        test.caller(),
        Operation::Move {
            sources: vec![test.path("src/a.txt"), test.path("src/nested")],
            dest_dir: test.path("dest"),
        },
    ));
    assert_eq!(test.read("dest/a.txt"), "a");
    assert_eq!(test.read("dest/nested/b.txt"), "b");

    assert!(boundary.undo(test.caller()).success);
    assert_eq!(test.read("src/a.txt"), "a");
    assert_eq!(test.read("src/nested/b.txt"), "b");
    assert!(fs::read_dir(test.path("dest")).unwrap().next().is_none());

    assert!(boundary.redo(test.caller()).success);
    assert_eq!(test.read("dest/nested/b.txt"), "b");
}

#[test]
fn move_records_the_part_that_happened() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();
    test.write("src/a.txt", "a");
    test.write("src/b.txt", "b");
    test.write("dest/b.txt", "taken");

    let result = boundary.perform(
        test.caller(),
        Operation::Move {
            sources: vec![test.path("src/a.txt"), test.path("src/b.txt")],
            dest_dir: test.path("dest"),
        },
    );
    assert!(!result.success);
    assert_eq!(test.read("dest/a.txt"), "a");
    assert_eq!(test.read("src/b.txt"), "b");

    let history = boundary.history();
    let recorded: Vec<Action> = history.lock().unwrap().undo_entries().cloned().collect();
    assert_eq!(
        recorded,
        vec![Action::Move {
            source_paths: vec![test.path("dest/a.txt")],
            original_paths: Some(vec![test.path("src/a.txt")]),
            original_parent: Some(test.path("src")),
            dest_path: test.path("dest"),
        }]
    );

    assert!(boundary.undo(test.caller()).success);
    assert_eq!(test.read("src/a.txt"), "a");
    assert_eq!(test.read("dest/b.txt"), "taken");
}

#[test]
fn new_operation_clears_redo() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();

    assert_ok(&boundary.perform(
        test.caller(),
        Operation::CreateFile {
            path: test.path("one.txt"),
        },
    ));
    assert!(boundary.undo(test.caller()).success);
    assert!(boundary.get_state(test.caller()).can_redo);

    assert_ok(&boundary.perform(
        test.caller(),
        Operation::CreateFile {
            path: test.path("two.txt"),
        },
    ));
    assert!(!boundary.get_state(test.caller()).can_redo);
    assert_snapshot!(boundary.redo(test.caller()).error.unwrap(), @"Nothing to redo");
}
