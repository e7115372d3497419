use insta::assert_snapshot;
use pretty_assertions::assert_eq;

use libretrace::{
    boundary::HistoryState, config::Config, elevated::OperationDescriptor, engine::Operation,
    SessionId,
};

use crate::retrace_test::workspace_util::{assert_ok, TestWorkspace};

#[test]
fn untrusted_caller_gets_inert_results() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();
    let stranger = SessionId::new();
    let path = test.path("notes.txt");

    assert_ok(&boundary.perform(test.caller(), Operation::CreateFile { path: path.clone() }));

    assert_snapshot!(boundary.undo(stranger).error.unwrap(), @"cannot undo");
    assert_snapshot!(boundary.redo(stranger).error.unwrap(), @"cannot redo");
    assert_eq!(
        boundary.get_state(stranger),
        HistoryState {
            can_undo: false,
            can_redo: false,
        }
    );
    assert_eq!(boundary.invalidate(stranger, &path), 0);

    let result = boundary.perform(
        stranger,
        Operation::CreateFile {
            path: test.path("other.txt"),
        },
    );
    assert!(!result.success);
    assert!(!test.path("other.txt").exists());

    let result = boundary.execute_elevated(stranger, &OperationDescriptor::delete(&path));
    assert_snapshot!(result.error.unwrap(), @"untrusted caller");

    assert!(path.is_file());
    assert!(boundary.get_state(test.caller()).can_undo);
}

#[test]
fn unsafe_names_are_rejected_before_any_change() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();
    test.write("draft.txt", "hello");

    for name in [".", "..", "a/b"] {
        let result = boundary.perform(
            test.caller(),
            Operation::Rename {
                path: test.path("draft.txt"),
                new_name: name.to_owned(),
            },
        );
        assert_eq!(result.error.as_deref(), Some("Invalid name"), "name {name:?}");
    }

    assert_eq!(test.read("draft.txt"), "hello");
    assert!(!boundary.get_state(test.caller()).can_undo);
}

#[test]
fn root_confines_operations() {
    let allowed = tempfile::tempdir().unwrap();
    let test = TestWorkspace::with_config(Config {
        watch: false,
        root: Some(allowed.path().to_path_buf()),
        ..Config::default()
    });
    let boundary = test.workspace().boundary();

    let result = boundary.perform(
        test.caller(),
        Operation::CreateFile {
            path: test.path("escape.txt"),
        },
    );
    assert_snapshot!(result.error.unwrap(), @"Invalid destination path");
    assert!(!test.path("escape.txt").exists());

    assert_ok(&boundary.perform(
        test.caller(),
        Operation::CreateFile {
            path: allowed.path().join("inside.txt"),
        },
    ));
    assert!(allowed.path().join("inside.txt").is_file());
}

#[test]
fn execute_elevated_is_not_recorded() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();
    test.write("a.txt", "a");

    let result = boundary.execute_elevated(
        test.caller(),
        &OperationDescriptor::copy(test.path("a.txt"), test.path("b.txt")),
    );
    assert_ok(&result);
    assert!(!result.elevated);
    assert_eq!(test.read("b.txt"), "a");

    assert_ok(&boundary.execute_elevated(
        test.caller(),
        &OperationDescriptor::delete(test.path("a.txt")),
    ));
    assert!(!test.path("a.txt").exists());

    assert!(!boundary.get_state(test.caller()).can_undo);
}

#[test]
fn reset_forgets_history() {
    let test = TestWorkspace::new();
    let boundary = test.workspace().boundary();

    assert_ok(&boundary.perform(
        test.caller(),
        Operation::CreateFolder {
            path: test.path("assets"),
        },
    ));
    assert!(boundary.reset(test.caller()).success);

    assert_eq!(
        boundary.get_state(test.caller()),
        HistoryState {
            can_undo: false,
            can_redo: false,
        }
    );
    assert!(test.path("assets").is_dir());
}
