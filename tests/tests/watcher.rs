use std::{fs, thread, time::Duration};

use libretrace::{config::Config, engine::Operation};

use crate::retrace_test::workspace_util::{assert_ok, wait_until, TestWorkspace};

const TIMEOUT: Duration = Duration::from_secs(5);

fn watched() -> TestWorkspace {
    TestWorkspace::with_config(Config {
        watch: true,
        ..Config::default()
    })
}

#[test]
fn external_delete_drops_stale_history() {
    let test = watched();
    let boundary = test.workspace().boundary();
    let path = test.path("notes.txt");

    assert_ok(&boundary.perform(test.caller(), Operation::CreateFile { path: path.clone() }));
    assert!(boundary.get_state(test.caller()).can_undo);

    fs::remove_file(&path).unwrap();

    assert!(
        wait_until(TIMEOUT, || !boundary.get_state(test.caller()).can_undo),
        "history still references a deleted file"
    );
}

#[test]
fn own_changes_keep_history() {
    let test = watched();
    let boundary = test.workspace().boundary();
    test.write("draft.txt", "hello");

    assert_ok(&boundary.perform(
        test.caller(),
        Operation::Rename {
            path: test.path("draft.txt"),
            new_name: "final.txt".to_owned(),
        },
    ));
    assert!(boundary.undo(test.caller()).success);

    // Give the debouncer time to deliver the events for both renames.
    thread::sleep(Duration::from_millis(500));

    assert!(boundary.get_state(test.caller()).can_redo);
    assert!(boundary.redo(test.caller()).success);
    assert_eq!(test.read("final.txt"), "hello");
}
