use std::{
    fs,
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use tempfile::{tempdir, TempDir};

use libretrace::{boundary::OperationResult, config::Config, workspace::Workspace, SessionId};

/// A workspace in a fresh temporary directory, with the session token of its
/// trusted caller.
pub struct TestWorkspace {
    // Declared before `dir` so the watcher stops before the directory goes.
    workspace: Workspace,
    caller: SessionId,
    dir: TempDir,
}

impl TestWorkspace {
    /// Opens a workspace that does not watch for outside changes.
    pub fn new() -> Self {
        Self::with_config(Config {
            watch: false,
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> Self {
        let dir = tempdir().expect("Couldn't create temporary directory");
        let workspace = Workspace::open_with_consent(dir.path(), &config, None)
            .expect("Couldn't open workspace");
        let caller = workspace.boundary().session_id();

        Self {
            workspace,
            caller,
            dir,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn caller(&self) -> SessionId {
        self.caller
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn mkdir(&self, relative: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }
}

#[track_caller]
pub fn assert_ok(result: &OperationResult) {
    assert!(result.success, "operation failed: {:?}", result.error);
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    condition()
}
