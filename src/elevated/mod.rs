//! Running mutations with a privileged fallback.
//!
//! Every mutation is described by an [`OperationDescriptor`], validated, and
//! then attempted directly. Only a permission failure leads to asking the
//! user for consent and handing the same descriptor to a
//! [`PrivilegedExecutor`].

mod consent;
mod descriptor;
mod executor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fsops::FsError;
use thiserror::Error;

pub use self::consent::{LineInput, TerminalConsent};
pub use self::descriptor::{
    is_safe_name, is_safe_path, OperationDescriptor, OperationKind, ValidationError,
};
pub use self::executor::HelperProcessExecutor;

/// The outcome reported by a privileged executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorResult {
    pub success: bool,
    pub error: Option<String>,
}

impl ExecutorResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Something that can carry out a mutation with elevated privileges.
pub trait PrivilegedExecutor: Send + Sync {
    fn execute(&self, operation: &OperationDescriptor) -> ExecutorResult;
}

/// Something that can ask the user whether a privileged retry is allowed.
pub trait ConsentProvider: Send + Sync {
    fn confirm(&self, description: &str) -> bool;
}

/// How a mutation ended up succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation<T> {
    /// The mutation closure itself succeeded.
    Direct(T),
    /// The privileged executor performed the mutation.
    Elevated,
}

impl<T> Elevation<T> {
    pub fn was_elevated(&self) -> bool {
        matches!(self, Elevation::Elevated)
    }
}

#[derive(Debug, Error)]
pub enum ElevatedError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Any failure of the direct attempt other than a permission error.
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    ExecutorFailed(String),
}

impl ElevatedError {
    /// Whether the privileged executor was involved in producing this error.
    pub fn was_elevated(&self) -> bool {
        matches!(self, ElevatedError::ExecutorFailed(_))
    }
}

pub struct ElevatedRunner {
    executor: Arc<dyn PrivilegedExecutor>,
    consent: Option<Arc<dyn ConsentProvider>>,
    root: Option<PathBuf>,
    enabled: bool,
}

impl ElevatedRunner {
    pub fn new(executor: Arc<dyn PrivilegedExecutor>) -> Self {
        Self {
            executor,
            consent: None,
            root: None,
            enabled: true,
        }
    }

    pub fn with_consent(mut self, consent: Arc<dyn ConsentProvider>) -> Self {
        self.consent = Some(consent);
        self
    }

    /// Restricts every validated path to lie inside `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_elevation_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Validates `operation`, then runs `mutation`. A permission failure is
    /// retried through the privileged executor once the user consents; any
    /// other failure is returned as is.
    pub fn run<T, F>(
        &self,
        operation: &OperationDescriptor,
        mutation: F,
    ) -> Result<Elevation<T>, ElevatedError>
    where
        F: FnOnce() -> Result<T, FsError>,
    {
        log::debug!("Validating: {}", operation.describe());
        operation.validate(self.root.as_deref())?;

        log::debug!("Executing: {}", operation.describe());
        match mutation() {
            Ok(value) => {
                log::debug!("Succeeded: {}", operation.describe());
                Ok(Elevation::Direct(value))
            }
            Err(err) if err.is_permission_denied() => {
                log::debug!("Permission denied: {}: {}", operation.describe(), err);
                self.escalate(operation)
            }
            Err(err) => {
                log::debug!("Failed: {}: {}", operation.describe(), err);
                Err(ElevatedError::Fs(err))
            }
        }
    }

    fn escalate<T>(&self, operation: &OperationDescriptor) -> Result<Elevation<T>, ElevatedError> {
        let consent = match &self.consent {
            Some(consent) if self.enabled => consent,
            _ => {
                log::debug!("Cancelled, no way to ask for consent: {}", operation.describe());
                return Err(ElevatedError::Cancelled);
            }
        };

        log::debug!("Awaiting consent: {}", operation.describe());
        let prompt = format!(
            "Permission denied. {} with elevated privileges?",
            operation.describe()
        );
        if !consent.confirm(&prompt) {
            log::debug!("Cancelled by user: {}", operation.describe());
            return Err(ElevatedError::Cancelled);
        }

        log::debug!("Executing elevated: {}", operation.describe());
        let outcome = self.executor.execute(operation);
        if outcome.success {
            log::info!("Elevated operation succeeded: {}", operation.describe());
            Ok(Elevation::Elevated)
        } else {
            let error = outcome
                .error
                .unwrap_or_else(|| "privileged operation failed".to_owned());
            log::debug!("Elevated operation failed: {}: {}", operation.describe(), error);
            Err(ElevatedError::ExecutorFailed(error))
        }
    }
}


#[cfg(test)]
mod test {
    use std::cell::Cell;
    use std::io;

    use super::test_support::{FixedConsent, RecordingExecutor};
    use super::*;

    fn denied() -> FsError {
        FsError::new(io::Error::from(io::ErrorKind::PermissionDenied))
    }

    #[test]
    fn success_is_not_elevated() {
        let runner = ElevatedRunner::new(RecordingExecutor::new(ExecutorResult::ok()));
        let op = OperationDescriptor::create_file("/a");

        let result = runner.run(&op, || Ok(7)).unwrap();
        assert_eq!(result, Elevation::Direct(7));
    }

    #[test]
    fn invalid_descriptor_never_runs_the_closure() {
        let executor = RecordingExecutor::new(ExecutorResult::ok());
        let runner = ElevatedRunner::new(executor.clone());
        let op = OperationDescriptor::rename("/a", ".");
        let ran = Cell::new(false);

        let err = runner
            .run(&op, || {
                ran.set(true);
                Ok(())
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "Invalid name");
        assert!(!ran.get());
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn permission_denied_without_consent_is_cancelled() {
        let executor = RecordingExecutor::new(ExecutorResult::ok());
        let runner = ElevatedRunner::new(executor.clone());
        let op = OperationDescriptor::delete("/locked");

        let err = runner.run(&op, || Err::<(), _>(denied())).unwrap_err();
        assert!(matches!(err, ElevatedError::Cancelled));
        assert!(!err.was_elevated());
        assert_eq!(err.to_string(), "Operation cancelled");
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn declined_consent_is_cancelled() {
        let executor = RecordingExecutor::new(ExecutorResult::ok());
        let runner =
            ElevatedRunner::new(executor.clone()).with_consent(Arc::new(FixedConsent(false)));
        let op = OperationDescriptor::delete("/locked");

        let err = runner.run(&op, || Err::<(), _>(denied())).unwrap_err();
        assert!(matches!(err, ElevatedError::Cancelled));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn disabled_elevation_is_cancelled_even_with_consent() {
        let executor = RecordingExecutor::new(ExecutorResult::ok());
        let runner = ElevatedRunner::new(executor.clone())
            .with_consent(Arc::new(FixedConsent(true)))
            .with_elevation_enabled(false);
        let op = OperationDescriptor::delete("/locked");

        let err = runner.run(&op, || Err::<(), _>(denied())).unwrap_err();
        assert!(matches!(err, ElevatedError::Cancelled));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn consent_delegates_the_same_descriptor() {
        let executor = RecordingExecutor::new(ExecutorResult::ok());
        let runner =
            ElevatedRunner::new(executor.clone()).with_consent(Arc::new(FixedConsent(true)));
        let op = OperationDescriptor::move_item("/a", "/locked/a");

        let result = runner.run(&op, || Err::<(), _>(denied())).unwrap();
        assert!(result.was_elevated());
        assert_eq!(executor.calls(), vec![op]);
    }

    #[test]
    fn executor_failure_is_reported_as_elevated() {
        let executor = RecordingExecutor::new(ExecutorResult::failed("helper exited with 1"));
        let runner = ElevatedRunner::new(executor).with_consent(Arc::new(FixedConsent(true)));
        let op = OperationDescriptor::delete("/locked");

        let err = runner.run(&op, || Err::<(), _>(denied())).unwrap_err();
        assert!(err.was_elevated());
        assert_eq!(err.to_string(), "helper exited with 1");
    }

    #[test]
    fn other_errors_skip_elevation() {
        let executor = RecordingExecutor::new(ExecutorResult::ok());
        let runner =
            ElevatedRunner::new(executor.clone()).with_consent(Arc::new(FixedConsent(true)));
        let op = OperationDescriptor::create_file("/full/disk");

        let err = runner
            .run(&op, || {
                Err::<(), _>(FsError::new(io::Error::from(io::ErrorKind::StorageFull)))
            })
            .unwrap_err();

        match err {
            ElevatedError::Fs(inner) => {
                assert_eq!(inner.io_error().kind(), io::ErrorKind::StorageFull)
            }
            other => panic!("expected an fs error, got {other:?}"),
        }
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn root_restricts_paths() {
        let runner = ElevatedRunner::new(RecordingExecutor::new(ExecutorResult::ok()))
            .with_root("/workspace");
        let op = OperationDescriptor::create_folder("/etc/new");

        let err = runner.run(&op, || Ok(())).unwrap_err();
        assert_eq!(err.to_string(), "Invalid destination path");
    }
}
