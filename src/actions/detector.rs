//! External artifact detector
//!
//! Runs a configured helper binary that scans a source tree for framework
//! artifacts (database tables, config keys, routes, template files) and
//! writes them into the detector store. The engine only launches the
//! process and relays its verdict; parsing the tree is the helper's job.

use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

use super::events::ActionOutcome;
use super::{Action, CancelToken, Progress};
use crate::error::EngineError;

pub struct DetectorAction {
    program: PathBuf,
    source_dir: PathBuf,
    output_db: PathBuf,
    extra_args: Vec<String>,
}

impl DetectorAction {
    pub fn new(
        program: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
        output_db: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            source_dir: source_dir.into(),
            output_db: output_db.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args.extend(args);
        self
    }
}

impl Action for DetectorAction {
    fn label(&self) -> String {
        format!("Detecting artifacts in {}", self.source_dir.display())
    }

    fn background_work(
        &mut self,
        progress: &Progress,
        cancel: &CancelToken,
    ) -> Result<ActionOutcome, EngineError> {
        cancel.checkpoint()?;
        progress.report(format!("Running {}", self.program.display()));

        let output = Command::new(&self.program)
            .arg(&self.source_dir)
            .arg(&self.output_db)
            .args(&self.extra_args)
            .current_dir(&self.source_dir)
            .output()
            .map_err(|err| {
                EngineError::Detector(format!("{}: {}", self.program.display(), err))
            })?;

        let errors: Vec<String> = String::from_utf8_lossy(&output.stderr)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.to_string())
            .collect();
        let exit_code = output.status.code().unwrap_or(-1);

        if exit_code != 0 {
            warn!(program = %self.program.display(), exit_code, "detector exited nonzero");
        } else {
            debug!(program = %self.program.display(), "detector finished");
        }

        cancel.checkpoint()?;
        Ok(ActionOutcome::DetectorFinished { exit_code, errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    fn run(action: &mut DetectorAction) -> Result<ActionOutcome, EngineError> {
        let (tx, _rx) = channel();
        let progress = Progress::new(tx, 1);
        let cancel = CancelToken::new();
        action.background_work(&progress, &cancel)
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_exit_code_and_stderr_lines() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("detector.sh");
        // Positional args (source dir, output db) land in $1/$2 and are
        // ignored by this stand-in.
        std::fs::write(&script, "#!/bin/sh\necho 'bad table def' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut action = DetectorAction::new(&script, temp.path(), temp.path().join("out.db"));

        match run(&mut action).unwrap() {
            ActionOutcome::DetectorFinished { exit_code, errors } => {
                assert_eq!(exit_code, 3);
                assert_eq!(errors, vec!["bad table def".to_string()]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_detector_store_is_guarded_before_helper_runs() {
        use crate::actions::events::EngineEvent;
        use crate::actions::scheduler::ActionScheduler;
        use crate::actions::EngineContext;
        use crate::actions::store_init::StoreInitAction;
        use crate::store::SCHEMA_VERSION;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::mpsc::channel;
        use std::time::Duration;

        let temp = tempfile::TempDir::new().unwrap();
        let output_db = temp.path().join("detectors.db");
        let script = temp.path().join("detector.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        // Same submission order as the detect command: guard, then helper,
        // on a single worker.
        let (event_tx, event_rx) = channel();
        let scheduler = ActionScheduler::new(1, event_tx);
        let mut ctx = EngineContext::new();
        scheduler
            .submit(Box::new(StoreInitAction::new(&output_db)), &mut ctx)
            .unwrap();
        scheduler
            .submit(
                Box::new(DetectorAction::new(&script, temp.path(), &output_db)),
                &mut ctx,
            )
            .unwrap();

        let mut terminal = 0;
        while terminal < 2 {
            let event = event_rx.recv_timeout(Duration::from_secs(10)).unwrap();
            if let EngineEvent::Failed { message, .. } = &event {
                panic!("unexpected failure: {}", message);
            }
            if event.is_terminal() {
                terminal += 1;
            }
        }

        // The helper found a created, version-stamped store.
        assert!(output_db.exists());
        let conn = rusqlite::Connection::open(&output_db).unwrap();
        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        let artifacts: i64 = conn
            .query_row("SELECT COUNT(*) FROM database_tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(artifacts, 0);
    }

    #[test]
    fn test_missing_program_is_a_detector_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut action = DetectorAction::new(
            temp.path().join("no-such-binary"),
            temp.path(),
            temp.path().join("out.db"),
        );
        assert!(matches!(run(&mut action), Err(EngineError::Detector(_))));
    }
}
