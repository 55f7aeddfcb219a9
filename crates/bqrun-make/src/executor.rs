//! Build executor invocation
//!
//! Scheduling, staleness and parallelism belong to make; this only builds
//! the command line and reports make's exit status.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::info;

use crate::synthesizer::BUILD_TARGET;

/// Executor errors
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} was terminated by a signal")]
    Terminated { program: String },
}

/// One `make` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeInvocation {
    program: String,
    makefile: PathBuf,
    jobs: usize,
    dry_run: bool,
    target: String,
}

impl MakeInvocation {
    /// Sequential, real run of the `all` target
    pub fn new(program: impl Into<String>, makefile: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            makefile: makefile.into(),
            jobs: 1,
            dry_run: false,
            target: BUILD_TARGET.to_string(),
        }
    }

    /// Maximum number of rules run in parallel (`-j`)
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Print planned actions without running them (`-n`)
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Arguments passed to the program
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.makefile.display().to_string(),
            "-j".to_string(),
            self.jobs.to_string(),
        ];
        if self.dry_run {
            args.push("-n".to_string());
        }
        args.push(self.target.clone());
        args
    }

    /// Run in `dir` with inherited stdio and return make's exit code
    pub async fn run(&self, dir: &Path) -> Result<i32, ExecutorError> {
        let args = self.args();
        info!(program = %self.program, args = %args.join(" "), dir = %dir.display(), "running executor");

        let status = Command::new(&self.program)
            .args(&args)
            .current_dir(dir)
            .status()
            .await
            .map_err(|source| ExecutorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        status.code().ok_or_else(|| ExecutorError::Terminated {
            program: self.program.clone(),
        })
    }
}
