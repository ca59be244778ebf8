//! Database export/import collaborators.
//!
//! The manager never speaks SQL itself; it hands a connection URL and a file
//! path to a [`DatabaseTool`]. Production uses [`CommandTool`], which runs the
//! database's own dump/restore programs as subprocesses.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::backup::error::{BackupError, BackupResult};
use crate::config::BackupConfig;

/// Stderr beyond this many bytes is cut from error messages.
const STDERR_LIMIT: usize = 4096;

/// Dumps a database to a SQL file and applies a SQL file to a database.
#[async_trait]
pub trait DatabaseTool: Send + Sync {
    /// Write a full SQL dump of `database_url` to `target`.
    async fn dump(&self, database_url: &str, target: &Path) -> BackupResult<()>;

    /// Apply the SQL in `source` to `database_url`.
    async fn restore(&self, database_url: &str, source: &Path) -> BackupResult<()>;
}

/// Runs configurable external programs (`pg_dump` / `psql` by default).
///
/// `{url}` and `{path}` in the argument templates are substituted per call.
#[derive(Debug, Clone)]
pub struct CommandTool {
    dump_program: String,
    dump_args: Vec<String>,
    restore_program: String,
    restore_args: Vec<String>,
}

impl CommandTool {
    pub fn new(
        dump_program: impl Into<String>,
        dump_args: Vec<String>,
        restore_program: impl Into<String>,
        restore_args: Vec<String>,
    ) -> Self {
        Self {
            dump_program: dump_program.into(),
            dump_args,
            restore_program: restore_program.into(),
            restore_args,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(
            config.dump_command.clone(),
            config.dump_args.clone(),
            config.restore_command.clone(),
            config.restore_args.clone(),
        )
    }

    fn render(template: &[String], database_url: &str, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        template
            .iter()
            .map(|arg| arg.replace("{url}", database_url).replace("{path}", &path))
            .collect()
    }

    /// Run a program to completion. `Err` carries (exit status, stderr).
    async fn run(program: &str, args: Vec<String>) -> Result<(), (Option<std::process::ExitStatus>, String)> {
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| (None, format!("failed to start {}: {}", program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.len() > STDERR_LIMIT {
                let mut cut = STDERR_LIMIT;
                while !stderr.is_char_boundary(cut) {
                    cut -= 1;
                }
                stderr.truncate(cut);
            }
            Err((Some(output.status), stderr))
        }
    }
}

#[async_trait]
impl DatabaseTool for CommandTool {
    async fn dump(&self, database_url: &str, target: &Path) -> BackupResult<()> {
        tracing::debug!(program = %self.dump_program, target = %target.display(), "Running database dump");
        let args = Self::render(&self.dump_args, database_url, target);
        Self::run(&self.dump_program, args)
            .await
            .map_err(|(status, stderr)| BackupError::dump_failed(status, stderr))
    }

    async fn restore(&self, database_url: &str, source: &Path) -> BackupResult<()> {
        tracing::debug!(program = %self.restore_program, source = %source.display(), "Running database restore");
        let args = Self::render(&self.restore_args, database_url, source);
        Self::run(&self.restore_program, args)
            .await
            .map_err(|(status, stderr)| BackupError::restore_failed(status, stderr))
    }
}

/// Connection URL with the password masked, for logs.
pub fn redact_url(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid database url>".to_string(),
    }
}
