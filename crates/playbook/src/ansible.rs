//! `ansible-playbook` implementation of [`ExternalTool`].

use crate::descriptor::Descriptors;
use crate::error::ToolError;
use crate::recap::Transcript;
use crate::tool::{ExternalTool, ToolReport};
use std::path::PathBuf;
use std::process::Command;

/// Default executable.
pub const DEFAULT_COMMAND: &str = "ansible-playbook";

/// Exit codes for which `ansible-playbook` still reports per-host results:
/// success, host failures, unreachable hosts.
const REPORTING_EXIT_CODES: [i32; 3] = [0, 2, 4];

/// Runs `ansible-playbook -i <inventory> <playbook>` in a work directory.
#[derive(Debug, Clone)]
pub struct AnsibleTool {
    pub command: String,
    pub work_dir: PathBuf,
    /// Exported as `ANSIBLE_ROLES_PATH` when set
    pub roles_dir: Option<PathBuf>,
    pub inventory_file: String,
    pub playbook_file: String,
}

impl AnsibleTool {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            work_dir: work_dir.into(),
            roles_dir: None,
            inventory_file: "inventory.yml".to_string(),
            playbook_file: "main.yml".to_string(),
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_roles_dir(mut self, roles_dir: impl Into<PathBuf>) -> Self {
        self.roles_dir = Some(roles_dir.into());
        self
    }

    pub fn with_files(mut self, inventory: impl Into<String>, playbook: impl Into<String>) -> Self {
        self.inventory_file = inventory.into();
        self.playbook_file = playbook.into();
        self
    }

    /// Command line as shown to the operator.
    pub fn command_line(&self) -> String {
        format!(
            "{} -i {} {}",
            self.command, self.inventory_file, self.playbook_file
        )
    }
}

impl ExternalTool for AnsibleTool {
    fn name(&self) -> &str {
        &self.command
    }

    fn execute(&self, descriptors: &Descriptors) -> Result<ToolReport, ToolError> {
        let rendered = descriptors
            .render()
            .map_err(|e| ToolError::Prepare(e.to_string()))?;
        rendered
            .write_to(&self.work_dir, &self.inventory_file, &self.playbook_file)
            .map_err(|e| ToolError::Prepare(e.to_string()))?;

        log::info!("Running {} in {}", self.command_line(), self.work_dir.display());

        let mut cmd = Command::new(&self.command);
        cmd.args(["-i", self.inventory_file.as_str(), self.playbook_file.as_str()])
            .current_dir(&self.work_dir)
            .env("ANSIBLE_NOCOLOR", "1")
            .env("ANSIBLE_FORCE_COLOR", "0")
            .env("ANSIBLE_STDOUT_CALLBACK", "default");
        if let Some(roles) = &self.roles_dir {
            cmd.env("ANSIBLE_ROLES_PATH", roles);
        }

        let output = cmd.output().map_err(|source| ToolError::Launch {
            command: self.command.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        log::debug!("{} stdout:\n{stdout}", self.command);
        if !stderr.trim().is_empty() {
            log::warn!("{} stderr:\n{}", self.command, stderr.trim_end());
        }

        classify(
            &self.command,
            output.status.code(),
            &stdout,
            &stderr,
            descriptors,
        )
    }
}

/// Turn an exit status and captured output into a report or an invocation error.
fn classify(
    command: &str,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
    descriptors: &Descriptors,
) -> Result<ToolReport, ToolError> {
    let reporting = code.is_some_and(|c| REPORTING_EXIT_CODES.contains(&c));
    if !reporting {
        return Err(ToolError::Exited {
            command: command.to_string(),
            code,
            stderr: stderr.to_string(),
        });
    }

    let transcript = Transcript::parse(stdout);
    if !transcript.has_recap() {
        return Err(ToolError::Unparseable {
            command: command.to_string(),
            message: "no PLAY RECAP in output".to_string(),
        });
    }

    Ok(ToolReport::from_transcript(&transcript, descriptors, code))
}

// ============================================================================
// Tests
// ============================================================================
