use std::{path::Path, process::Command};
use tracing::{debug, warn};

use crate::{
    config::{LauncherSettings, Platform},
    error::CompileError,
};

/// Turns generated launcher source into an executable.
pub trait Compiler {
    fn compile(&self, source: &Path, output: &Path) -> Result<(), CompileError>;
}

/// Runs a C compiler found on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemCompiler {
    program: String,
    args: Vec<String>,
}

impl SystemCompiler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `gcc -O2 -mwindows` for Windows targets, `cc -O2` elsewhere, unless configured.
    pub fn for_target(platform: Platform, settings: &LauncherSettings) -> Self {
        let (program, args): (&str, &[&str]) = match platform {
            Platform::Windows => ("gcc", &["-O2", "-mwindows"]),
            Platform::Linux | Platform::Mac => ("cc", &["-O2"]),
        };
        Self {
            program: settings
                .compiler
                .clone()
                .unwrap_or_else(|| program.to_string()),
            args: settings
                .compiler_args
                .clone()
                .unwrap_or_else(|| args.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Compiler for SystemCompiler {
    fn compile(&self, source: &Path, output: &Path) -> Result<(), CompileError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg("-o").arg(output).arg(source);
        if let Some(dir) = source.parent() {
            cmd.current_dir(dir);
        }
        debug!(command = ?cmd, "compiling launcher");

        let out = cmd.output().map_err(|source| CompileError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
                warn!(compiler = %self.program, "{line}");
            }
            return Err(CompileError::Failed {
                program: self.program.clone(),
                status: out.status,
            });
        }

        Ok(())
    }
}
