use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::{
    config::Platform,
    copy::relative_key,
    emit::{launch_env, Dialect, Emitter},
    error::{PackError, Result},
    runtime::RUNTIME_BINARY_STEM,
    templates::render_launcher,
};

pub const LAUNCHER_SOURCE_FILE: &str = "launcher.c";

/// Files written by [`emit_launcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherArtifacts {
    pub startup_script: PathBuf,
    pub hidden_script: PathBuf,
    pub source: PathBuf,
    /// Where the compile step should put the executable.
    pub binary: PathBuf,
}

pub fn startup_script_name(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => "run.bat",
        Platform::Linux | Platform::Mac => "run.sh",
    }
}

pub fn hidden_script_name(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => "run-hidden.vbs",
        Platform::Linux | Platform::Mac => "run-hidden.sh",
    }
}

/// File name of the compiled launcher; characters Windows rejects become `_`.
pub fn launcher_binary_name(app_name: &str, platform: Platform) -> String {
    let stem: String = app_name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    platform.executable_name(&stem)
}

/// Entry path with the platform's separators.
pub fn native_entry(entry: &Path, platform: Platform) -> String {
    relative_key(entry).replace('/', &platform.path_separator().to_string())
}

/// Write the startup script, the hidden-run wrapper and the launcher source into `app_dir`.
pub fn emit_launcher(
    app_dir: &Path,
    app_name: &str,
    entry: &Path,
    platform: Platform,
) -> Result<LauncherArtifacts> {
    let runtime_binary = platform.executable_name(RUNTIME_BINARY_STEM);
    let entry_key = relative_key(entry);

    let (startup_dialect, hidden_dialect) = match platform {
        Platform::Windows => (Dialect::Cmd, Dialect::Vbs),
        Platform::Linux | Platform::Mac => (Dialect::Sh, Dialect::Sh),
    };

    let startup = startup_script(
        Emitter::new(startup_dialect),
        platform,
        app_name,
        &runtime_binary,
        &entry_key,
    );
    let hidden = hidden_script(
        Emitter::new(hidden_dialect),
        platform,
        app_name,
        &runtime_binary,
        &entry_key,
    );
    let source = render_launcher(
        platform,
        app_name,
        &runtime_binary,
        &native_entry(entry, platform),
    )?;

    let artifacts = LauncherArtifacts {
        startup_script: app_dir.join(startup_script_name(platform)),
        hidden_script: app_dir.join(hidden_script_name(platform)),
        source: app_dir.join(LAUNCHER_SOURCE_FILE),
        binary: app_dir.join(launcher_binary_name(app_name, platform)),
    };

    write_file(&artifacts.startup_script, &startup, true)?;
    write_file(&artifacts.hidden_script, &hidden, true)?;
    write_file(&artifacts.source, &source, false)?;

    info!(
        script = %artifacts.startup_script.display(),
        source = %artifacts.source.display(),
        "launcher emitted"
    );
    Ok(artifacts)
}

fn startup_script(
    em: Emitter,
    platform: Platform,
    app_name: &str,
    binary: &str,
    entry: &str,
) -> String {
    let mut out = String::new();
    em.header(&mut out, &format!("{app_name} startup script (generated by nodepack)"));
    em.app_dir_prelude(&mut out);
    for var in launch_env(platform) {
        em.set_env(&mut out, &var);
    }
    em.blank(&mut out);
    em.run_foreground(&mut out, app_name, binary, entry);
    out
}

fn hidden_script(
    em: Emitter,
    platform: Platform,
    app_name: &str,
    binary: &str,
    entry: &str,
) -> String {
    let mut out = String::new();
    em.header(
        &mut out,
        &format!("{app_name} background launcher (generated by nodepack)"),
    );
    em.app_dir_prelude(&mut out);
    for var in launch_env(platform) {
        em.set_env(&mut out, &var);
    }
    em.blank(&mut out);
    em.run_detached(&mut out, binary, entry);
    out
}

fn write_file(path: &Path, text: &str, executable: bool) -> Result<()> {
    fs::write(path, text).map_err(|e| PackError::io(path, e))?;
    if executable {
        make_executable(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| PackError::io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
