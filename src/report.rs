use crate::package::{LauncherBuild, PackOutcome};

pub fn summary(outcome: &PackOutcome) -> String {
    let mut out = String::new();

    out.push_str("nodepack report\n");
    out.push_str("===============\n");
    out.push_str(&format!("app_dir: {}\n", outcome.app_dir.display()));
    out.push_str(&format!("entry: {}\n", outcome.entry.display()));
    out.push_str(&format!(
        "project: files={} dirs={} skipped={}\n",
        outcome.project.files, outcome.project.dirs, outcome.project.skipped
    ));

    out.push_str("\nruntime\n");
    out.push_str(&format!(
        "  qt_version: {}\n",
        outcome.runtime.qt_version.as_deref().unwrap_or("none")
    ));
    out.push_str(&format!("  libraries: {}\n", outcome.runtime.libraries));
    for kind in &outcome.runtime.staged {
        out.push_str(&format!("    - {kind} (staged)\n"));
    }
    for kind in &outcome.runtime.skipped {
        out.push_str(&format!("    - {kind} (skipped)\n"));
    }

    out.push_str(&format!(
        "\ndependencies: total={} missing={}\n",
        outcome.dependencies.len(),
        outcome.missing_dependencies.len()
    ));
    for name in &outcome.dependencies {
        if outcome.missing_dependencies.contains(name) {
            out.push_str(&format!("    - {name} (missing)\n"));
        } else {
            out.push_str(&format!("    - {name}\n"));
        }
    }

    out.push_str("\nlauncher\n");
    out.push_str(&format!(
        "  startup_script: {}\n",
        outcome.launcher.startup_script.display()
    ));
    out.push_str(&format!(
        "  hidden_script: {}\n",
        outcome.launcher.hidden_script.display()
    ));
    match &outcome.build {
        LauncherBuild::Compiled(p) => out.push_str(&format!("  binary: {}\n", p.display())),
        LauncherBuild::SourceOnly(p) => {
            out.push_str(&format!("  source: {} (not compiled)\n", p.display()))
        }
    }

    out
}
