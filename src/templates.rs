use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde_json::json;

use crate::{config::Platform, emit::launch_env, error::Result};

const WINDOWS_LAUNCHER: &str = include_str!("../assets/templates/launcher_windows.c");
const UNIX_LAUNCHER: &str = include_str!("../assets/templates/launcher_unix.c");

/// C source of the native bootstrap for `platform`.
///
/// `entry` must already use the platform's path separator.
pub fn render_launcher(
    platform: Platform,
    app_name: &str,
    runtime_binary: &str,
    entry: &str,
) -> Result<String> {
    let source = if platform.is_windows() {
        WINDOWS_LAUNCHER
    } else {
        UNIX_LAUNCHER
    };

    let env: Vec<serde_json::Value> = launch_env(platform)
        .iter()
        .map(|v| json!({ "name": v.name, "subdir": v.subdir, "prepend": v.prepend }))
        .collect();

    let ctx_json = json!({
        "app_name": app_name,
        "runtime_binary": runtime_binary,
        "entry": entry,
        "platform": platform.to_string(),
        "env": env,
    });

    Ok(render_minijinja(source, &ctx_json)?)
}

fn render_minijinja(source: &str, ctx_json: &serde_json::Value) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_auto_escape_callback(|_| AutoEscape::None);

    env.add_filter("c_string", |s: String| c_string_literal(&s));
    env.add_filter("c_comment", |s: String| s.replace("*/", "* /"));

    env.add_template("launcher.c", source)?;
    let tpl = env.get_template("launcher.c")?;
    let v = minijinja::value::Value::from_serialize(ctx_json);
    tpl.render(v)
}

/// Double-quoted C literal. Non-printable and non-ASCII bytes become octal escapes.
fn c_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for b in s.bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'?' => out.push_str("\\?"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_launcher_embeds_paths_and_env() {
        let src = render_launcher(Platform::Windows, "Clock", "qode.exe", "src\\ui\\main.js").unwrap();

        assert!(src.contains("#define RUNTIME_NAME \"qode.exe\""));
        assert!(src.contains("#define ENTRY_PATH \"src\\\\ui\\\\main.js\""));
        assert!(src.contains("set_env_dir(\"PATH\", app_dir, \"\", 1);"));
        assert!(src.contains("set_env_dir(\"QT_QPA_PLATFORM_PLUGIN_PATH\", app_dir, \"platforms\", 0);"));
        assert!(src.contains("CREATE_NO_WINDOW"));
        assert!(src.contains("MessageBoxA"));
        assert!(!src.contains("{%"));
        assert!(!src.contains("{{"));
    }

    #[test]
    fn linux_launcher_spawns_without_waiting_for_runtime() {
        let src = render_launcher(Platform::Linux, "Clock", "qode", "main.js").unwrap();

        assert!(src.contains("/proc/self/exe"));
        assert!(src.contains("set_env_dir(\"LD_LIBRARY_PATH\", app_dir, \"\", 1);"));
        assert!(src.contains("posix_spawn(&pid, runtime_path"));
        assert!(!src.contains("mach-o"));

        let spawn = src.find("posix_spawn(&pid, runtime_path").unwrap();
        assert!(!src[spawn..].contains("waitpid"));
    }

    #[test]
    fn mac_launcher_uses_dyld() {
        let src = render_launcher(Platform::Mac, "Clock", "qode", "main.js").unwrap();
        assert!(src.contains("_NSGetExecutablePath"));
        assert!(src.contains("DYLD_LIBRARY_PATH"));
        assert!(src.contains("osascript"));
    }

    #[test]
    fn app_name_cannot_break_out_of_comment_or_literal() {
        let src = render_launcher(Platform::Linux, "A */ \"B\"", "qode", "main.js").unwrap();
        assert!(src.starts_with("/* A * / \"B\" launcher"));
        assert!(src.contains("#define APP_TITLE \"A */ \\\"B\\\"\""));
    }

    #[test]
    fn c_literal_escapes() {
        assert_eq!(c_string_literal("a\\b\"c"), "\"a\\\\b\\\"c\"");
        assert_eq!(c_string_literal("é"), "\"\\303\\251\"");
        assert_eq!(c_string_literal("??/"), "\"\\?\\?/\"");
    }
}
