use crate::config::Platform;

/// Script language of a generated startup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Windows batch (`.bat`).
    Cmd,
    /// POSIX `sh`.
    Sh,
    /// Windows Script Host VBScript (`.vbs`).
    Vbs,
}

/// An environment variable pointing at the application directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub name: &'static str,
    /// Subdirectory of the application directory; empty for the directory itself.
    pub subdir: &'static str,
    /// Keep the inherited value after ours.
    pub prepend: bool,
}

/// Variables every launch path sets before starting the runtime.
pub fn launch_env(platform: Platform) -> Vec<EnvVar> {
    vec![
        EnvVar {
            name: platform.library_path_var(),
            subdir: "",
            prepend: true,
        },
        EnvVar {
            name: "QT_PLUGIN_PATH",
            subdir: "",
            prepend: false,
        },
        EnvVar {
            name: "QT_QPA_PLATFORM_PLUGIN_PATH",
            subdir: "platforms",
            prepend: false,
        },
    ]
}

const APP_DIR_VAR: &str = "APP_DIR";

#[derive(Debug, Clone, Copy)]
pub struct Emitter {
    dialect: Dialect,
}

impl Emitter {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn header(&self, out: &mut String, title: &str) {
        match self.dialect {
            Dialect::Cmd => {
                out.push_str("@echo off\r\n");
                self.comment(out, title);
                out.push_str("setlocal\r\n");
            }
            Dialect::Sh => {
                out.push_str("#!/bin/sh\n");
                self.comment(out, title);
            }
            Dialect::Vbs => {
                self.comment(out, title);
                out.push_str("Option Explicit\r\n");
            }
        }
        self.blank(out);
    }

    pub fn comment(&self, out: &mut String, text: &str) {
        let text = text.replace(['\r', '\n'], " ");
        match self.dialect {
            Dialect::Cmd => {
                out.push_str("rem ");
                out.push_str(&escape_cmd_bare(&text));
                out.push_str("\r\n");
            }
            Dialect::Sh => {
                out.push_str("# ");
                out.push_str(&text);
                out.push('\n');
            }
            Dialect::Vbs => {
                out.push_str("' ");
                out.push_str(&text);
                out.push_str("\r\n");
            }
        }
    }

    pub fn blank(&self, out: &mut String) {
        out.push_str(self.newline());
    }

    /// Define the application directory as the directory holding the script,
    /// and make it the working directory.
    pub fn app_dir_prelude(&self, out: &mut String) {
        match self.dialect {
            Dialect::Cmd => {
                out.push_str("set \"APP_DIR=%~dp0\"\r\n");
                out.push_str("set \"APP_DIR=%APP_DIR:~0,-1%\"\r\n");
                out.push_str("cd /d \"%APP_DIR%\"\r\n");
            }
            Dialect::Sh => {
                out.push_str("APP_DIR=\"$(cd \"$(dirname \"$0\")\" && pwd)\"\n");
                out.push_str("cd \"$APP_DIR\" || exit 1\n");
            }
            Dialect::Vbs => {
                out.push_str("Dim fso, shell, env, appDir\r\n");
                out.push_str("Set fso = CreateObject(\"Scripting.FileSystemObject\")\r\n");
                out.push_str("Set shell = CreateObject(\"WScript.Shell\")\r\n");
                out.push_str("Set env = shell.Environment(\"Process\")\r\n");
                out.push_str("appDir = fso.GetParentFolderName(WScript.ScriptFullName)\r\n");
                out.push_str("shell.CurrentDirectory = appDir\r\n");
            }
        }
    }

    pub fn set_env(&self, out: &mut String, var: &EnvVar) {
        let name = var.name;
        match self.dialect {
            Dialect::Cmd => {
                out.push_str("set \"");
                out.push_str(name);
                out.push('=');
                out.push_str(&self.app_path(var.subdir));
                if var.prepend {
                    out.push_str(";%");
                    out.push_str(name);
                    out.push('%');
                }
                out.push_str("\"\r\n");
            }
            Dialect::Sh => {
                out.push_str("export ");
                out.push_str(name);
                out.push('=');
                out.push('"');
                out.push_str(&self.app_path(var.subdir));
                if var.prepend {
                    out.push_str("${");
                    out.push_str(name);
                    out.push_str(":+:$");
                    out.push_str(name);
                    out.push('}');
                }
                out.push_str("\"\n");
            }
            Dialect::Vbs => {
                out.push_str("env(");
                out.push_str(&quote_vbs(name));
                out.push_str(") = ");
                out.push_str(&self.app_path(var.subdir));
                if var.prepend {
                    out.push_str(" & \";\" & env(");
                    out.push_str(&quote_vbs(name));
                    out.push(')');
                }
                out.push_str("\r\n");
            }
        }
    }

    /// Run `binary entry` in the foreground and exit with its status, telling
    /// the user when it is non-zero. The entry is the only argument passed on.
    pub fn run_foreground(&self, out: &mut String, app_name: &str, binary: &str, entry: &str) {
        match self.dialect {
            Dialect::Cmd => {
                out.push('"');
                out.push_str(&self.app_path(binary));
                out.push_str("\" \"");
                out.push_str(&self.app_path(entry));
                out.push_str("\"\r\n");
                out.push_str("set \"EXIT_CODE=%ERRORLEVEL%\"\r\n");
                out.push_str("if not \"%EXIT_CODE%\"==\"0\" (\r\n");
                out.push_str("  echo ");
                out.push_str(&escape_cmd_bare(app_name));
                out.push_str(" exited with code %EXIT_CODE%\r\n");
                out.push_str("  pause\r\n");
                out.push_str(")\r\n");
                out.push_str("exit /b %EXIT_CODE%\r\n");
            }
            Dialect::Sh => {
                out.push('"');
                out.push_str(&self.app_path(binary));
                out.push_str("\" \"");
                out.push_str(&self.app_path(entry));
                out.push_str("\"\n");
                out.push_str("status=$?\n");
                out.push_str("if [ \"$status\" -ne 0 ]; then\n");
                out.push_str("  printf '%s exited with code %s\\n' ");
                out.push_str(&quote_posix_single(app_name));
                out.push_str(" \"$status\" >&2\n");
                out.push_str("fi\n");
                out.push_str("exit \"$status\"\n");
            }
            Dialect::Vbs => {
                out.push_str("WScript.Quit shell.Run(");
                out.push_str(&self.command_line(binary, entry));
                out.push_str(", 1, True)\r\n");
            }
        }
    }

    /// Start `binary entry` without a console window and without waiting.
    pub fn run_detached(&self, out: &mut String, binary: &str, entry: &str) {
        match self.dialect {
            Dialect::Cmd => {
                out.push_str("start \"\" /b \"");
                out.push_str(&self.app_path(binary));
                out.push_str("\" \"");
                out.push_str(&self.app_path(entry));
                out.push_str("\"\r\n");
            }
            Dialect::Sh => {
                out.push_str("nohup \"");
                out.push_str(&self.app_path(binary));
                out.push_str("\" \"");
                out.push_str(&self.app_path(entry));
                out.push_str("\" >/dev/null 2>&1 &\n");
            }
            Dialect::Vbs => {
                out.push_str("shell.Run ");
                out.push_str(&self.command_line(binary, entry));
                out.push_str(", 0, False\r\n");
            }
        }
    }

    /// Expression for `<appDir>/<rel>` in this dialect. `rel` uses `/` separators.
    fn app_path(&self, rel: &str) -> String {
        match self.dialect {
            Dialect::Cmd => {
                let mut s = format!("%{APP_DIR_VAR}%");
                if !rel.is_empty() {
                    s.push('\\');
                    s.push_str(&escape_cmd_quoted(&rel.replace('/', "\\")));
                }
                s
            }
            Dialect::Sh => {
                let mut s = format!("${APP_DIR_VAR}");
                if !rel.is_empty() {
                    s.push('/');
                    s.push_str(&escape_posix_double(rel));
                }
                s
            }
            Dialect::Vbs => {
                if rel.is_empty() {
                    "appDir".to_string()
                } else {
                    format!("appDir & {}", quote_vbs(&format!("\\{}", rel.replace('/', "\\"))))
                }
            }
        }
    }

    fn command_line(&self, binary: &str, entry: &str) -> String {
        format!(
            "Chr(34) & {} & Chr(34) & \" \" & Chr(34) & {} & Chr(34)",
            self.app_path(binary),
            self.app_path(entry)
        )
    }

    fn newline(&self) -> &'static str {
        match self.dialect {
            Dialect::Sh => "\n",
            Dialect::Cmd | Dialect::Vbs => "\r\n",
        }
    }
}

// -------------------- quoting helpers --------------------

/// Inside `"..."` in sh: `\`, `"`, `$` and backquote stay literal when escaped.
fn escape_posix_double(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn quote_posix_single(s: &str) -> String {
    let mut out = String::from("'");
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Inside `"..."` in cmd only `%` needs doubling.
fn escape_cmd_quoted(s: &str) -> String {
    s.replace('%', "%%")
}

/// Unquoted cmd text: metacharacters take a caret.
fn escape_cmd_bare(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' => out.push_str("%%"),
            '^' | '&' | '|' | '<' | '>' | '(' | ')' => {
                out.push('^');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

fn quote_vbs(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
