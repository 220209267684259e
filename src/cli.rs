use clap::Parser;
use std::path::PathBuf;

use crate::config::{AppSection, ConfigFile, LauncherSection, Platform, TargetSection};

#[derive(Parser, Debug)]
#[command(name = "nodepack", version, about = "Package a NodeGUI application into a self-contained directory")]
pub struct Args {
    /// Application name; also names the output subdirectory and launcher
    #[arg(long)]
    pub name: Option<String>,

    /// Project directory (defaults to the current directory)
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Directory that receives `<name>/` (defaults to ./deploy)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Entry file relative to the project directory
    #[arg(long)]
    pub main: Option<String>,

    /// Extra package to stage even if package.json does not list it
    #[arg(long = "module", value_name = "NAME", value_delimiter = ',')]
    pub modules: Vec<String>,

    /// Project-relative path to leave out of the copy
    #[arg(long, value_name = "PATH")]
    pub exclude: Vec<String>,

    /// Target platform (defaults to the host)
    #[arg(long, value_enum)]
    pub platform: Option<Platform>,

    /// Path to a project config (overrides NODEPACK_CONFIG and <source>/nodepack.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit launcher.c without invoking a compiler
    #[arg(long, default_value_t = false)]
    pub no_compile: bool,

    /// C compiler used for the launcher
    #[arg(long)]
    pub compiler: Option<String>,

    /// Print a summary of what was staged
    #[arg(long, default_value_t = false)]
    pub report: bool,

    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Flags as the top configuration layer.
    pub fn overlay(&self) -> ConfigFile {
        ConfigFile {
            app: AppSection {
                name: self.name.clone(),
                main: self.main.clone(),
                output: self.output.clone(),
                modules: self.modules.clone(),
                exclude: self.exclude.clone(),
            },
            target: TargetSection {
                platform: self.platform,
            },
            launcher: LauncherSection {
                compile: self.no_compile.then_some(false),
                compiler: self.compiler.clone(),
                compiler_args: None,
            },
            ..ConfigFile::default()
        }
    }

    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "nodepack=debug"
        } else if self.quiet {
            "nodepack=warn"
        } else {
            "nodepack=info"
        }
    }
}
