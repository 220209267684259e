use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nodepack::{cli::Args, config, ContextEnv, PackOptions, Packager, PackagingRequest};

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let ctx = ContextEnv::new()?;
    let source_dir = ctx.absolutize(args.source.as_deref().unwrap_or(ctx.cwd()));

    let cfg = config::load_layers(&ctx, args.config.as_deref(), &source_dir, args.overlay())?;
    let opts = PackOptions::from_config(&ctx, &source_dir, cfg);
    let request = PackagingRequest::validate(opts).context("invalid packaging request")?;

    let mut packager = Packager::new(request);
    let outcome = packager.run()?;

    if args.report {
        eprint!("{}", nodepack::report::summary(&outcome));
    }
    println!("{}", outcome.app_dir.display());
    Ok(())
}
