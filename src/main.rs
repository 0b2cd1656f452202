use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use layercake::builder::scratch_dir;
use layercake::config::parse_build_arg;
use layercake::{BuildOverrides, Builder, CancelFlag, Config, DockerEngine, Notifier};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        global = true,
        help = "Config file (default: layercake.yml in the working directory)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Working directory, also sent as the build context"
    )]
    cwd: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build images in dependency order
    Build(BuildArgs),
}

#[derive(Args)]
struct BuildArgs {
    #[arg(help = "Images to build along with their imports (default: all)")]
    targets: Vec<String>,

    #[arg(long, help = "Print the generated Dockerfiles without building")]
    dry_run: bool,

    #[arg(long, help = "Do not use cache when building images")]
    no_cache: bool,

    #[arg(long, help = "Always attempt to pull newer base images")]
    pull: bool,

    #[arg(long, help = "Always remove intermediate containers")]
    force_rm: bool,

    #[arg(
        long = "build-arg",
        value_name = "KEY=VALUE",
        value_parser = parse_build_arg,
        help = "Set a build-time variable, overriding the config file"
    )]
    build_args: Vec<(String, String)>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = match cli.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };
    let mut config = Config::load(cli.config.as_deref(), &cwd)?;

    let Command::Build(args) = cli.command;
    config.apply_overrides(BuildOverrides {
        args: args.build_args,
        dry_run: args.dry_run,
        no_cache: args.no_cache,
        pull: args.pull,
        force_rm: args.force_rm,
    });

    let notifier = Notifier::new(cli.verbose.max(config.log.verbosity()));
    notifier.debug(&format!("Working directory: {}", config.cwd.display()));
    notifier.debug(&format!("Declared images: {}", config.build.images.len()));

    let builder = Builder::new(&config, &notifier, &args.targets)?;
    if config.build.dry_run {
        builder.dry_run();
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let scratch = scratch_dir()?;

    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let scratch_path = scratch.path().to_path_buf();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.cancel();
        }
        // A second interrupt does not wait for the running build
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = std::fs::remove_dir_all(&scratch_path);
            std::process::exit(130);
        }
    });

    let engine = DockerEngine::new(runtime.handle().clone())?.connect()?;
    let mut builder = builder.with_scratch_dir(scratch.path());
    builder.run(&engine, &cancel)?;

    Ok(())
}
