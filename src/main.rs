use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use tag_mirror::config;
use tag_mirror::git::{Git2Repository, Repository};
use tag_mirror::packager::Packager;
use tag_mirror::pipeline::BuildPipeline;
use tag_mirror::{runner, ui};

#[derive(clap::Parser)]
#[command(
    name = "tag-mirror",
    about = "Mirror upstream release tags into a downstream package repository"
)]
struct Args {
    #[arg(short, long, help = "Custom configuration file path")]
    config: Option<String>,

    #[arg(short, long, help = "Print version information")]
    version: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        println!("tag-mirror {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Load configuration
    let config = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            ui::display_error(&format!("Error loading config: {}", e));
            std::process::exit(1);
        }
    };

    // Open both repository handles once; everything downstream receives
    // them explicitly.
    let source = match Git2Repository::open(&config.paths.source_repo) {
        Ok(repo) => repo,
        Err(e) => {
            ui::display_error(&format!("Source repository error: {}", e));
            std::process::exit(1);
        }
    };
    let package = match Git2Repository::open(&config.paths.package_repo) {
        Ok(repo) => repo,
        Err(e) => {
            ui::display_error(&format!("Package repository error: {}", e));
            std::process::exit(1);
        }
    };

    let package_workdir = match package.workdir() {
        Ok(path) => path,
        Err(e) => {
            ui::display_error(&format!("Package repository error: {}", e));
            std::process::exit(1);
        }
    };

    let packager = Packager::new(
        &config.paths.artifacts,
        &config.paths.templates,
        package_workdir,
        &config.build.source_subtree,
    );
    let pipeline = BuildPipeline::new(&source, &package, packager, &config.build.default_branch);

    match runner::run(&source, &package, &pipeline) {
        Ok(summary) => {
            if summary.is_empty() {
                ui::display_status("No new tags to be built!");
            } else {
                ui::display_success(&format!("Built {} tags successfully.", summary.built_count()));
            }
            Ok(())
        }
        Err(e) => {
            log::error!("{}", e);
            if let Some(operation) = e.failed_operation() {
                log::debug!("failing command: {}", operation);
            }
            ui::display_error(&e.to_string());
            std::process::exit(1);
        }
    }
}
