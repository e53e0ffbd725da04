mod cli;
mod commands;
mod config;
mod engine;
mod store;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::KstageConfig;
use scaleapi::HttpResourceApi;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: KstageConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let mut config = KstageConfig::load()?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config,
    };
    log::debug!("verbosity {}, API at {}", ctx.verbose, ctx.config.api.base_url);

    let result = run(&ctx, cli.command);
    if let Err(err) = &result
        && let Some(api_err) = err.downcast_ref::<scaleapi::Error>()
    {
        let category = api_err.category();
        ui::error(&format!("{category}: {api_err}"));
        ui::dim(category.advice());
    }
    result
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Sessions(cmd) => {
            let store = store::open(&ctx.config);
            commands::sessions::run(ctx, store.as_ref(), cmd)
        }
        Command::Diff { session } => {
            let store = store::open(&ctx.config);
            commands::apply::diff(ctx, store.as_ref(), &session)
        }
        Command::Apply(args) => {
            let store = store::open(&ctx.config);
            let api = HttpResourceApi::new(&ctx.config.api());
            commands::apply::apply(ctx, store.as_ref(), api, &args)
        }
        Command::Retry {
            session,
            target,
            record,
        } => {
            let store = store::open(&ctx.config);
            let api = HttpResourceApi::new(&ctx.config.api());
            commands::apply::retry(ctx, store.as_ref(), api, &session, &target, record)
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "kstage", &mut io::stdout());
            Ok(())
        }
    }
}
