//! Binary startup: arguments, logging, context, command

use crate::app::cli::{Args, Command};
use crate::app::commands;
use crate::app::error::{AppError, AppResult};
use crate::core::context::GridContext;
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::init_logging;
use crate::core::shutdown::install_signal_handlers;
use crate::listener::BrokerListener;
use crate::services::Service;
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

/// Parse the command line, run the selected command and map the result to
/// an exit code
pub fn startup() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.logging_options(std::io::stdout().is_terminal())) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }
    log::info!(
        "crawlgrid {} ({}, built {}, envelope version {})",
        env!("CARGO_PKG_VERSION"),
        crate::GIT_HASH,
        crate::BUILD_TIME,
        crate::ENVELOPE_VERSION
    );

    let command = args.command();
    match execute(&args, &command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_error_with_context(&e, &format!("{:?} failed", command));
            ExitCode::FAILURE
        }
    }
}

/// Run `command` with the configuration resolved from `args`
pub fn execute(args: &Args, command: &Command) -> AppResult<()> {
    let config = args.resolve_config()?;
    config.log_entries();
    let context = Arc::new(GridContext::init(config)?);

    match command {
        Command::Run => {
            let service = args.service.ok_or(AppError::NoService)?;
            let listener = BrokerListener::new(context.clone(), service, &commands::default_registry())?;
            install_signal_handlers(context.shutdown_signal().clone()).map_err(AppError::Signal)?;
            commands::run(&context, listener)
        }
        Command::Send { queue, payload } => {
            let service = args.service.ok_or(AppError::NoService)?;
            let result = commands::send(context.broker(), service, queue, payload.as_deref());
            context.shutdown();
            result
        }
        Command::Status => {
            let services: Vec<Service> = match args.service {
                Some(service) => vec![service],
                None => Service::all().collect(),
            };
            let result = commands::status(context.broker(), &services);
            context.shutdown();
            for line in result? {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Clear { queue } => {
            let service = args.service.ok_or(AppError::NoService)?;
            let result = commands::clear(context.broker(), service, queue);
            context.shutdown();
            result
        }
    }
}
