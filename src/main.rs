//! shell-execute binary entry point.

use std::io::Write;
use std::process::ExitCode;

use shell_execute::cli::{self, ArgsError, EXIT_CANNOT_RUN, EXIT_USAGE};
use shell_execute::config::Config;
use shell_execute::{logging, ExecuteError, Executor};
use tracing::{debug, error};

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Try 'shell-execute --help' for more information.");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    logging::try_init_with_level(Some(config.log_filter())).ok();
    debug!(?config, "configuration loaded");

    let executor = match config.executor_config() {
        Ok(executor_config) => Executor::new(executor_config),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let prepared = args
        .run_options()
        .and_then(|options| Ok((args.request(&options)?, options)));
    let (request, options) = match prepared {
        Ok(parts) => parts,
        Err(e @ ArgsError::Options(_)) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_CANNOT_RUN);
        }
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let strict = args.is_strict(&options);
    let outcome = if strict {
        executor.run_or_fail(&request)
    } else {
        executor.run(&request)
    };

    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();
    let forwarded = match &outcome {
        Ok(result) => stdout
            .write_all(&result.stdout)
            .and_then(|_| stderr.write_all(&result.stderr)),
        Err(ExecuteError::StatusMismatch { message, result, .. }) => stdout
            .write_all(&result.stdout)
            .and_then(|_| stderr.write_all(message.as_bytes())),
        Err(ExecuteError::Timeout {
            stdout: out,
            stderr: err,
            limit,
        }) => {
            error!(?limit, "command timed out");
            stdout.write_all(out).and_then(|_| stderr.write_all(err))
        }
        Err(e) => writeln!(stderr, "error: {e}"),
    };
    if let Err(e) = forwarded.and_then(|_| stdout.flush()) {
        debug!(error = %e, "could not forward captured output");
    }

    ExitCode::from(cli::exit_code_for(&outcome))
}
