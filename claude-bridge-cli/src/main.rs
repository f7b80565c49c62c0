use std::process;

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::Parser;
use claude_bridge::protocol;
use claude_bridge_cli::cli::{Cli, Commands};
use claude_bridge_cli::commands;
use claude_bridge_cli::commands::send::SendArgs;
use claude_bridge_cli::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use claude_bridge_cli::logging::configure_logging;

#[tokio::main]
async fn main() {
    install_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{}", e);
                process::exit(EXIT_SUCCESS);
            }
            _ => {
                eprint!("{}", e);
                println!("{}", protocol::failure_line(&usage_error_message(&e)));
                process::exit(EXIT_ERROR);
            }
        },
    };

    configure_logging(cli.verbose, cli.debug, cli.quiet);

    let exit_code = match cli.command {
        Commands::Send {
            message,
            session_id,
            cwd,
            permission_mode,
            stdin,
        } => {
            commands::send::handle_command(SendArgs {
                message,
                session_id,
                cwd,
                permission_mode,
                stdin,
            })
            .await
        }
        Commands::GetSession { session_id, cwd } => {
            commands::get_session::handle_command(session_id, cwd).await
        }
        Commands::GetSlashCommands { cwd, stdin } => {
            commands::get_slash_commands::handle_command(cwd, stdin).await
        }
        Commands::Permissions { subcommand } => {
            commands::permissions::handle_command(subcommand).await
        }
    };

    process::exit(exit_code);
}

/// One-line reason for a rejected command line
fn usage_error_message(error: &clap::Error) -> String {
    if let Some(ContextValue::String(command)) = error.get(ContextKind::InvalidSubcommand) {
        return format!("Unknown command: {}", command);
    }
    if error.kind() == ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand {
        return "No command specified".to_string();
    }
    let rendered = error.render().to_string();
    rendered
        .lines()
        .next()
        .map(|line| line.trim_start_matches("error: ").trim().to_string())
        .filter(|line| !line.is_empty())
        .unwrap_or_else(|| "Invalid arguments".to_string())
}

/// A panic still ends with a failure summary on stdout
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Unexpected internal error".to_string());
        println!("{}", protocol::failure_line(&message));
        process::exit(EXIT_ERROR);
    }));
}
