//! Local autoconnect commands with `$IP`, `$USER` and `$PASS` substitution.

use std::ffi::OsString;
use std::io::Write;

use thiserror::Error;
use tracing::info;

use crate::remote::{CommandRunner, SpawnError, run_blocking};

/// Placeholder replaced with the machine's address.
pub const ADDRESS_PLACEHOLDER: &str = "$IP";
/// Placeholder replaced with the VPN username.
pub const USERNAME_PLACEHOLDER: &str = "$USER";
/// Placeholder replaced with the VPN password.
pub const PASSWORD_PLACEHOLDER: &str = "$PASS";

/// Errors raised while running local connect commands.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConnectError {
    /// Raised when a command cannot be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Raised when a command exits unsuccessfully.
    #[error("`{program}` {status}: {output}")]
    Failed {
        /// Program that failed.
        program: String,
        /// Exit status description.
        status: String,
        /// Combined standard output and error.
        output: String,
    },
    /// Raised when command output cannot be echoed.
    #[error("failed to write command output: {0}")]
    Output(String),
}

/// Replaces every placeholder occurrence in every argument.
#[must_use]
pub fn substitute_variables(
    commands: &[Vec<String>],
    address: &str,
    username: &str,
    password: &str,
) -> Vec<Vec<String>> {
    commands
        .iter()
        .map(|args| {
            args.iter()
                .map(|arg| {
                    arg.replace(ADDRESS_PLACEHOLDER, address)
                        .replace(USERNAME_PLACEHOLDER, username)
                        .replace(PASSWORD_PLACEHOLDER, password)
                })
                .collect()
        })
        .collect()
}

/// Runs each command in order, echoing its output, and stops at the first
/// failure.
///
/// # Errors
///
/// Returns [`ConnectError`] when a command cannot start, exits non-zero, or
/// its output cannot be written.
pub async fn run_connect_commands<R: CommandRunner, W: Write>(
    runner: &R,
    commands: &[Vec<String>],
    output: &mut W,
) -> Result<(), ConnectError> {
    for command in commands {
        let Some((program, rest)) = command.split_first() else {
            continue;
        };
        info!(program = %program, "running connect command");
        let args: Vec<OsString> = rest.iter().map(OsString::from).collect();
        let result = run_blocking(runner, program, args).await?;
        let combined = format!("{}{}", result.stdout, result.stderr);
        output
            .write_all(combined.as_bytes())
            .map_err(|err| ConnectError::Output(err.to_string()))?;
        if !result.is_success() {
            return Err(ConnectError::Failed {
                program: program.clone(),
                status: result.status_text(),
                output: combined.trim().to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| (*arg).to_owned()).collect()
    }

    #[test]
    fn substitutes_every_placeholder() {
        let commands = vec![owned(&["connect", "$IP", "$USER:$PASS"])];
        let result = substitute_variables(&commands, "10.0.0.1", "bob", "hunter2");
        assert_eq!(result, vec![owned(&["connect", "10.0.0.1", "bob:hunter2"])]);
    }

    #[test]
    fn substitution_leaves_plain_arguments_alone() {
        let commands = vec![owned(&["pon", "burrow"]), owned(&["echo", "$IP$IP"])];
        let result = substitute_variables(&commands, "1.2.3.4", "u", "p");
        assert_eq!(
            result,
            vec![owned(&["pon", "burrow"]), owned(&["echo", "1.2.3.41.2.3.4"])]
        );
    }

    #[test]
    fn arguments_with_spaces_survive_substitution() {
        let commands = vec![owned(&["nmcli", "con", "up", "id", "My VPN $IP"])];
        let result = substitute_variables(&commands, "10.0.0.1", "u", "p");
        assert_eq!(
            result,
            vec![owned(&["nmcli", "con", "up", "id", "My VPN 10.0.0.1"])]
        );
    }

    #[tokio::test]
    async fn runs_commands_in_order() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(0), "created\n", "");
        runner.push_output(Some(0), "up\n", "");
        let mut output = Vec::new();
        let commands = vec![owned(&["pptpsetup", "--server", "1.2.3.4"]), owned(&["pon", "burrow"])];

        run_connect_commands(&runner, &commands, &mut output)
            .await
            .unwrap_or_else(|err| panic!("commands should succeed: {err}"));

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);
        assert_eq!(
            invocations.first().map(|call| call.command_string()),
            Some("pptpsetup --server 1.2.3.4".to_owned())
        );
        assert_eq!(String::from_utf8_lossy(&output), "created\nup\n");
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(2), "", "no such peer");
        let mut output = Vec::new();
        let commands = vec![owned(&["pon", "burrow"]), owned(&["never"])];

        let err = run_connect_commands(&runner, &commands, &mut output)
            .await
            .err()
            .unwrap_or_else(|| panic!("failing command should error"));

        assert!(err.to_string().contains("no such peer"), "error: {err}");
        assert_eq!(runner.invocations().len(), 1);
    }
}
