//! Interactive destruction of the named resource.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

use super::{ReconcileError, find_by_name};
use crate::provider::{ManagedResource, Provider};

/// Exact answer required to destroy a resource.
pub const CONFIRMATION: &str = "YES";

/// Result of [`teardown`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TeardownOutcome {
    /// No resource carried the name.
    NotFound,
    /// The operator did not confirm.
    Aborted,
    /// The resource was destroyed.
    Destroyed {
        /// Identifier of the destroyed resource.
        id: String,
    },
}

/// Finds the resource called `name`, prints it, and destroys it only when
/// the operator answers exactly `YES` (surrounding whitespace ignored).
/// Any other answer returns silently with [`TeardownOutcome::Aborted`].
///
/// The answer is read asynchronously so an interrupt can end the wait.
///
/// # Errors
///
/// Returns [`ReconcileError::Provider`] when listing or destruction fails and
/// [`ReconcileError::Prompt`] when the prompt cannot be written or read.
pub async fn teardown<P, I, O>(
    provider: &P,
    name: &str,
    input: &mut I,
    output: &mut O,
) -> Result<TeardownOutcome, ReconcileError>
where
    P: Provider + ?Sized,
    I: AsyncBufRead + Unpin,
    O: Write,
{
    let Some(resource) = find_by_name(provider, name).await? else {
        writeln!(output, "Virtual machine {name} did not exist").map_err(prompt_error)?;
        return Ok(TeardownOutcome::NotFound);
    };

    write_prompt(output, &resource).map_err(prompt_error)?;

    let mut answer = String::new();
    input.read_line(&mut answer).await.map_err(prompt_error)?;
    if answer.trim() != CONFIRMATION {
        info!(id = %resource.id, "teardown aborted");
        return Ok(TeardownOutcome::Aborted);
    }

    info!(id = %resource.id, name, "destroying resource");
    provider.destroy_resource(&resource.id).await?;
    writeln!(output, "Virtual machine {name} destroyed").map_err(prompt_error)?;
    Ok(TeardownOutcome::Destroyed { id: resource.id })
}

fn write_prompt<O: Write>(output: &mut O, resource: &ManagedResource) -> std::io::Result<()> {
    writeln!(output, "Do you really want to destroy the following virtual machine?")?;
    writeln!(output, "{resource}")?;
    write!(output, "Confirm with \"{CONFIRMATION}\": ")?;
    output.flush()
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "used as a map_err adapter over owned io errors"
)]
fn prompt_error(err: std::io::Error) -> ReconcileError {
    ReconcileError::Prompt(err.to_string())
}
