pub mod args;
pub mod commands;
pub mod helpers;

use iajson_client::IaJsonError;

pub const EXIT_SUCCESS: i32 = 0;
/// Local input or configuration problem.
pub const EXIT_USAGE: i32 = 1;

/// Map a command failure to a process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<IaJsonError>()
        .map(IaJsonError::exit_code)
        .unwrap_or(EXIT_USAGE)
}
