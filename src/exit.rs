//! Process exit codes.

use mediasqueeze_av::RemoteError;

pub const SUCCESS: i32 = 0;
pub const CONNECTIVITY: i32 = 10;
pub const CLIENT_ERROR: i32 = 11;
pub const QUOTA_EXCEEDED: i32 = 12;
pub const GENERIC: i32 = 50;
pub const INTERRUPTED: i32 = 130;

/// The run was stopped by Ctrl-C.
#[derive(Debug, thiserror::Error)]
#[error("Interrupted")]
pub struct Interrupted;

/// Pick the exit code for an error by walking its cause chain.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<Interrupted>().is_some() {
        return INTERRUPTED;
    }
    for cause in err.chain() {
        if cause.is::<Interrupted>() {
            return INTERRUPTED;
        }
        if let Some(remote) = cause.downcast_ref::<RemoteError>() {
            return remote_code(remote);
        }
        if let Some(av) = cause.downcast_ref::<mediasqueeze_av::Error>() {
            match av {
                mediasqueeze_av::Error::Remote(remote) => return remote_code(remote),
                mediasqueeze_av::Error::Cancelled { .. } => return INTERRUPTED,
                _ => {}
            }
        }
    }
    GENERIC
}

fn remote_code(err: &RemoteError) -> i32 {
    match err {
        RemoteError::Connectivity(_) => CONNECTIVITY,
        RemoteError::Client { .. } => CLIENT_ERROR,
        RemoteError::QuotaExceeded(_) => QUOTA_EXCEEDED,
    }
}
