use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("installing packages requires root privileges; re-run with sudo")]
pub struct PrivilegeError;

/// Whether the process runs with an effective uid of 0.
#[allow(unsafe_code)]
pub fn is_root() -> bool {
    // SAFETY: geteuid(2) takes no arguments, cannot fail and touches no memory.
    unsafe { libc::geteuid() == 0 }
}

/// # Errors
///
/// Returns [`PrivilegeError`] unless running as root.
pub fn ensure_root() -> Result<(), PrivilegeError> {
    if is_root() { Ok(()) } else { Err(PrivilegeError) }
}
