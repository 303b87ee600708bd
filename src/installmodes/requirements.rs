use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use tracing::debug;

use super::InstallModeError;

/// Checks that every binary resolves to an executable in `search_path`.
///
/// The process `PATH` is used when no search path is given.
pub fn check_executables<'a, I>(
    binaries: I,
    search_path: Option<&OsStr>,
) -> Result<(), InstallModeError>
where
    I: IntoIterator<Item = &'a str>,
{
    let search_path: Option<OsString> = search_path
        .map(OsStr::to_os_string)
        .or_else(|| std::env::var_os("PATH"));
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));

    for binary in binaries {
        let found = which::which_in(binary, search_path.as_ref(), &cwd)
            .map_err(|_| InstallModeError::RequirementMissing(binary.to_string()))?;
        debug!(binary, path = %found.display(), "requirement found");
    }
    Ok(())
}
