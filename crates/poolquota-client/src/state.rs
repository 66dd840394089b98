use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{ClientError, ClientResult};

pub const STATE_HOME_ENV: &str = "POOLQUOTA_HOME";

const STATE_DB_FILE: &str = "state.db";

/// Directory that holds persisted run state: the explicit override, then
/// `POOLQUOTA_HOME`, then `~/.poolquota`. Always returned absolute.
pub fn resolve_state_home(home_override: Option<&Path>) -> ClientResult<PathBuf> {
    let candidate = home_override
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(STATE_HOME_ENV).map(PathBuf::from))
        .or_else(|| home::home_dir().map(|home| home.join(".poolquota")))
        .ok_or_else(|| {
            ClientError::store_failed(
                Path::new("."),
                "Could not resolve a home directory for run state.",
            )
        })?;

    if candidate.is_absolute() {
        return Ok(candidate);
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&candidate))
        .map_err(|error| ClientError::store_failed(&candidate, &error.to_string()))
}

/// Creates the state home if needed and restricts it to the current user.
pub fn ensure_state_directory(path: &Path) -> ClientResult<()> {
    fs::create_dir_all(path).map_err(|error| match error.kind() {
        io::ErrorKind::PermissionDenied => {
            ClientError::store_permission_denied(path, &error.to_string())
        }
        _ => ClientError::store_failed(path, &error.to_string()),
    })?;
    restrict_to_owner(path);
    Ok(())
}

pub fn state_db_path(home: &Path) -> PathBuf {
    home.join(STATE_DB_FILE)
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
        tracing::debug!(path = %path.display(), %error, "could not restrict state home");
    }
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) {}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{ensure_state_directory, resolve_state_home, state_db_path};

    #[test]
    fn explicit_override_wins_and_is_absolute() {
        let resolved = resolve_state_home(Some(Path::new("relative-home")));
        assert!(resolved.is_ok());
        if let Ok(path) = resolved {
            assert!(path.is_absolute());
            assert!(path.ends_with("relative-home"));
            assert!(state_db_path(&path).ends_with("relative-home/state.db"));
        }
    }

    #[test]
    fn state_directory_is_created_on_demand() {
        let temp = tempfile::tempdir();
        assert!(temp.is_ok());
        if let Ok(temp) = temp {
            let nested = temp.path().join("a").join("b");
            assert!(ensure_state_directory(&nested).is_ok());
            assert!(nested.is_dir());

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = fs::metadata(&nested).map(|meta| meta.permissions().mode() & 0o777);
                assert!(matches!(mode, Ok(0o700)));
            }
        }
    }

    #[test]
    fn a_file_in_the_way_is_a_store_failure() {
        let temp = tempfile::tempdir();
        assert!(temp.is_ok());
        if let Ok(temp) = temp {
            let blocker = temp.path().join("state");
            assert!(fs::write(&blocker, b"not a directory").is_ok());
            let result = ensure_state_directory(&blocker.join("nested"));
            assert!(result.is_err());
            if let Err(error) = result {
                assert!(error.code.starts_with("store_"));
                assert!(error.is_internal());
            }
        }
    }
}
