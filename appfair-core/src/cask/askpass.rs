//! `SUDO_ASKPASS` helper
//!
//! Casks that install pkg files run `sudo`. With no terminal attached, sudo
//! asks the program named by `SUDO_ASKPASS` for the password; this helper
//! shows a hidden-answer dialog through `osascript` and prints the reply.

use std::path::{Path, PathBuf};

use crate::error::{FairError, Result};

pub const ASKPASS_FILE_NAME: &str = "appfair-askpass.sh";

fn script() -> String {
    let prompt = "App Fair needs an administrator password to complete the Homebrew operation.";
    format!(
        "#!/bin/sh\n\
         exec /usr/bin/osascript \
         -e 'text returned of (display dialog \"{prompt}\" default answer \"\" \
         with title \"App Fair\" with icon caution with hidden answer)'\n"
    )
}

/// Write the helper into `dir` with mode 0700 and return its path
pub fn write_askpass(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .map_err(|e| FairError::io("Failed to create askpass directory", dir, e))?;

    let path = dir.join(ASKPASS_FILE_NAME);
    std::fs::write(&path, script())
        .map_err(|e| FairError::io("Failed to write askpass helper", &path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))
            .map_err(|e| FairError::io("Failed to set askpass permissions", &path, e))?;
    }

    tracing::debug!("Wrote askpass helper {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_askpass_is_private_and_hidden() {
        let temp = TempDir::new().unwrap();
        let path = write_askpass(temp.path()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("#!/bin/sh"));
        assert!(content.contains("with hidden answer"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
