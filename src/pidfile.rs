//! Stale-process detection via a PID file under `<site_root>/.hotsite/`.
//!
//! Presence of the file means a server is either still running or died
//! without cleaning up after itself; `StalePid::detect` tells the caller
//! which.

use std::path::{Path, PathBuf};

pub fn pid_file_path(site_root: &Path) -> PathBuf {
    site_root.join(".hotsite").join("server.pid")
}

pub enum StalePid {
    None,
    Live(u32),
    Dead(u32),
}

pub fn detect(site_root: &Path) -> std::io::Result<StalePid> {
    let path = pid_file_path(site_root);
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return Ok(StalePid::None);
    };

    let Ok(pid) = contents.trim().parse::<u32>() else {
        std::fs::remove_file(&path)?;
        return Ok(StalePid::None);
    };

    if is_alive(pid) {
        Ok(StalePid::Live(pid))
    } else {
        Ok(StalePid::Dead(pid))
    }
}

pub fn write(site_root: &Path) -> std::io::Result<PathBuf> {
    let path = pid_file_path(site_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, std::process::id().to_string())?;
    Ok(path)
}

pub fn remove(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Sends SIGTERM to `pid`. Errors are the caller's to report as
/// `HotsiteError::StaleProcessKillFailed`.
pub fn terminate(pid: u32) -> std::io::Result<()> {
    let status = std::process::Command::new("kill")
        .arg(pid.to_string())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("kill exited with {status}")))
    }
}

#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
        || std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pid_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(detect(dir.path()).unwrap(), StalePid::None));
    }

    #[test]
    fn write_then_detect_live_for_current_process() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path()).unwrap();
        match detect(dir.path()).unwrap() {
            StalePid::Live(pid) => assert_eq!(pid, std::process::id()),
            _ => panic!("expected Live"),
        }
    }

    #[test]
    fn garbage_contents_are_treated_as_none_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = pid_file_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not-a-pid").unwrap();
        assert!(matches!(detect(dir.path()).unwrap(), StalePid::None));
        assert!(!path.exists());
    }

    #[test]
    fn a_pid_no_process_could_ever_have_is_dead() {
        let dir = tempfile::tempdir().unwrap();
        let path = pid_file_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "999999999").unwrap();
        assert!(matches!(detect(dir.path()).unwrap(), StalePid::Dead(_)));
    }
}
