//! Process/executable metadata, used to name rotated log files and the
//! default `state.json` location. Grounded on the teacher's
//! `utils/misc/sys_info.rs`, trimmed to the fields Pode actually consumes.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessInfoError {
    #[error("failed to locate the current executable: {0}")]
    CurrentExe(#[from] std::io::Error),
    #[error("executable path has no file name")]
    NoFileName,
}

/// Basic facts about the running process, independent of any one endpoint
/// or protocol.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Base name of the executable, used as the log-file prefix.
    pub basename: String,
    /// Directory the executable lives in, used as the default config/log dir.
    pub location: PathBuf,
    /// Process id, included in structured log lines.
    pub pid: u32,
    /// Hostname, used for `Strict` session binding and log context.
    pub hostname: String,
}

pub fn get_process_info() -> Result<ProcessInfo, ProcessInfoError> {
    let exe = env::current_exe()?;
    let basename = exe
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or(ProcessInfoError::NoFileName)?
        .to_string();
    let location = exe
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());

    Ok(ProcessInfo {
        basename,
        location,
        pid: std::process::id(),
        hostname,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_a_nonempty_basename_and_hostname() {
        let info = get_process_info().expect("process info should be available in tests");
        assert!(!info.basename.is_empty());
        assert!(!info.hostname.is_empty());
        assert!(info.pid > 0);
    }
}
