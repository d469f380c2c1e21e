//! Handing a generated file to the host environment.
//!
//! The player never talks to the OS directly; it calls an [`ExportSink`].
//! [`SystemExport`] reveals files with the platform file manager. Native
//! drag-and-drop needs a windowing host, so it reports drag as unsupported
//! and front-ends that can drag provide their own sink.

use reqwest::Url;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::thread::JoinHandle;
use tracing::debug;

use crate::error::{NoisesError, Result};

/// What a drag operation carries: the file and its `file://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragPayload {
    pub path: PathBuf,
    pub uri: String,
}

impl DragPayload {
    pub fn new(path: &Path) -> Result<Self> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| NoisesError::Export(format!("cannot resolve {}: {}", path.display(), e)))?
                .join(path)
        };
        let uri = Url::from_file_path(&absolute)
            .map_err(|_| {
                NoisesError::Export(format!("{} is not a valid file path", absolute.display()))
            })?
            .to_string();
        Ok(Self {
            path: absolute,
            uri,
        })
    }

    /// The payload as a `text/uri-list` body.
    pub fn uri_list(&self) -> String {
        format!("{}\r\n", self.uri)
    }
}

/// Host capabilities used by the player to export an artifact.
pub trait ExportSink {
    /// Open the artifact's folder in the OS file browser.
    fn reveal(&self, path: &Path) -> Result<()>;

    /// Start a native drag carrying the artifact.
    fn start_drag(&self, payload: &DragPayload) -> Result<()>;
}

/// Reveal through the platform file manager; drag unsupported.
#[derive(Debug, Clone, Default)]
pub struct SystemExport;

impl SystemExport {
    fn reveal_command(path: &Path) -> Command {
        #[cfg(target_os = "windows")]
        {
            let mut cmd = Command::new("explorer");
            cmd.arg(format!("/select,{}", path.display()));
            cmd
        }
        #[cfg(target_os = "macos")]
        {
            let mut cmd = Command::new("open");
            cmd.arg("-R").arg(path);
            cmd
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let folder = path.parent().unwrap_or(path);
            let mut cmd = Command::new("xdg-open");
            cmd.arg(folder);
            cmd
        }
    }
}

impl ExportSink for SystemExport {
    fn reveal(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(NoisesError::Export(format!(
                "{} does not exist",
                path.display()
            )));
        }
        spawn_reaped(Self::reveal_command(path))
            .map(|_| ())
            .map_err(|e| NoisesError::Export(format!("failed to open file manager: {}", e)))
    }

    fn start_drag(&self, payload: &DragPayload) -> Result<()> {
        Err(NoisesError::Export(format!(
            "native drag is not available without a window host ({})",
            payload.uri
        )))
    }
}

/// Start `cmd` without blocking and wait for it on a detached thread so the
/// child never lingers as a zombie.
fn spawn_reaped(mut cmd: Command) -> std::io::Result<JoinHandle<Option<ExitStatus>>> {
    let mut child = cmd.spawn()?;
    Ok(std::thread::spawn(move || match child.wait() {
        Ok(status) => Some(status),
        Err(e) => {
            debug!(error = %e, "failed to wait for helper process");
            None
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_drag_payload_uri() {
        let payload = DragPayload::new(Path::new("/samples/loops/kick 01.wav")).unwrap();
        assert_eq!(payload.uri, "file:///samples/loops/kick%2001.wav");
        assert_eq!(payload.uri_list(), "file:///samples/loops/kick%2001.wav\r\n");
    }

    #[test]
    fn test_relative_path_is_made_absolute() {
        let payload = DragPayload::new(Path::new("out.wav")).unwrap();
        assert!(payload.path.is_absolute());
        assert!(payload.uri.starts_with("file://"));
    }

    #[test]
    fn test_reveal_missing_file_fails() {
        let err = SystemExport
            .reveal(Path::new("/definitely/not/here.wav"))
            .unwrap_err();
        assert!(matches!(err, NoisesError::Export(_)));
    }

    #[test]
    fn test_system_drag_unsupported() {
        let payload = DragPayload::new(Path::new("x.wav")).unwrap();
        assert!(SystemExport.start_drag(&payload).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_spawned_helper_is_waited_on() {
        let waiter = spawn_reaped(Command::new("true")).unwrap();
        let status = waiter.join().unwrap();
        assert!(status.unwrap().success());
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        assert!(spawn_reaped(Command::new("noises-no-such-helper")).is_err());
    }
}
