//! The installer collaborator: grants access to an artifact and hands it to the platform
//! installer.

use std::{
    fmt,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::atomic::{AtomicU64, Ordering},
    thread,
};

use depot_config::config::Config;
use depot_events::{InstallResult, InstallResultBus, InstallStatus, SessionId};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{DepotError, DepotResult, ErrorContext};

const FILE_PLACEHOLDER: &str = "{file}";

/// A URI granting the installer read access to one local artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUri(String);

impl ContentUri {
    /// Grants access to an existing local file.
    pub fn from_file(path: &Path) -> DepotResult<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("resolving {}", path.display()))?;
        let url = Url::from_file_path(&path).map_err(|()| {
            DepotError::Custom(format!("cannot build a file URI for {}", path.display()))
        })?;
        Ok(Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_file_path(&self) -> Option<PathBuf> {
        Url::parse(&self.0).ok()?.to_file_path().ok()
    }
}

impl fmt::Display for ContentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the installer reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallFlow {
    /// Launching is all there is; completion is not observed.
    Direct,
    /// Completion arrives later on the install-result bus, keyed by session id.
    Session,
}

pub trait PackageInstaller: Send + Sync {
    /// Whether installing from this source needs an explicit user consent.
    fn requires_consent(&self) -> bool;

    fn has_consent(&self) -> bool;

    fn grant(&self, path: &Path) -> DepotResult<ContentUri>;

    fn flow(&self) -> InstallFlow;

    /// Fire-and-forget launch used by [`InstallFlow::Direct`].
    fn launch(&self, uri: &ContentUri) -> DepotResult<()>;

    fn create_session(&self, pkg_id: &str) -> DepotResult<SessionId>;

    /// Starts the session. Its result is published on the install-result bus.
    fn commit_session(&self, session_id: SessionId, uri: &ContentUri) -> DepotResult<()>;
}

/// Installs by running an external command such as `adb install -r {file}`.
pub struct CommandInstaller {
    command: Vec<String>,
    flow: InstallFlow,
    consent: bool,
    results: InstallResultBus,
    next_session: AtomicU64,
}

impl CommandInstaller {
    pub fn new(
        command: Vec<String>,
        flow: InstallFlow,
        consent: bool,
        results: InstallResultBus,
    ) -> Self {
        Self {
            command,
            flow,
            consent,
            results,
            next_session: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &Config, results: InstallResultBus) -> Self {
        let flow = if config.install_session() {
            InstallFlow::Session
        } else {
            InstallFlow::Direct
        };
        Self::new(
            config.install_command(),
            flow,
            config.allow_unknown_sources(),
            results,
        )
    }

    /// The command line for `file`; the path is appended when no placeholder is present.
    pub fn command_line(&self, file: &Path) -> Vec<String> {
        let file = file.to_string_lossy();
        let mut args: Vec<String> = self
            .command
            .iter()
            .map(|arg| arg.replace(FILE_PLACEHOLDER, &file))
            .collect();
        if !self.command.iter().any(|arg| arg.contains(FILE_PLACEHOLDER)) {
            args.push(file.into_owned());
        }
        args
    }

    fn spawn(&self, uri: &ContentUri) -> DepotResult<Child> {
        let path = uri.to_file_path().ok_or_else(|| {
            DepotError::Custom(format!("{uri} does not point to a local file"))
        })?;
        let args = self.command_line(&path);
        let Some((program, rest)) = args.split_first() else {
            return Err(DepotError::Custom("install_command is empty".into()));
        };

        debug!(program = %program, args = ?rest, "starting installer");
        Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("starting installer {program}"))
    }
}

impl PackageInstaller for CommandInstaller {
    fn requires_consent(&self) -> bool {
        true
    }

    fn has_consent(&self) -> bool {
        self.consent
    }

    fn grant(&self, path: &Path) -> DepotResult<ContentUri> {
        ContentUri::from_file(path)
    }

    fn flow(&self) -> InstallFlow {
        self.flow
    }

    fn launch(&self, uri: &ContentUri) -> DepotResult<()> {
        let mut child = self.spawn(uri)?;
        let uri = uri.clone();
        thread::spawn(move || {
            match child.wait() {
                Ok(status) => debug!(%uri, ?status, "installer exited"),
                Err(err) => warn!(%uri, "failed to wait for installer: {err}"),
            }
        });
        Ok(())
    }

    fn create_session(&self, pkg_id: &str) -> DepotResult<SessionId> {
        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        debug!(pkg_id, session_id, "install session created");
        Ok(session_id)
    }

    fn commit_session(&self, session_id: SessionId, uri: &ContentUri) -> DepotResult<()> {
        let mut child = self.spawn(uri)?;
        let results = self.results.clone();

        thread::spawn(move || {
            let status = match child.wait() {
                Ok(status) => InstallStatus::from_exit_code(status.code()),
                Err(err) => {
                    InstallStatus::Failure {
                        code: -1,
                        message: Some(err.to_string()),
                    }
                }
            };
            info!(session_id, ?status, "installer finished");
            results.publish(InstallResult {
                session_id,
                status,
            });
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;

    fn installer(command: &[&str], results: InstallResultBus) -> CommandInstaller {
        CommandInstaller::new(
            command.iter().map(|s| s.to_string()).collect(),
            InstallFlow::Session,
            true,
            results,
        )
    }

    #[test]
    fn test_command_line_substitutes_placeholder() {
        let bus = InstallResultBus::new();
        let path = Path::new("/cache/org.app.apk");

        let with = installer(&["adb", "install", "-r", "{file}"], bus.clone());
        assert_eq!(
            with.command_line(path),
            vec!["adb", "install", "-r", "/cache/org.app.apk"]
        );

        let without = installer(&["pm", "install"], bus);
        assert_eq!(
            without.command_line(path),
            vec!["pm", "install", "/cache/org.app.apk"]
        );
    }

    #[test]
    fn test_grant_produces_file_uri() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("org.app.apk");
        std::fs::write(&file, b"apk").unwrap();

        let uri = installer(&["true"], InstallResultBus::new())
            .grant(&file)
            .unwrap();
        assert!(uri.as_str().starts_with("file://"));
        assert_eq!(uri.to_file_path(), Some(file.canonicalize().unwrap()));

        assert!(installer(&["true"], InstallResultBus::new())
            .grant(&dir.path().join("missing.apk"))
            .is_err());
    }

    #[tokio::test]
    async fn test_commit_session_publishes_exit_status() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("org.app.apk");
        std::fs::write(&file, b"apk").unwrap();

        let bus = InstallResultBus::new();
        let ok = installer(&["sh", "-c", "test -f \"$0\"", "{file}"], bus.clone());
        let uri = ok.grant(&file).unwrap();

        let session = ok.create_session("org.app").unwrap();
        let pending = bus.register(session);
        ok.commit_session(session, &uri).unwrap();
        assert_eq!(
            pending.wait(Duration::from_secs(10)).await,
            Ok(InstallStatus::Success)
        );

        let failing = installer(&["sh", "-c", "exit 3", "{file}"], bus.clone());
        let session = failing.create_session("org.app").unwrap();
        let pending = bus.register(session);
        failing.commit_session(session, &uri).unwrap();
        assert_eq!(
            pending.wait(Duration::from_secs(10)).await,
            Ok(InstallStatus::Failure {
                code: 3,
                message: None
            })
        );
    }

    #[test]
    fn test_missing_program_fails_to_launch() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("org.app.apk");
        std::fs::write(&file, b"apk").unwrap();

        let installer = installer(&["depot-no-such-installer"], InstallResultBus::new());
        let uri = installer.grant(&file).unwrap();
        assert!(matches!(
            installer.launch(&uri),
            Err(DepotError::IoError { .. })
        ));
    }
}
