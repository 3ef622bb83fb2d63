use std::{
    collections::HashMap,
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, RecvTimeoutError},
        Arc, LazyLock,
    },
    time::Duration,
};

use depot_events::{DepotEvent, InstallStage, LogLevel, OperationId, SyncStage, VerifyStage};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nu_ansi_term::Color::{Cyan, Green, Red, Yellow};
use tracing::{debug, error, info, warn};

use crate::utils::{progress_enabled, Icons};

/// Shared MultiProgress instance for suspend/stop from other modules.
static MULTI: LazyLock<Arc<MultiProgress>> = LazyLock::new(|| Arc::new(MultiProgress::new()));

const TICK: Duration = Duration::from_millis(100);

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

/// Owns the background progress thread returned by [`spawn_event_handler`].
///
/// Deferred cache cleanups keep a clone of the event sink alive after the command
/// finishes, so the thread cannot wait for the channel to close. [`finish`](ProgressGuard::finish)
/// drains whatever is queued and then stops it.
pub struct ProgressGuard {
    handle: Option<std::thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl ProgressGuard {
    pub fn finish(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix}  {wide_bar:.cyan/dim}  {bytes}/{total_bytes}  {bytes_per_sec}  {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━━─")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Format a colored prefix: name in cyan, #package_id dimmed.
fn colored_prefix(pkg_name: &str, pkg_id: &str) -> String {
    format!(
        "{}{}",
        Cyan.paint(pkg_name),
        nu_ansi_term::Style::new()
            .dimmed()
            .paint(format!("#{pkg_id}"))
    )
}

fn create_op_spinner(msg: &str) -> ProgressBar {
    let pb = if progress_enabled() {
        MULTI.add(ProgressBar::new_spinner())
    } else {
        MULTI.add(ProgressBar::hidden())
    };
    pb.set_style(spinner_style());
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(TICK);
    pb
}

fn print_line(icon: impl Display, subject: &str, status: &str) {
    MULTI.suspend(|| {
        eprintln!(" {icon} {subject}: {status}");
    });
}

/// Turn an existing download bar into a spinner, or start a new spinner.
fn set_spinner(jobs: &mut HashMap<OperationId, ProgressBar>, op_id: OperationId, msg: String) {
    let pb = jobs.entry(op_id).or_insert_with(|| create_op_spinner(&msg));
    pb.set_style(spinner_style());
    pb.set_message(msg);
}

/// Spawn a background thread that maps [`DepotEvent`]s to indicatif progress bars.
///
/// Each install (`op_id`) gets a single bar that starts as a download bar and turns
/// into a spinner for verification and hand-off. Each repository being synced gets a
/// spinner that is replaced by a status line once the repository is done.
pub fn spawn_event_handler(receiver: Receiver<DepotEvent>) -> ProgressGuard {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = std::thread::spawn(move || {
        let mut jobs: HashMap<OperationId, ProgressBar> = HashMap::new();
        let mut sync_jobs: HashMap<String, ProgressBar> = HashMap::new();

        loop {
            let event = match receiver.recv_timeout(TICK) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => {
                    if stop_flag.load(Ordering::Acquire) {
                        break;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match event {
                // ── Repository sync ────────────────────────────────────
                DepotEvent::SyncProgress {
                    repo_name,
                    index,
                    total,
                    stage,
                } => {
                    match stage {
                        SyncStage::Fetching | SyncStage::Parsing => {
                            let action = if stage == SyncStage::Fetching {
                                "fetching index"
                            } else {
                                "parsing index"
                            };
                            let msg = format!("[{}/{total}] {repo_name}: {action}", index + 1);
                            let pb = sync_jobs
                                .entry(repo_name)
                                .or_insert_with(|| create_op_spinner(&msg));
                            pb.set_message(msg);
                        }
                        SyncStage::UpToDate
                        | SyncStage::Complete {
                            ..
                        } => {
                            if let Some(pb) = sync_jobs.remove(&repo_name) {
                                pb.finish_and_clear();
                            }
                            let status = match stage {
                                SyncStage::Complete {
                                    package_count,
                                } => format!("{package_count} packages"),
                                _ => "up to date".to_string(),
                            };
                            print_line(
                                Green.paint(Icons::CHECK),
                                &Cyan.paint(&repo_name).to_string(),
                                &nu_ansi_term::Style::new().dimmed().paint(status).to_string(),
                            );
                        }
                    }
                }
                DepotEvent::SyncFailed {
                    repo_name,
                    error,
                } => {
                    if let Some(pb) = sync_jobs.remove(&repo_name) {
                        pb.finish_and_clear();
                    }
                    print_line(
                        Red.paint(Icons::CROSS),
                        &Cyan.paint(&repo_name).to_string(),
                        &Red.paint(error).to_string(),
                    );
                }
                DepotEvent::CatalogReplaced {
                    package_count,
                } => {
                    debug!(package_count, "catalog replaced");
                }

                // ── Download lifecycle ──────────────────────────────────
                DepotEvent::DownloadStarting {
                    op_id,
                    pkg_name,
                    pkg_id,
                    total,
                } => {
                    let pb = if progress_enabled() {
                        MULTI.add(ProgressBar::new(total))
                    } else {
                        MULTI.add(ProgressBar::hidden())
                    };
                    pb.set_style(download_style());
                    pb.set_prefix(colored_prefix(&pkg_name, &pkg_id));
                    pb.enable_steady_tick(TICK);
                    if let Some(old) = jobs.insert(op_id, pb) {
                        old.finish_and_clear();
                    }
                }
                DepotEvent::DownloadProgress {
                    op_id,
                    current,
                    total,
                    ..
                } => {
                    if let Some(pb) = jobs.get(&op_id) {
                        if total > 0 {
                            pb.set_length(total);
                        }
                        pb.set_position(current);
                    }
                }
                DepotEvent::DownloadComplete {
                    op_id,
                    total,
                    ..
                } => {
                    if let Some(pb) = jobs.get(&op_id) {
                        pb.set_length(total);
                        pb.set_position(total);
                    }
                }
                DepotEvent::DownloadCancelled {
                    op_id,
                    pkg_name,
                    pkg_id,
                } => {
                    if let Some(pb) = jobs.remove(&op_id) {
                        pb.finish_and_clear();
                    }
                    print_line(
                        Yellow.paint(Icons::WARNING),
                        &Cyan.paint(format!("{pkg_name}#{pkg_id}")).to_string(),
                        &Yellow.paint("cancelled").to_string(),
                    );
                }

                // ── Verification ───────────────────────────────────────
                DepotEvent::Verifying {
                    op_id,
                    pkg_name,
                    pkg_id,
                    stage,
                } => {
                    match stage {
                        VerifyStage::Checksum => {
                            set_spinner(
                                &mut jobs,
                                op_id,
                                format!("{pkg_name}#{pkg_id}: verifying checksum"),
                            );
                        }
                        VerifyStage::Skipped => {
                            debug!(pkg_id = %pkg_id, "no checksum published, skipping verification");
                        }
                        VerifyStage::Passed => {}
                        VerifyStage::Failed(_) => {
                            if let Some(pb) = jobs.remove(&op_id) {
                                pb.finish_and_clear();
                            }
                        }
                    }
                }

                // ── Installation stages ────────────────────────────────
                DepotEvent::Installing {
                    op_id,
                    pkg_name,
                    pkg_id,
                    stage,
                } => {
                    let msg = match stage {
                        InstallStage::CacheHit => {
                            Some(format!("{pkg_name}#{pkg_id}: using cached artifact"))
                        }
                        InstallStage::Launching => {
                            Some(format!("{pkg_name}#{pkg_id}: launching installer"))
                        }
                        InstallStage::AwaitingResult {
                            session_id,
                        } => {
                            Some(format!(
                                "{pkg_name}#{pkg_id}: waiting for installer (session {session_id})"
                            ))
                        }
                        InstallStage::Complete => None,
                    };
                    if let Some(msg) = msg {
                        set_spinner(&mut jobs, op_id, msg);
                    }
                }
                DepotEvent::PermissionRequired {
                    op_id,
                    pkg_name,
                    pkg_id,
                } => {
                    if let Some(pb) = jobs.remove(&op_id) {
                        pb.finish_and_clear();
                    }
                    print_line(
                        Yellow.paint(Icons::WARNING),
                        &Cyan.paint(format!("{pkg_name}#{pkg_id}")).to_string(),
                        &Yellow
                            .paint("permission to install from unknown sources is required")
                            .to_string(),
                    );
                }

                // ── Terminal events ────────────────────────────────────
                DepotEvent::OperationComplete {
                    op_id,
                    pkg_name,
                    pkg_id,
                } => {
                    if let Some(pb) = jobs.remove(&op_id) {
                        pb.finish_and_clear();
                    }
                    print_line(
                        Green.paint(Icons::CHECK),
                        &Cyan.paint(format!("{pkg_name}#{pkg_id}")).to_string(),
                        &Green.paint("installed").to_string(),
                    );
                }
                DepotEvent::OperationFailed {
                    op_id,
                    pkg_name,
                    pkg_id,
                    error,
                } => {
                    if let Some(pb) = jobs.remove(&op_id) {
                        pb.finish_and_clear();
                    }
                    print_line(
                        Red.paint(Icons::CROSS),
                        &Cyan.paint(format!("{pkg_name}#{pkg_id}")).to_string(),
                        &Red.paint(error).to_string(),
                    );
                }

                DepotEvent::Log {
                    level,
                    message,
                } => {
                    match level {
                        LogLevel::Debug => debug!("{message}"),
                        LogLevel::Info => info!("{message}"),
                        LogLevel::Warning => warn!("{message}"),
                        LogLevel::Error => error!("{message}"),
                    }
                }
            }
        }

        for (_, pb) in jobs {
            pb.finish_and_clear();
        }
        for (_, pb) in sync_jobs {
            pb.finish_and_clear();
        }
    });

    ProgressGuard {
        handle: Some(handle),
        stop,
    }
}
