use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::auth::{Session, SessionManager};
use crate::engine::DownloadEngine;
use crate::error::{AuthError, DownloadError, ErrorInfo, LaunchError, LauncherError};
use crate::progress::{DownloadProgress, EventSender, LauncherEvent};
use crate::settings::LauncherSettings;
use crate::token_store::TokenStore;
use crate::version::{is_newer, same_version, InstalledVersionRecord, VersionDescriptor, VersionResolver};

/// What the launcher is doing right now. Exactly one variant is live at a
/// time; every mutation funnels through `Launcher`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", content = "data")]
pub enum LauncherState {
    Idle,
    CheckingVersion,
    Downloading(DownloadProgress),
    Installing,
    Ready,
    /// Reserved by the upstream lifecycle for re-install flows; updates
    /// currently travel the same `Downloading -> Installing` path as a
    /// fresh install.
    Updating,
    Playing,
    Failed(ErrorInfo),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn install_record_path(data_dir: &Path) -> PathBuf {
    data_dir.join("installed.json")
}

fn read_install_record(data_dir: &Path) -> Option<InstalledVersionRecord> {
    let path = install_record_path(data_dir);
    let text = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&text) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("ignoring unreadable install record {}: {e}", path.display());
            None
        }
    }
}

fn write_install_record(
    data_dir: &Path,
    record: &InstalledVersionRecord,
) -> Result<(), LauncherError> {
    let path = install_record_path(data_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::Persistence(e.to_string()))?;
    }
    let json =
        serde_json::to_string_pretty(record).map_err(|e| LauncherError::Persistence(e.to_string()))?;
    std::fs::write(&path, json).map_err(|e| LauncherError::Persistence(e.to_string()))
}

/// The orchestrator. Owns the single source of truth for launcher status,
/// sequences the session manager, version resolver and download engine,
/// and starts the game process.
///
/// Every action entry point serializes its state mutation through one
/// mutex; transitions not listed in the lifecycle are rejected no-ops that
/// return `Ok(false)`.
pub struct Launcher {
    http: reqwest::Client,
    session: SessionManager,
    resolver: VersionResolver,
    engine: DownloadEngine,
    settings: LauncherSettings,
    data_dir: PathBuf,
    state: Mutex<LauncherState>,
    latest: Mutex<Option<VersionDescriptor>>,
    installed: Mutex<Option<InstalledVersionRecord>>,
    cancel: Mutex<Option<Arc<AtomicBool>>>,
    game: Mutex<Option<Child>>,
    events: EventSender,
}

impl Launcher {
    /// Builds a launcher rooted at `data_dir`. Any previously persisted
    /// install record is loaded so version comparison survives restarts.
    /// The returned receiver is the observer side of the event channel.
    pub fn new(
        settings: LauncherSettings,
        data_dir: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<LauncherEvent>) {
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            log::warn!("failed to create data dir {}: {e}", data_dir.display());
        }

        let http = reqwest::Client::new();
        let session = SessionManager::new(
            http.clone(),
            settings.server_url.clone(),
            TokenStore::new(&data_dir),
        );
        let resolver = VersionResolver::new(http.clone(), settings.server_url.clone());
        // Staging lives under the same data root as the install dir so the
        // engine's final rename stays on one filesystem.
        let engine = DownloadEngine::new(data_dir.join("staging"));
        let installed = read_install_record(&data_dir);
        if let Some(record) = &installed {
            log::info!(
                "installed version {} at {}",
                record.version_id,
                record.install_path.display()
            );
        }

        let (events, rx) = EventSender::channel();
        let launcher = Launcher {
            http,
            session,
            resolver,
            engine,
            settings,
            data_dir,
            state: Mutex::new(LauncherState::Idle),
            latest: Mutex::new(None),
            installed: Mutex::new(installed),
            cancel: Mutex::new(None),
            game: Mutex::new(None),
            events,
        };
        (launcher, rx)
    }

    pub fn state(&self) -> LauncherState {
        lock(&self.state).clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.current_session()
    }

    pub fn latest_version(&self) -> Option<VersionDescriptor> {
        lock(&self.latest).clone()
    }

    pub fn installed_version(&self) -> Option<InstalledVersionRecord> {
        lock(&self.installed).clone()
    }

    pub fn settings(&self) -> &LauncherSettings {
        &self.settings
    }

    fn set_state(&self, next: LauncherState) {
        log::info!("state -> {next:?}");
        *lock(&self.state) = next.clone();
        self.events.emit(LauncherEvent::StateChanged(next));
    }

    /// Converts a component failure into `Failed(ErrorInfo)`. A rejected
    /// token additionally clears the local session: the user has to log in
    /// again.
    fn fail(&self, err: &LauncherError) {
        if matches!(err, LauncherError::Auth(AuthError::Unauthenticated)) {
            self.session.invalidate_local();
        }
        let info = ErrorInfo::from(err);
        self.events.emit(LauncherEvent::Error(info.clone()));
        self.set_state(LauncherState::Failed(info));
    }

    /// Authenticate, then run the version check automatically. Login's own
    /// failure short-circuits before the version check begins. Returns
    /// whether an update is available. A failed launcher must be reset via
    /// `retry` before logging in again.
    pub async fn login(&self, username: &str, password: &str) -> Result<bool, LauncherError> {
        // Claim the transition under the lock so a concurrent action cannot
        // pass the same guard.
        {
            let mut st = lock(&self.state);
            if !matches!(*st, LauncherState::Idle) {
                log::warn!("login ignored in state {:?}", *st);
                return Ok(false);
            }
            *st = LauncherState::CheckingVersion;
        }
        self.events.emit(LauncherEvent::StateChanged(LauncherState::CheckingVersion));

        match self.session.authenticate(username, password).await {
            Ok(_) => self.run_version_check().await,
            Err(e) => {
                let e = LauncherError::from(e);
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// From any state: cancel in-flight work, end the session (server-side
    /// invalidation is best-effort) and return to `Idle`.
    pub async fn logout(&self) {
        if let Some(flag) = lock(&self.cancel).as_ref() {
            flag.store(true, Ordering::Relaxed);
        }
        self.session.end_session().await;
        self.set_state(LauncherState::Idle);
        log::info!("logged out");
    }

    /// `Idle -> CheckingVersion -> Idle | Ready`. Returns whether an update
    /// is available.
    pub async fn check_version(&self) -> Result<bool, LauncherError> {
        {
            let mut st = lock(&self.state);
            if !matches!(*st, LauncherState::Idle) {
                log::warn!("version check ignored in state {:?}", *st);
                return Ok(false);
            }
            *st = LauncherState::CheckingVersion;
        }
        self.events.emit(LauncherEvent::StateChanged(LauncherState::CheckingVersion));
        self.run_version_check().await
    }

    /// Resolver call half of `check_version`; assumes the state is already
    /// `CheckingVersion` (entered either directly or via `login`).
    async fn run_version_check(&self) -> Result<bool, LauncherError> {
        let descriptor = match self.resolver.fetch_latest().await {
            Ok(d) => d,
            Err(e) => {
                let e = LauncherError::from(e);
                self.fail(&e);
                return Err(e);
            }
        };

        *lock(&self.latest) = Some(descriptor.clone());

        let installed = self.installed_version();
        match installed {
            Some(record) if same_version(&record.version_id, &descriptor.version_id) => {
                log::info!("up to date at {}", record.version_id);
                self.set_state(LauncherState::Ready);
                Ok(false)
            }
            Some(record) => {
                if is_newer(&descriptor.version_id, &record.version_id) {
                    log::info!(
                        "update available: {} -> {}",
                        record.version_id,
                        descriptor.version_id
                    );
                } else {
                    log::warn!(
                        "installed {} does not match advertised {}",
                        record.version_id,
                        descriptor.version_id
                    );
                }
                self.set_state(LauncherState::Idle);
                Ok(true)
            }
            None => {
                log::info!("no installed version; {} available", descriptor.version_id);
                self.set_state(LauncherState::Idle);
                Ok(true)
            }
        }
    }

    /// `Idle -> Downloading -> Installing -> Ready`. Only one download may
    /// be in flight; a second request while `Downloading` is rejected, not
    /// queued. Cancellation returns to `Idle`, never `Failed`.
    pub async fn download_game(&self) -> Result<bool, LauncherError> {
        let Some(descriptor) = self.latest_version() else {
            log::warn!("download requested before any version check");
            return Ok(false);
        };

        // Compare-and-set under the state lock: this is what rejects a
        // concurrent second download. The cancel slot is claimed in the same
        // critical section; it stays occupied until the engine future has
        // fully unwound, so a logout+relogin cannot start a second transfer
        // whose handle the first one would then clobber.
        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut st = lock(&self.state);
            let mut slot = lock(&self.cancel);
            if slot.is_some() {
                log::warn!("download ignored; a previous transfer is still winding down");
                return Ok(false);
            }
            if !matches!(*st, LauncherState::Idle) {
                log::warn!("download ignored in state {:?}", *st);
                return Ok(false);
            }
            *st = LauncherState::Downloading(DownloadProgress::starting(descriptor.size_bytes));
            *slot = Some(cancel.clone());
        }
        self.events.emit(LauncherEvent::StateChanged(LauncherState::Downloading(
            DownloadProgress::starting(descriptor.size_bytes),
        )));
        log::info!(
            "downloading {} from {}",
            descriptor.version_id,
            descriptor.download_locator
        );

        let request = match self
            .session
            .attach_auth(self.http.get(&descriptor.download_locator))
        {
            Ok(r) => r,
            Err(e) => {
                *lock(&self.cancel) = None;
                let e = LauncherError::from(e);
                self.fail(&e);
                return Err(e);
            }
        };

        let result = self
            .engine
            .fetch_and_install(
                &descriptor,
                request,
                &self.settings.install_dir,
                cancel,
                |progress| {
                    // Ticks update the state payload under the state lock so
                    // observers never see a torn snapshot.
                    {
                        let mut st = lock(&self.state);
                        if matches!(*st, LauncherState::Downloading(_)) {
                            *st = LauncherState::Downloading(progress.clone());
                        }
                    }
                    self.events.emit(LauncherEvent::Progress(progress));
                },
            )
            .await;

        match result {
            Ok(record) => {
                *lock(&self.cancel) = None;
                self.set_state(LauncherState::Installing);
                if let Err(e) = write_install_record(&self.data_dir, &record) {
                    self.fail(&e);
                    return Err(e);
                }
                *lock(&self.installed) = Some(record);
                self.set_state(LauncherState::Ready);
                Ok(true)
            }
            Err(LauncherError::Download(DownloadError::Cancelled)) => {
                log::info!("download cancelled");
                // State reset and slot release happen in one critical
                // section; releasing the slot first would let a new download
                // start and have its state clobbered here.
                let went_idle = {
                    let mut st = lock(&self.state);
                    let mut slot = lock(&self.cancel);
                    *slot = None;
                    if matches!(*st, LauncherState::Downloading(_)) {
                        *st = LauncherState::Idle;
                        true
                    } else {
                        false
                    }
                };
                if went_idle {
                    self.events.emit(LauncherEvent::StateChanged(LauncherState::Idle));
                }
                Ok(false)
            }
            Err(e) => {
                *lock(&self.cancel) = None;
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Flip the cancellation flag of the in-flight transfer. The download
    /// path itself performs the `Downloading -> Idle` transition once the
    /// engine unwinds.
    pub fn cancel_download(&self) -> bool {
        match lock(&self.cancel).as_ref() {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                log::info!("cancellation requested");
                true
            }
            None => {
                log::warn!("cancel requested with no download in flight");
                false
            }
        }
    }

    /// `Ready -> Playing`: spawn the game binary from the install path with
    /// the session token as a startup argument. The game authenticates to
    /// the backend on its own at runtime.
    pub fn launch_game(&self) -> Result<bool, LauncherError> {
        // Claim `Playing` before spawning; a double invocation must not
        // start two game processes.
        {
            let mut st = lock(&self.state);
            if !matches!(*st, LauncherState::Ready) {
                log::warn!("launch ignored in state {:?}", *st);
                return Ok(false);
            }
            *st = LauncherState::Playing;
        }

        let Some(token) = self.session.current_token() else {
            let e = LauncherError::from(AuthError::Unauthenticated);
            self.fail(&e);
            return Err(e);
        };

        let Some(record) = self.installed_version() else {
            log::warn!("launch requested with no installed version");
            *lock(&self.state) = LauncherState::Ready;
            return Ok(false);
        };

        let exe = record.install_path.join(&self.settings.game_binary);
        match std::process::Command::new(&exe)
            .current_dir(&record.install_path)
            .arg("--token")
            .arg(&token)
            .spawn()
        {
            Ok(child) => {
                log::info!("game started (pid {})", child.id());
                *lock(&self.game) = Some(child);
                self.events.emit(LauncherEvent::StateChanged(LauncherState::Playing));
                Ok(true)
            }
            Err(e) => {
                let e = LauncherError::from(LaunchError::ProcessSpawnFailed(e));
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Observe the game process. Returns whether it is still running; an
    /// observed exit while `Playing` transitions back to `Ready`.
    pub fn poll_game(&self) -> bool {
        if !matches!(self.state(), LauncherState::Playing) {
            return false;
        }

        let exited = {
            let mut guard = lock(&self.game);
            match guard.as_mut() {
                Some(child) => match child.try_wait() {
                    Ok(None) => false,
                    Ok(Some(status)) => {
                        log::info!("game exited with {status}");
                        *guard = None;
                        true
                    }
                    Err(e) => {
                        log::warn!("failed to poll game process: {e}");
                        *guard = None;
                        true
                    }
                },
                None => true,
            }
        };

        if exited {
            self.set_state(LauncherState::Ready);
            return false;
        }
        true
    }

    /// Kill a running game process. `Playing -> Ready`.
    pub fn stop_game(&self) -> bool {
        let stopped = {
            let mut guard = lock(&self.game);
            match guard.take() {
                Some(mut child) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    true
                }
                None => false,
            }
        };

        if stopped && matches!(self.state(), LauncherState::Playing) {
            self.set_state(LauncherState::Ready);
        }
        stopped
    }

    /// `Failed -> Idle`. The error context is discarded; nothing retries
    /// automatically.
    pub fn retry(&self) -> bool {
        {
            let mut st = lock(&self.state);
            if !matches!(*st, LauncherState::Failed(_)) {
                log::warn!("retry ignored in state {:?}", *st);
                return false;
            }
            *st = LauncherState::Idle;
        }
        self.events.emit(LauncherEvent::StateChanged(LauncherState::Idle));
        true
    }
}
