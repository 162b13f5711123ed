mod auth;
mod engine;
mod error;
mod launcher;
pub mod logger;
mod progress;
mod settings;
mod token_store;
mod version;

pub use auth::{Session, SessionManager};
pub use engine::{DownloadEngine, PACKAGE_NAME};
pub use error::{
    AuthError, DownloadError, ErrorInfo, IntegrityError, LaunchError, LauncherError, VersionError,
};
pub use launcher::{Launcher, LauncherState};
pub use progress::{DownloadProgress, LauncherEvent};
pub use settings::{default_data_dir, LauncherSettings};
pub use token_store::TokenStore;
pub use version::{is_newer, same_version, InstalledVersionRecord, VersionDescriptor, VersionResolver};
