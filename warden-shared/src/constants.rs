//! Constants shared by the orchestrator library and the CLI.
//!
//! Anything that ends up on disk, in the environment, or in a process exit
//! status lives here so both sides agree on it.

/// Process exit codes.
///
/// Calling automation distinguishes "never started" (2, 3, 5) from
/// "started and failed partway" (4).
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const INTERNAL: i32 = 1;
    pub const CONFIGURATION: i32 = 2;
    pub const PREFLIGHT: i32 = 3;
    pub const PHASE_FAILED: i32 = 4;
    pub const PRIVILEGE: i32 = 5;
    pub const STATE_CONFLICT: i32 = 6;
    /// 128 + SIGINT, what shells report for Ctrl-C.
    pub const INTERRUPTED: i32 = 130;
}

/// Environment variables.
pub mod envs {
    /// Overrides the data home directory.
    pub const WARDEN_HOME: &str = "WARDEN_HOME";

    /// Set on the re-executed process so a second hand-off is detected.
    pub const WARDEN_REEXEC: &str = "WARDEN_REEXEC";

    /// Prefix for configuration fields (`WARDEN_ADMIN_EMAIL`, ...).
    pub const FIELD_PREFIX: &str = "WARDEN_";
}

/// Directory and file names under the data home.
pub mod layout {
    /// Default data home directory name (under the running identity's home).
    pub const WARDEN_DIR: &str = ".warden";

    pub const STATE_DIR: &str = "state";

    pub const ARCHIVE_DIR: &str = "archive";

    pub const LOGS_DIR: &str = "logs";

    pub const LOCK_FILE: &str = ".lock";

    pub const LOG_FILE: &str = "warden.log";

    pub const CREDENTIALS_FILE: &str = "credentials.json";
}

/// Defaults for configuration fields.
pub mod defaults {
    pub const INSTALL_ID: &str = "default";

    pub const SERVICE_USER: &str = "warden";

    pub const ENVIRONMENT: &str = "production";

    pub const INSTALL_DIR: &str = "/opt/warden";

    pub const REPOSITORY_URL: &str = "https://github.com/MISP/misp-docker.git";

    pub const REPOSITORY_REF: &str = "master";
}

/// Run State schema version written by this build.
pub const STATE_SCHEMA_VERSION: u32 = 1;
