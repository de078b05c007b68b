//! Bootstrap helpers.
//!
//! App-level env vars live in `~/.lucy-chat/.env` (standard dotenvy format).
//! Call [`load_lucy_env`] **after** `dotenvy::dotenv()` so the project-local
//! `./.env` takes priority; dotenvy never overwrites vars that are already
//! set, so the effective priority is:
//!
//!   explicit env vars > `./.env` > `~/.lucy-chat/.env`

use std::path::PathBuf;

/// Path to the app env file: `~/.lucy-chat/.env`.
pub fn lucy_env_path() -> PathBuf {
    lucy_home().join(".env")
}

/// App data directory: `~/.lucy-chat`.
pub fn lucy_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lucy-chat")
}

/// Load env vars from `~/.lucy-chat/.env`, if present.
pub fn load_lucy_env() {
    let path = lucy_env_path();
    if path.exists() {
        let _ = dotenvy::from_path(&path);
    }
}
