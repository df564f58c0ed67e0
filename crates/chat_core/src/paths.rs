use std::path::{Path, PathBuf};

const TOKEN_FILE_NAME: &str = ".chat_token";

/// Client state directory (`~/.chat_client`).
pub fn client_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".chat_client")
}

/// Path of the optional JSON config file.
pub fn config_json_path() -> PathBuf {
    client_dir().join("config.json")
}

/// Path of the persisted credential inside `app_data_dir`.
pub fn token_path(app_data_dir: &Path) -> PathBuf {
    app_data_dir.join(TOKEN_FILE_NAME)
}

/// Make sure `dir` exists.
pub fn ensure_dir(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}
