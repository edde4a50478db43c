use std::path::PathBuf;

const APP_DIR: &str = "unisaver";

pub trait AppPaths: Send + Sync {
    fn data_dir(&self) -> PathBuf;
    fn config_file(&self) -> PathBuf;
    fn bin_dir(&self) -> PathBuf;
}

/// Paths under the user's data directory, overridable with
/// `UNISAVER_DATA_DIR` for containers.
pub struct ServerPaths;

impl AppPaths for ServerPaths {
    fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("UNISAVER_DATA_DIR") {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
    }

    fn config_file(&self) -> PathBuf {
        if let Ok(path) = std::env::var("UNISAVER_CONFIG") {
            return PathBuf::from(path);
        }
        self.data_dir().join("settings.json")
    }

    fn bin_dir(&self) -> PathBuf {
        self.data_dir().join("bin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_dir_lives_under_data_dir() {
        let paths = ServerPaths;
        assert!(paths.bin_dir().starts_with(paths.data_dir()));
        assert!(paths.bin_dir().ends_with("bin"));
    }
}
