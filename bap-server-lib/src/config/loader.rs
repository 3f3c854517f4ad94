use std::fs;
use std::path::Path;

use crate::config::root::Config;
use crate::config::validator::validate_config;
use crate::error::{BapError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let text = fs::read_to_string(p)
        .map_err(|e| BapError::Config(format!("failed to read config file: {e}")))?;
    let cfg: Config =
        toml::from_str(&text).map_err(|e| BapError::Config(format!("failed to parse config: {e}")))?;
    validate_config(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_valid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[auth]\nallow_none = true\n").unwrap();
        let cfg = load_from_path(file.path()).unwrap();
        assert!(cfg.auth.allow_none);
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml {{{{").unwrap();
        assert!(load_from_path(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(load_from_path("/nonexistent/path/bap.toml").is_err());
    }
}
