use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

pub trait EnvConfig: Sized + DeserializeOwned {
    fn load_dotenv() {
        let _ = dotenvy::dotenv();
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn from_env() -> Result<Self> {
        Self::load_dotenv();

        let settings = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to read environment variables for config")?;

        let cfg = settings
            .try_deserialize::<Self>()
            .context("failed to deserialize environment into config")?;

        cfg.validate()?;
        Ok(cfg)
    }
}

/// Resolves a secret that may be supplied directly or via a `*_FILE` path.
/// The file wins when both are set; its contents are trimmed.
pub fn env_or_file(value: Option<&str>, file_path: Option<&str>) -> Result<Option<String>> {
    if let Some(path) = file_path.filter(|p| !p.trim().is_empty()) {
        let data = std::fs::read_to_string(path.trim())
            .with_context(|| format!("failed to read secret file {path}"))?;
        return Ok(Some(data.trim().to_string()));
    }

    Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::env_or_file;

    #[test]
    fn env_or_file_prefers_file_contents() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = dir.path().join("secret");
        std::fs::write(&path, "from-file\n").expect("write secret");

        let resolved = env_or_file(Some("from-env"), Some(path.to_str().unwrap()))
            .expect("resolve secret");

        assert_eq!(resolved.as_deref(), Some("from-file"));
    }

    #[test]
    fn env_or_file_falls_back_to_env_value() {
        let resolved = env_or_file(Some("from-env"), None).expect("resolve secret");
        assert_eq!(resolved.as_deref(), Some("from-env"));
    }

    #[test]
    fn env_or_file_returns_none_when_unset() {
        let resolved = env_or_file(None, None).expect("resolve secret");
        assert!(resolved.is_none());
    }

    #[test]
    fn env_or_file_errors_on_missing_file() {
        let result = env_or_file(None, Some("/nonexistent/secret/path"));
        assert!(result.is_err());
    }
}
