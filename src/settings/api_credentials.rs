use crate::utils::get_data_dir;
use color_eyre::{eyre, Report};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

/// Representation of one storage credential stored in your configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCredential {
    pub name: String,
    pub bearer_token: String,
    pub api_key: String,
    pub selected: bool,
}

impl ApiCredential {
    fn try_parse_file(path: &Path, selected: bool) -> eyre::Result<Self> {
        let file = fs::File::open(path)?;
        let reader = io::BufReader::new(file);
        let mut bearer_token = String::new();
        let mut api_key = String::new();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string());

        for line in reader.lines() {
            let line = line?;
            if let Some(stripped) = line.strip_prefix("bearer_token=") {
                bearer_token = stripped.trim().to_string()
            } else if let Some(stripped) = line.strip_prefix("api_key=") {
                api_key = stripped.trim().to_string()
            }
        }

        if bearer_token.is_empty() || api_key.is_empty() {
            return Err(Report::msg(format!(
                "Missing bearer_token/api_key in file: {:?}",
                path
            )));
        }

        Ok(Self {
            name,
            bearer_token,
            api_key,
            selected,
        })
    }
}

pub fn load_credentials(creds_file: Option<PathBuf>) -> eyre::Result<Vec<ApiCredential>> {
    if let Some(path) = creds_file {
        load_credentials_from_file(path.as_path())
    } else {
        let path = get_data_dir().join("creds");
        load_credentials_from_dir(path.as_path())
    }
}

fn load_credentials_from_file(path: &Path) -> eyre::Result<Vec<ApiCredential>> {
    Ok(vec![ApiCredential::try_parse_file(path, true)?])
}

fn load_credentials_from_dir(dir_path: &Path) -> eyre::Result<Vec<ApiCredential>> {
    let mut credentials = Vec::new();
    let mut selected = true;
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            credentials.push(ApiCredential::try_parse_file(&path, selected)?);
            selected = false; // Only the first entry is selected
        }
    }

    if credentials.is_empty() {
        Err(Report::msg("Missing credentials in your data creds folder"))
    } else {
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn setup_test_credentials(dir: &Path, file_name: &str) -> io::Result<()> {
        let file_path = dir.join(file_name);
        let mut file = fs::File::create(file_path)?;
        writeln!(file, "bearer_token=tok-ZXhhbXBsZQ")?;
        writeln!(file, "api_key=key-0123456789abcdef")?;
        Ok(())
    }

    #[test]
    fn test_parse_credential_file() {
        let dir = tempdir().unwrap();
        setup_test_credentials(dir.path(), "cred1").unwrap();

        let file_path = dir.path().join("cred1");
        let credentials = ApiCredential::try_parse_file(&file_path, true).unwrap();

        assert_eq!(credentials.name, "cred1");
        assert_eq!(credentials.bearer_token, "tok-ZXhhbXBsZQ");
        assert_eq!(credentials.api_key, "key-0123456789abcdef");
        assert!(credentials.selected);
    }

    #[test]
    fn test_parse_credential_file_missing_fields() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial");
        let mut file = fs::File::create(&file_path).unwrap();
        writeln!(file, "bearer_token=tok-only").unwrap();

        assert!(ApiCredential::try_parse_file(&file_path, true).is_err());
    }

    #[test]
    fn test_load_credentials_no_files() {
        let dir = tempdir().unwrap();
        let res = load_credentials_from_dir(dir.path());
        assert_eq!(
            res.err().unwrap().to_string(),
            Report::msg("Missing credentials in your data creds folder").to_string()
        );
    }

    #[test]
    fn test_load_credentials_with_files() {
        let dir = tempdir().unwrap();
        setup_test_credentials(dir.path(), "cred1").unwrap();

        let creds = load_credentials_from_dir(dir.path()).unwrap();

        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].name, "cred1");
        assert!(creds[0].selected);
    }

    #[test]
    fn test_load_credentials_with_files_only_one_set_as_selected() {
        let dir = tempdir().unwrap();
        setup_test_credentials(dir.path(), "cred1").unwrap();
        setup_test_credentials(dir.path(), "cred2").unwrap();
        setup_test_credentials(dir.path(), "cred3").unwrap();

        let creds = load_credentials_from_dir(dir.path()).unwrap();
        let selected_count = creds.iter().filter(|cred| cred.selected).count();
        assert_eq!(selected_count, 1);
        assert_eq!(creds.len(), 3);
    }
}
