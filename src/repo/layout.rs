//! Repository identity and layout metadata: `profiles/repo_name` and
//! `metadata/layout.conf`.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct RepoLayout {
    pub repo_id: String,
    /// Repos this one's `layout.conf` declares as masters, in declared
    /// order — used to resolve eclasses and inherited profile data.
    pub masters: Vec<String>,
}

impl RepoLayout {
    /// Resolves repository identity in the order PMS specifies: a
    /// `repo-name` key in `metadata/layout.conf` takes precedence over
    /// `profiles/repo_name`; a repository lacking both is still usable,
    /// just under a synthetic label derived from its path rather than a
    /// hard error.
    pub fn read(root: &Path) -> Result<Self> {
        let layout_path = root.join("metadata/layout.conf");
        let (layout_repo_name, masters) = match fs::read_to_string(&layout_path) {
            Ok(contents) => (parse_key(&contents, "repo-name"), parse_list(&contents, "masters")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (None, Vec::new()),
            Err(source) => {
                return Err(Error::Io {
                    path: layout_path,
                    source,
                })
            }
        };

        let repo_name_path = root.join("profiles/repo_name");
        let file_repo_name = match fs::read_to_string(&repo_name_path) {
            Ok(s) => {
                let s = s.trim().to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(s)
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(Error::Io {
                    path: repo_name_path,
                    source,
                })
            }
        };

        let repo_id = layout_repo_name
            .or(file_repo_name)
            .unwrap_or_else(|| format!("<unlabeled repo: {}>", root.display()));

        Ok(Self { repo_id, masters })
    }
}

fn parse_key(contents: &str, key: &str) -> Option<String> {
    for line in contents.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(key) {
            let rest = rest.trim_start();
            if let Some(value) = rest.strip_prefix('=') {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn parse_list(contents: &str, key: &str) -> Vec<String> {
    parse_key(contents, key)
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tempdir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("portage-resolver-layout-{name}-{}", std::process::id()));
        fs::create_dir_all(dir.join("profiles")).unwrap();
        fs::create_dir_all(dir.join("metadata")).unwrap();
        dir
    }

    #[test]
    fn reads_repo_name_and_masters() {
        let dir = tempdir("basic");
        let mut f = fs::File::create(dir.join("profiles/repo_name")).unwrap();
        f.write_all(b"gentoo\n").unwrap();
        let mut layout = fs::File::create(dir.join("metadata/layout.conf")).unwrap();
        layout.write_all(b"masters = core base\n").unwrap();

        let info = RepoLayout::read(&dir).unwrap();
        assert_eq!(info.repo_id, "gentoo");
        assert_eq!(info.masters, vec!["core", "base"]);
    }

    #[test]
    fn missing_repo_name_falls_back_to_synthetic_label() {
        let dir = tempdir("missing");
        let info = RepoLayout::read(&dir).unwrap();
        assert!(info.repo_id.starts_with("<unlabeled repo:"));
    }

    #[test]
    fn layout_conf_repo_name_takes_precedence_over_profiles_repo_name() {
        let dir = tempdir("precedence");
        let mut f = fs::File::create(dir.join("profiles/repo_name")).unwrap();
        f.write_all(b"from-repo-name-file\n").unwrap();
        let mut layout = fs::File::create(dir.join("metadata/layout.conf")).unwrap();
        layout.write_all(b"repo-name = from-layout-conf\n").unwrap();

        let info = RepoLayout::read(&dir).unwrap();
        assert_eq!(info.repo_id, "from-layout-conf");
    }

    #[test]
    fn falls_back_to_profiles_repo_name_without_layout_repo_name_key() {
        let dir = tempdir("fallback");
        let mut f = fs::File::create(dir.join("profiles/repo_name")).unwrap();
        f.write_all(b"gentoo\n").unwrap();
        let mut layout = fs::File::create(dir.join("metadata/layout.conf")).unwrap();
        layout.write_all(b"masters = core\n").unwrap();

        let info = RepoLayout::read(&dir).unwrap();
        assert_eq!(info.repo_id, "gentoo");
        assert_eq!(info.masters, vec!["core"]);
    }
}
