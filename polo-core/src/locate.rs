//! Configuration file search.
//!
//! # Search order
//!
//! ```text
//! 1. explicit path (--config)   no fall-through when it is missing
//! 2. ./polo.yaml                current working directory
//! 3. ~/.polo.yaml               user home
//! 4. /etc/polo/polo.yaml        system-wide
//! 5. $POLO_CONFIG               environment fallback
//! ```
//!
//! `resolve(&SearchRoots)` touches the filesystem only for `exists()` checks;
//! `SearchRoots::from_env(explicit)` reads the cwd, home and `$POLO_CONFIG`.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "polo.yaml";
pub const HOME_CONFIG_FILE_NAME: &str = ".polo.yaml";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/polo/polo.yaml";
pub const CONFIG_ENV_VAR: &str = "POLO_CONFIG";

/// The locations consulted by [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRoots {
    pub explicit: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub system: Option<PathBuf>,
    pub env: Option<PathBuf>,
}

impl SearchRoots {
    /// Roots derived from the running process.
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            cwd: std::env::current_dir().ok(),
            home: dirs::home_dir(),
            system: Some(PathBuf::from(SYSTEM_CONFIG_PATH)),
            env: std::env::var_os(CONFIG_ENV_VAR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Candidate paths in priority order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        if let Some(explicit) = &self.explicit {
            return vec![explicit.clone()];
        }
        let mut out = Vec::with_capacity(4);
        if let Some(cwd) = &self.cwd {
            out.push(cwd.join(CONFIG_FILE_NAME));
        }
        if let Some(home) = &self.home {
            out.push(home.join(HOME_CONFIG_FILE_NAME));
        }
        if let Some(system) = &self.system {
            out.push(system.clone());
        }
        if let Some(env) = &self.env {
            out.push(env.clone());
        }
        out
    }
}

/// First existing candidate, or [`ConfigError::NotFound`] listing every path tried.
pub fn resolve(roots: &SearchRoots) -> Result<PathBuf, ConfigError> {
    let candidates = roots.candidates();
    match candidates.iter().find(|p| is_file(p)) {
        Some(found) => Ok(found.clone()),
        None => Err(ConfigError::NotFound {
            searched: candidates,
        }),
    }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Layout {
        _tmp: TempDir,
        roots: SearchRoots,
    }

    fn layout() -> Layout {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        for dir in ["cwd", "home", "etc", "env"] {
            fs::create_dir_all(base.join(dir)).unwrap();
        }
        let roots = SearchRoots {
            explicit: None,
            cwd: Some(base.join("cwd")),
            home: Some(base.join("home")),
            system: Some(base.join("etc").join("polo.yaml")),
            env: Some(base.join("env").join("custom.yaml")),
        };
        Layout { _tmp: tmp, roots }
    }

    fn touch(path: &Path) {
        fs::write(path, "sources: []\n").unwrap();
    }

    #[test]
    fn cwd_wins_over_home_system_and_env() {
        let l = layout();
        let cwd = l.roots.cwd.clone().unwrap().join(CONFIG_FILE_NAME);
        touch(&cwd);
        touch(&l.roots.home.clone().unwrap().join(HOME_CONFIG_FILE_NAME));
        touch(l.roots.system.as_ref().unwrap());
        touch(l.roots.env.as_ref().unwrap());
        assert_eq!(resolve(&l.roots).unwrap(), cwd);
    }

    #[test]
    fn falls_through_to_home_then_system_then_env() {
        let l = layout();
        let env = l.roots.env.clone().unwrap();
        touch(&env);
        assert_eq!(resolve(&l.roots).unwrap(), env);

        let system = l.roots.system.clone().unwrap();
        touch(&system);
        assert_eq!(resolve(&l.roots).unwrap(), system);

        let home = l.roots.home.clone().unwrap().join(HOME_CONFIG_FILE_NAME);
        touch(&home);
        assert_eq!(resolve(&l.roots).unwrap(), home);
    }

    #[test]
    fn explicit_path_does_not_fall_through() {
        let mut l = layout();
        touch(&l.roots.cwd.clone().unwrap().join(CONFIG_FILE_NAME));
        let missing = l.roots.home.clone().unwrap().join("missing.yaml");
        l.roots.explicit = Some(missing.clone());

        let err = resolve(&l.roots).unwrap_err();
        match err {
            ConfigError::NotFound { searched } => assert_eq!(searched, vec![missing]),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn nothing_found_lists_every_candidate() {
        let l = layout();
        let err = resolve(&l.roots).unwrap_err();
        let ConfigError::NotFound { searched } = &err else {
            panic!("expected NotFound, got {err:?}");
        };
        assert_eq!(searched.len(), 4);
        assert!(err.to_string().contains("polo.yaml"));
    }

    #[test]
    fn directory_named_like_config_is_ignored() {
        let l = layout();
        fs::create_dir_all(l.roots.cwd.clone().unwrap().join(CONFIG_FILE_NAME)).unwrap();
        let system = l.roots.system.clone().unwrap();
        touch(&system);
        assert_eq!(resolve(&l.roots).unwrap(), system);
    }
}
