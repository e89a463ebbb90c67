use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::copy::ClipboardFailurePolicy;

/// Flags that can be saved as defaults in an rc file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub watch: bool,
    pub perf: bool,
    pub theme: Option<String>,
    pub syntax_dir: Option<PathBuf>,
    pub clipboard_policy: Option<ClipboardFailurePolicy>,
    pub render_debug_log: Option<PathBuf>,
}

impl ConfigFlags {
    /// Merge two flag sets; `other` wins for valued options.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            watch: self.watch || other.watch,
            perf: self.perf || other.perf,
            theme: other.theme.clone().or_else(|| self.theme.clone()),
            syntax_dir: other
                .syntax_dir
                .clone()
                .or_else(|| self.syntax_dir.clone()),
            clipboard_policy: other.clipboard_policy.or(self.clipboard_policy),
            render_debug_log: other
                .render_debug_log
                .clone()
                .or_else(|| self.render_debug_log.clone()),
        }
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("codeblock").join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("codeblock")
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("codeblock").join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("codeblock")
                .join("config");
        }
    }

    PathBuf::from(".codeblockrc")
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".codeblockrc")
}

/// Load flags from an rc file. A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

/// Write `flags` to an rc file, creating parent directories.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = vec!["# codeblock defaults (saved with --save)".to_string()];
    if flags.watch {
        lines.push("--watch".to_string());
    }
    if flags.perf {
        lines.push("--perf".to_string());
    }
    if let Some(theme) = &flags.theme {
        lines.push(format!("--theme {theme}"));
    }
    if let Some(dir) = &flags.syntax_dir {
        lines.push(format!("--syntax-dir {}", dir.display()));
    }
    if let Some(policy) = flags.clipboard_policy {
        lines.push(format!("--clipboard-policy {}", policy_name(policy)));
    }
    if let Some(path) = &flags.render_debug_log {
        lines.push(format!("--render-debug-log {}", path.display()));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

/// Remove an rc file if it exists.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Pick the saveable flags out of raw command-line tokens.
///
/// Unknown tokens (file names, `--lang`, ...) are ignored.
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        let next = tokens.get(i + 1);
        match token {
            "--watch" | "-w" => flags.watch = true,
            "--perf" => flags.perf = true,
            "--theme" => {
                if let Some(next) = next {
                    flags.theme = Some(next.clone());
                    i += 1;
                }
            }
            "--syntax-dir" => {
                if let Some(next) = next {
                    flags.syntax_dir = Some(PathBuf::from(next));
                    i += 1;
                }
            }
            "--clipboard-policy" => {
                if let Some(next) = next {
                    flags.clipboard_policy = parse_policy(next);
                    i += 1;
                }
            }
            "--render-debug-log" => {
                if let Some(next) = next {
                    flags.render_debug_log = Some(PathBuf::from(next));
                    i += 1;
                }
            }
            _ => {
                if let Some(value) = token.strip_prefix("--theme=") {
                    flags.theme = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("--syntax-dir=") {
                    flags.syntax_dir = Some(PathBuf::from(value));
                } else if let Some(value) = token.strip_prefix("--clipboard-policy=") {
                    flags.clipboard_policy = parse_policy(value);
                } else if let Some(value) = token.strip_prefix("--render-debug-log=") {
                    flags.render_debug_log = Some(PathBuf::from(value));
                }
            }
        }
        i += 1;
    }
    flags
}

fn parse_policy(s: &str) -> Option<ClipboardFailurePolicy> {
    match s {
        "optimistic" => Some(ClipboardFailurePolicy::Optimistic),
        "revert-to-idle" => Some(ClipboardFailurePolicy::RevertToIdle),
        _ => None,
    }
}

const fn policy_name(policy: ClipboardFailurePolicy) -> &'static str {
    match policy {
        ClipboardFailurePolicy::Optimistic => "optimistic",
        ClipboardFailurePolicy::RevertToIdle => "revert-to-idle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_flag_tokens_extracts_known_flags() {
        let args = vec![
            "codeblock".to_string(),
            "--watch".to_string(),
            "--theme".to_string(),
            "solarized-dark".to_string(),
            "--clipboard-policy=revert-to-idle".to_string(),
            "--render-debug-log=render.log".to_string(),
            "--lang".to_string(),
            "python".to_string(),
            "sample.py".to_string(),
        ];
        let flags = parse_flag_tokens(&args);
        assert!(flags.watch);
        assert!(!flags.perf);
        assert_eq!(flags.theme.as_deref(), Some("solarized-dark"));
        assert_eq!(
            flags.clipboard_policy,
            Some(ClipboardFailurePolicy::RevertToIdle)
        );
        assert_eq!(flags.render_debug_log, Some(PathBuf::from("render.log")));
        assert_eq!(flags.syntax_dir, None);
    }

    #[test]
    fn test_unknown_policy_is_ignored() {
        let args = vec!["--clipboard-policy".to_string(), "sometimes".to_string()];
        assert_eq!(parse_flag_tokens(&args).clipboard_policy, None);
    }

    #[test]
    fn test_config_union_merges_cli_over_file_for_options() {
        let file = ConfigFlags {
            watch: true,
            theme: Some("github-light".to_string()),
            clipboard_policy: Some(ClipboardFailurePolicy::RevertToIdle),
            ..ConfigFlags::default()
        };
        let cli = ConfigFlags {
            perf: true,
            theme: Some("github-dark".to_string()),
            ..ConfigFlags::default()
        };
        let merged = file.union(&cli);
        assert!(merged.watch);
        assert!(merged.perf);
        assert_eq!(merged.theme.as_deref(), Some("github-dark"));
        assert_eq!(
            merged.clipboard_policy,
            Some(ClipboardFailurePolicy::RevertToIdle)
        );
    }

    #[test]
    fn test_save_load_and_clear_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(".codeblockrc");
        let flags = ConfigFlags {
            watch: true,
            perf: true,
            theme: Some("github-dark".to_string()),
            syntax_dir: Some(PathBuf::from("syntaxes")),
            clipboard_policy: Some(ClipboardFailurePolicy::Optimistic),
            render_debug_log: Some(PathBuf::from("render.log")),
        };

        save_config_flags(&path, &flags).unwrap();
        let loaded = load_config_flags(&path).unwrap();
        assert_eq!(loaded, flags);

        clear_config_flags(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempdir().unwrap();
        let loaded = load_config_flags(&dir.path().join("absent")).unwrap();
        assert_eq!(loaded, ConfigFlags::default());
    }
}
