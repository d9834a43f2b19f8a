//! Pre-complete hook discovery.
//!
//! Projects may drop a script at `.ada/hooks/pre-complete.{sh,ps1,bat}`.
//! The pipeline runs it with a fixed set of environment variables before a
//! feature is marked complete; a nonzero exit fails verification.

use std::path::{Path, PathBuf};

/// Environment variables passed to the hook.
pub const ENV_PROJECT_ROOT: &str = "ADA_PROJECT_ROOT";
pub const ENV_FEATURE_ID: &str = "ADA_FEATURE_ID";
pub const ENV_FEATURE_NAME: &str = "ADA_FEATURE_NAME";
pub const ENV_FEATURE_CATEGORY: &str = "ADA_FEATURE_CATEGORY";

/// Locate the hook script in platform preference order.
pub fn find_hook_script(hooks_dir: &Path) -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(windows) {
        &["pre-complete.ps1", "pre-complete.bat", "pre-complete.sh"]
    } else {
        &["pre-complete.sh", "pre-complete.ps1", "pre-complete.bat"]
    };

    candidates
        .iter()
        .map(|name| hooks_dir.join(name))
        .find(|p| p.is_file())
}

/// Interpreter + args for a hook script, by extension.
pub fn hook_invocation(script: &Path) -> (String, Vec<String>) {
    let script_str = script.to_string_lossy().to_string();
    match script.extension().and_then(|e| e.to_str()) {
        Some("ps1") => (
            "powershell".to_string(),
            vec![
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-File".to_string(),
                script_str,
            ],
        ),
        Some("bat") => ("cmd".to_string(), vec!["/C".to_string(), script_str]),
        _ => ("sh".to_string(), vec![script_str]),
    }
}
