//! Child environment construction (spec §4.1 "Environment").

use std::collections::HashMap;
use std::ffi::CString;

/// Merge the parent's environ with per-command overrides. Overrides replace
/// any same-key parent entry; everything else from the parent passes through
/// untouched.
pub fn merged_environ(overrides: &[(String, String)]) -> Vec<CString> {
    let mut vars: HashMap<String, String> = std::env::vars().collect();
    for (k, v) in overrides {
        vars.insert(k.clone(), v.clone());
    }
    vars.into_iter()
        .filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_replaces_parent_entry() {
        std::env::set_var("VIGIL_EXEC_TEST_VAR", "parent");
        let merged = merged_environ(&[("VIGIL_EXEC_TEST_VAR".to_string(), "child".to_string())]);
        let found = merged.iter().any(|c| c.to_str() == Ok("VIGIL_EXEC_TEST_VAR=child"));
        assert!(found);
        std::env::remove_var("VIGIL_EXEC_TEST_VAR");
    }
}
