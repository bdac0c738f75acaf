use crate::error::{AppError, AppResult};

const DEFAULT_PROFILE: &str = "default";

pub fn resolve_profile(requested: &str) -> AppResult<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_PROFILE.to_string());
    }

    let valid = trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && !trimmed.starts_with('.');
    if !valid {
        return Err(AppError::InvalidInput(format!(
            "invalid profile name `{trimmed}`; use letters, digits, `-`, `_` or `.`"
        )));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_profile_falls_back_to_default() {
        assert_eq!(resolve_profile("  ").expect("profile"), "default");
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(resolve_profile("../secrets").is_err());
        assert!(resolve_profile("a/b").is_err());
        assert!(resolve_profile(".hidden").is_err());
    }

    #[test]
    fn keeps_simple_names() {
        assert_eq!(resolve_profile("work-365").expect("profile"), "work-365");
    }
}
