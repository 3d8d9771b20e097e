//! Filter helpers shared by the adapters

use regex::Regex;

use super::{Host, ProviderError};

/// Compile an optional regex filter, naming the filter key on failure
pub(crate) fn compile_pattern(
    key: &str,
    pattern: Option<&str>,
) -> Result<Option<Regex>, ProviderError> {
    match pattern {
        None => Ok(None),
        Some(p) if p.is_empty() => Ok(None),
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| ProviderError::InvalidFilter {
                filter: key.to_string(),
                message: e.to_string(),
            }),
    }
}

pub(crate) fn compile_patterns(key: &str, patterns: &[String]) -> Result<Vec<Regex>, ProviderError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| ProviderError::InvalidFilter {
                filter: key.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// True when `wanted` is empty or the host carries at least one wanted tag
pub(crate) fn has_any_tag(host: &Host, wanted: &[String]) -> bool {
    wanted.is_empty() || wanted.iter().any(|tag| host.tags.contains(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_pattern() {
        assert!(compile_pattern("name_pattern", None).unwrap().is_none());
        assert!(compile_pattern("name_pattern", Some("")).unwrap().is_none());
        assert!(compile_pattern("name_pattern", Some("^web-")).unwrap().is_some());

        let err = compile_pattern("name_pattern", Some("([")).unwrap_err();
        assert_eq!(err.kind(), "invalid_filter");
        assert!(err.to_string().contains("name_pattern"));
    }

    #[test]
    fn test_has_any_tag() {
        let host = Host::new("a", "").with_tags(["web", "prod"]);
        assert!(has_any_tag(&host, &[]));
        assert!(has_any_tag(&host, &["db".to_string(), "web".to_string()]));
        assert!(!has_any_tag(&host, &["db".to_string()]));
    }
}
