//! Download source templating.
//!
//! Data sources are configured as URL patterns containing a placeholder
//! (for example `https://download.example.org/<REGION>-latest.osm.pbf`).
//! The placeholder is substituted with the deployment identifier.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceTemplate {
    pattern: String,
    placeholder: String,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unsupported source scheme: {0}")]
    UnsupportedScheme(String),
    #[error("empty source template")]
    Empty,
}

impl SourceTemplate {
    /// Parse a URL pattern. Only `http://` and `https://` sources are accepted.
    pub fn parse(pattern: &str, placeholder: &str) -> Result<Self, SourceError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(SourceError::Empty);
        }
        if !(pattern.starts_with("https://") || pattern.starts_with("http://")) {
            return Err(SourceError::UnsupportedScheme(pattern.to_string()));
        }
        Ok(Self {
            pattern: pattern.to_string(),
            placeholder: placeholder.to_string(),
        })
    }

    /// Substitute every occurrence of the placeholder with `deployment`.
    pub fn render(&self, deployment: &str) -> String {
        if self.placeholder.is_empty() {
            return self.pattern.clone();
        }
        self.pattern.replace(&self.placeholder, deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_placeholder() {
        let tpl = SourceTemplate::parse(
            "https://download.example.org/<REGION>/<REGION>-latest.osm.pbf",
            "<REGION>",
        )
        .unwrap();
        assert_eq!(
            tpl.render("europe/germany"),
            "https://download.example.org/europe/germany/europe/germany-latest.osm.pbf"
        );
    }

    #[test]
    fn pattern_without_placeholder_is_returned_verbatim() {
        let tpl = SourceTemplate::parse("https://tiles.example.org/osm.versatiles", "<BBOX>")
            .unwrap();
        assert_eq!(tpl.render("1,2,3,4"), "https://tiles.example.org/osm.versatiles");
    }

    #[test]
    fn rejects_non_http_sources() {
        assert!(matches!(
            SourceTemplate::parse("ftp://example.org/<COUNTRY>.tar.bz2", "<COUNTRY>"),
            Err(SourceError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            SourceTemplate::parse("   ", "<COUNTRY>"),
            Err(SourceError::Empty)
        ));
    }
}
