use crate::config::PipelineConfig;
use crate::models::IncidentInput;
use thiserror::Error;
use tracing::warn;

const MAX_SERVICE_NAME_CHARS: usize = 255;
const MAX_ENVIRONMENT_CHARS: usize = 64;

/// Rejected triage input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("alert_text cannot be empty")]
    EmptyAlert,

    #[error("{field} must be at most {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
}

/// Turns a raw alert plus optional hints into an [`IncidentInput`]
#[derive(Debug, Clone)]
pub struct AlertNormalizer {
    max_alert_chars: usize,
    default_environment: String,
}

impl AlertNormalizer {
    pub fn new(max_alert_chars: usize, default_environment: impl Into<String>) -> Self {
        Self {
            max_alert_chars,
            default_environment: default_environment.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_alert_chars, config.default_environment.clone())
    }

    pub fn normalize(
        &self,
        raw_text: &str,
        service_hint: Option<&str>,
        environment: Option<&str>,
    ) -> Result<IncidentInput, ValidationError> {
        let cleaned = clean_text(raw_text);
        let trimmed = cleaned.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyAlert);
        }

        let char_count = trimmed.chars().count();
        let alert_text = if char_count > self.max_alert_chars {
            warn!(
                original_chars = char_count,
                max_chars = self.max_alert_chars,
                "Alert text truncated"
            );
            trimmed
                .chars()
                .take(self.max_alert_chars)
                .collect::<String>()
                .trim_end()
                .to_string()
        } else {
            trimmed.to_string()
        };

        let service_name = single_line(service_hint, "service_name", MAX_SERVICE_NAME_CHARS)?;
        let environment = single_line(environment, "environment", MAX_ENVIRONMENT_CHARS)?
            .unwrap_or_else(|| self.default_environment.clone());

        Ok(IncidentInput::new(alert_text, service_name, environment))
    }
}

/// Unify line endings and drop control characters other than `\n` and `\t`
fn clean_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

fn single_line(
    value: Option<&str>,
    field: &'static str,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let cleaned: String = value.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(None);
    }
    if cleaned.chars().count() > max {
        return Err(ValidationError::FieldTooLong { field, max });
    }

    Ok(Some(cleaned.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> AlertNormalizer {
        AlertNormalizer::new(20, "production")
    }

    #[test]
    fn test_rejects_blank_alert() {
        assert_eq!(
            normalizer().normalize("", None, None).unwrap_err(),
            ValidationError::EmptyAlert
        );
        assert_eq!(
            normalizer().normalize(" \n\t \r\n", None, None).unwrap_err(),
            ValidationError::EmptyAlert
        );
    }

    #[test]
    fn test_cleans_line_endings_and_controls() {
        let input = normalizer()
            .normalize("  disk\r\nfull\u{0007}\rnow ", None, None)
            .unwrap();
        assert_eq!(input.alert_text(), "disk\nfull\nnow");
    }

    #[test]
    fn test_truncates_long_alerts() {
        let input = normalizer()
            .normalize(&"é".repeat(50), None, None)
            .unwrap();
        assert_eq!(input.alert_text().chars().count(), 20);
    }

    #[test]
    fn test_hints_default_and_trim() {
        let input = normalizer()
            .normalize("cpu high", Some("  checkout-api "), Some("   "))
            .unwrap();
        assert_eq!(input.service_name(), Some("checkout-api"));
        assert_eq!(input.environment(), "production");

        let input = normalizer()
            .normalize("cpu high", Some(""), Some("staging"))
            .unwrap();
        assert_eq!(input.service_name(), None);
        assert_eq!(input.environment(), "staging");
    }

    #[test]
    fn test_rejects_oversized_service_name() {
        let err = normalizer()
            .normalize("cpu high", Some(&"s".repeat(300)), None)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::FieldTooLong {
                field: "service_name",
                max: 255
            }
        );
    }
}
