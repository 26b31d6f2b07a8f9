use std::collections::BTreeMap;

use regex::Regex;

use crate::error::PhenoError;

/// One `(field, pattern)` pair applied to camera labels.
#[derive(Debug, Clone)]
pub struct LabelRule {
    field: String,
    pattern: Regex,
}

impl LabelRule {
    pub fn new(field: &str, pattern: &str) -> Result<Self, PhenoError> {
        let pattern = Regex::new(pattern).map_err(|err| PhenoError::InvalidPattern {
            field: field.to_string(),
            message: err.to_string(),
        })?;
        if pattern.captures_len() < 2 {
            return Err(PhenoError::InvalidPattern {
                field: field.to_string(),
                message: "pattern needs a capturing group".to_string(),
            });
        }
        Ok(Self {
            field: field.to_string(),
            pattern,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn extract(&self, label: &str) -> Option<String> {
        self.pattern
            .captures(label)
            .and_then(|caps| caps.get(1))
            .map(|value| value.as_str().to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelRules {
    rules: Vec<LabelRule>,
}

impl LabelRules {
    pub fn new(rules: Vec<LabelRule>) -> Self {
        Self { rules }
    }

    pub fn from_patterns<'a, I>(patterns: I) -> Result<Self, PhenoError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rules = patterns
            .into_iter()
            .map(|(field, pattern)| LabelRule::new(field, pattern))
            .collect::<Result<Vec<_>, PhenoError>>()?;
        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelRule> {
        self.rules.iter()
    }
}

/// Applies every rule independently; rules that do not match contribute nothing.
pub fn label_to_fields(label: &str, rules: &LabelRules) -> BTreeMap<String, String> {
    rules
        .iter()
        .filter_map(|rule| {
            rule.extract(label)
                .map(|value| (rule.field().to_string(), value))
        })
        .collect()
}
