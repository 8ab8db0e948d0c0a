//! Row filters.
//!
//! Filter rules are exclusion rules: a row is skipped as soon as one rule
//! matches. A rule naming a field the row does not have never matches
//! (except `is_empty`, for which an absent field counts as empty) and
//! produces a [`FilterWarning`] instead of an error.

use serde::{Deserialize, Serialize};

use crate::models::{literal_opt, SourceRecord};

/// Comparison applied by a [`FilterRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
    Contains,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::IsEmpty => "is_empty",
            FilterOperator::IsNotEmpty => "is_not_empty",
            FilterOperator::Contains => "contains",
        }
    }
}

/// Predicate excluding matching rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub field: String,
    pub operator: FilterOperator,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    /// Single operand, used when `values` is empty.
    #[serde(default, deserialize_with = "literal_opt", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A rule could not be evaluated against a row. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterWarning {
    /// Position of the rule in the mapping's filter list.
    pub rule_index: usize,
    pub field: String,
    pub message: String,
}

/// Result of running every filter rule over one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub skip: bool,
    pub warnings: Vec<FilterWarning>,
}

impl FilterRule {
    pub fn new(field: impl Into<String>, operator: FilterOperator, values: &[&str]) -> Self {
        Self {
            field: field.into(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
            value: None,
        }
    }

    /// Operand list: `values`, or the single `value`.
    pub fn operands(&self) -> Vec<&str> {
        if self.values.is_empty() {
            self.value.iter().map(String::as_str).collect()
        } else {
            self.values.iter().map(String::as_str).collect()
        }
    }

    /// First operand, empty when none is configured.
    fn operand(&self) -> &str {
        self.values
            .first()
            .or(self.value.as_ref())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Whether this rule excludes `record`. `None` when the field is absent
    /// and the operator cannot decide.
    pub fn matches(&self, record: &SourceRecord) -> Option<bool> {
        let Some(value) = record.get(&self.field) else {
            return match self.operator {
                FilterOperator::IsEmpty => Some(true),
                _ => None,
            };
        };

        Some(match self.operator {
            FilterOperator::Equals => value == self.operand(),
            FilterOperator::NotEquals => value != self.operand(),
            FilterOperator::In => self.operands().contains(&value.as_str()),
            FilterOperator::NotIn => !self.operands().contains(&value.as_str()),
            FilterOperator::IsEmpty => value.trim().is_empty(),
            FilterOperator::IsNotEmpty => !value.trim().is_empty(),
            FilterOperator::Contains => {
                let needle = self.operand();
                !needle.is_empty() && value.contains(needle)
            }
        })
    }
}

/// Run `rules` in order, stopping at the first match.
pub fn evaluate(rules: &[FilterRule], record: &SourceRecord) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for (rule_index, rule) in rules.iter().enumerate() {
        match rule.matches(record) {
            Some(true) => {
                outcome.skip = true;
                break;
            }
            Some(false) => {}
            None => outcome.warnings.push(FilterWarning {
                rule_index,
                field: rule.field.clone(),
                message: format!(
                    "Filter field '{}' not found in row, '{}' rule ignored",
                    rule.field,
                    rule.operator.as_str()
                ),
            }),
        }
    }

    outcome
}

/// Whether any rule excludes `record`.
pub fn should_skip(rules: &[FilterRule], record: &SourceRecord) -> bool {
    evaluate(rules, record).skip
}

/// Reference table of filter operators, printed by the CLI.
pub fn operators_description() -> String {
    r#"Available filter operators (a row is skipped when any rule matches):

| Operator | Skips the row when |
|----------|--------------------|
| equals | field value equals values[0] (or value) |
| not_equals | field value differs from values[0] (or value) |
| in | field value is one of values |
| not_in | field value is none of values |
| is_empty | field is absent or blank |
| is_not_empty | field is present and not blank |
| contains | field value contains values[0] (case-sensitive) |

Example filter rules in JSON:
[
  {"field": "Type", "operator": "in", "values": ["CASH TOP-UP", "CASH WITHDRAWAL"]},
  {"field": "Ticker", "operator": "is_empty"}
]"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, &str)]) -> SourceRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_in_excludes() {
        let rules = vec![FilterRule::new("Type", FilterOperator::In, &["DEPOSIT", "WITHDRAWAL"])];
        assert!(should_skip(&rules, &record(&[("Type", "DEPOSIT")])));
        assert!(!should_skip(&rules, &record(&[("Type", "BUY")])));
    }

    #[test]
    fn test_operators() {
        let row = record(&[("Type", "BUY - MARKET"), ("Note", "  ")]);
        let check = |operator, values: &[&str], field: &str| FilterRule::new(field, operator, values).matches(&row);

        assert_eq!(check(FilterOperator::Equals, &["BUY - MARKET"], "Type"), Some(true));
        assert_eq!(check(FilterOperator::NotEquals, &["BUY - MARKET"], "Type"), Some(false));
        assert_eq!(check(FilterOperator::NotIn, &["SELL"], "Type"), Some(true));
        assert_eq!(check(FilterOperator::IsEmpty, &[], "Note"), Some(true));
        assert_eq!(check(FilterOperator::IsNotEmpty, &[], "Note"), Some(false));
        assert_eq!(check(FilterOperator::Contains, &["MARKET"], "Type"), Some(true));
        assert_eq!(check(FilterOperator::Contains, &["market"], "Type"), Some(false));
        assert_eq!(check(FilterOperator::Contains, &[""], "Type"), Some(false));
    }

    #[test]
    fn test_missing_field_keeps_row_with_warning() {
        let rules = vec![
            FilterRule::new("Missing", FilterOperator::Equals, &["x"]),
            FilterRule::new("Type", FilterOperator::Equals, &["SELL"]),
        ];
        let outcome = evaluate(&rules, &record(&[("Type", "BUY")]));
        assert!(!outcome.skip);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].rule_index, 0);
        assert_eq!(outcome.warnings[0].field, "Missing");
    }

    #[test]
    fn test_missing_field_is_empty() {
        let rules = vec![FilterRule::new("Ticker", FilterOperator::IsEmpty, &[])];
        let outcome = evaluate(&rules, &record(&[("Type", "BUY")]));
        assert!(outcome.skip);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_first_match_stops() {
        let rules = vec![
            FilterRule::new("Type", FilterOperator::Equals, &["BUY"]),
            FilterRule::new("Missing", FilterOperator::Equals, &["x"]),
        ];
        let outcome = evaluate(&rules, &record(&[("Type", "BUY")]));
        assert!(outcome.skip);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_single_value_form() {
        let rule: FilterRule = serde_json::from_value(json!({
            "field": "Type",
            "operator": "equals",
            "value": "DIVIDEND"
        }))
        .unwrap();
        assert_eq!(rule.operands(), vec!["DIVIDEND"]);
        assert_eq!(rule.matches(&record(&[("Type", "DIVIDEND")])), Some(true));

        let rule: FilterRule = serde_json::from_value(json!({
            "field": "Qty",
            "operator": "in",
            "value": 0
        }))
        .unwrap();
        assert_eq!(rule.matches(&record(&[("Qty", "0")])), Some(true));
    }
}
