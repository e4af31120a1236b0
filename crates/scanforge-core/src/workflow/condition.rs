//! Condition evaluation: `(left, operator, right)` triples over the
//! workflow's variable map (spec §4.3 "Condition evaluation"). An empty
//! condition list always passes (spec §4.3 edge case: "no conditions =
//! always runs").

use regex::Regex;
use serde_json::Value;

use scanforge_types::model::{Condition, ConditionOperator};

/// Resolve a dotted path (`"stages.analysis.findings_count"`) into
/// `context`, one `serde_json::Map` level per segment.
fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn as_str(value: &Value) -> Option<&str> {
    value.as_str()
}

fn evaluate_operator(operator: ConditionOperator, lhs: &Value, rhs: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => lhs == rhs,
        ConditionOperator::NotEquals => lhs != rhs,
        ConditionOperator::GreaterThan => matches!((as_f64(lhs), as_f64(rhs)), (Some(l), Some(r)) if l > r),
        ConditionOperator::LessThan => matches!((as_f64(lhs), as_f64(rhs)), (Some(l), Some(r)) if l < r),
        ConditionOperator::GreaterOrEqual => matches!((as_f64(lhs), as_f64(rhs)), (Some(l), Some(r)) if l >= r),
        ConditionOperator::LessOrEqual => matches!((as_f64(lhs), as_f64(rhs)), (Some(l), Some(r)) if l <= r),
        ConditionOperator::Contains => match (lhs, rhs) {
            (Value::Array(items), needle) => items.contains(needle),
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
        ConditionOperator::NotContains => !evaluate_operator(ConditionOperator::Contains, lhs, rhs),
        ConditionOperator::StartsWith => {
            matches!((as_str(lhs), as_str(rhs)), (Some(l), Some(r)) if l.starts_with(r))
        }
        ConditionOperator::EndsWith => {
            matches!((as_str(lhs), as_str(rhs)), (Some(l), Some(r)) if l.ends_with(r))
        }
        ConditionOperator::RegexMatch => match (as_str(lhs), as_str(rhs)) {
            (Some(l), Some(pattern)) => Regex::new(pattern).map(|re| re.is_match(l)).unwrap_or(false),
            _ => false,
        },
        ConditionOperator::InList => match rhs {
            Value::Array(items) => items.contains(lhs),
            _ => false,
        },
    }
}

/// Whether every condition in `conditions` holds against `context` (spec
/// §4.3: all conditions must hold for the stage to run).
pub fn all_conditions_hold(conditions: &[Condition], context: &Value) -> bool {
    conditions.iter().all(|condition| {
        let Some(lhs) = resolve_path(context, &condition.lhs_path) else {
            return false;
        };
        evaluate_operator(condition.operator, lhs, &condition.rhs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "stages": {
                "analysis": { "findings_count": 12, "label": "high-risk" }
            }
        })
    }

    fn cond(path: &str, op: ConditionOperator, rhs: Value) -> Condition {
        Condition {
            lhs_path: path.into(),
            operator: op,
            rhs,
        }
    }

    #[test]
    fn empty_conditions_always_pass() {
        assert!(all_conditions_hold(&[], &ctx()));
    }

    #[test]
    fn numeric_comparison_reads_nested_path() {
        let c = cond("stages.analysis.findings_count", ConditionOperator::GreaterThan, json!(10));
        assert!(all_conditions_hold(&[c], &ctx()));
    }

    #[test]
    fn missing_path_fails_the_condition() {
        let c = cond("stages.missing.value", ConditionOperator::Equals, json!(1));
        assert!(!all_conditions_hold(&[c], &ctx()));
    }

    #[test]
    fn regex_match_against_string_field() {
        let c = cond("stages.analysis.label", ConditionOperator::RegexMatch, json!("^high-"));
        assert!(all_conditions_hold(&[c], &ctx()));
    }

    #[test]
    fn all_conditions_must_hold_for_pass() {
        let passing = cond("stages.analysis.findings_count", ConditionOperator::GreaterThan, json!(1));
        let failing = cond("stages.analysis.findings_count", ConditionOperator::LessThan, json!(1));
        assert!(!all_conditions_hold(&[passing, failing], &ctx()));
    }
}
