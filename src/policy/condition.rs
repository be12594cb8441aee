//! Condition tree evaluation.
//!
//! Evaluation is pure: it reads the request and never fails. Anything that
//! cannot be compared evaluates to `false`. A missing attribute makes every
//! operator false except `not_exists` and `is_empty`.

use super::pattern::cached_regex;
use crate::domain::operand::{self, ClockWindow};
use crate::domain::{
    AttributeValue, Condition, ConditionGroup, ConditionOperator, EvaluationRequest,
    LogicalOperator,
};
use std::cmp::Ordering;
use std::net::IpAddr;

/// Evaluates a group, short-circuiting like `&&`/`||`. When `trace` is set,
/// one line per evaluated leaf condition is appended.
pub fn evaluate_group(
    request: &EvaluationRequest,
    group: &ConditionGroup,
    mut trace: Option<&mut Vec<String>>,
) -> bool {
    match group.operator {
        LogicalOperator::And => {
            for condition in &group.conditions {
                if !evaluate_traced(request, condition, trace.as_deref_mut()) {
                    return false;
                }
            }
            for sub in &group.groups {
                if !evaluate_group(request, sub, trace.as_deref_mut()) {
                    return false;
                }
            }
            true
        }
        LogicalOperator::Or => {
            for condition in &group.conditions {
                if evaluate_traced(request, condition, trace.as_deref_mut()) {
                    return true;
                }
            }
            for sub in &group.groups {
                if evaluate_group(request, sub, trace.as_deref_mut()) {
                    return true;
                }
            }
            false
        }
        LogicalOperator::Not => {
            if let Some(condition) = group.conditions.first() {
                !evaluate_traced(request, condition, trace)
            } else if let Some(sub) = group.groups.first() {
                !evaluate_group(request, sub, trace)
            } else {
                // Rejected by validation; kept total for unvalidated input.
                true
            }
        }
    }
}

fn evaluate_traced(
    request: &EvaluationRequest,
    condition: &Condition,
    trace: Option<&mut Vec<String>>,
) -> bool {
    let actual = request.attribute(condition.attribute.source, &condition.attribute.key);
    let outcome = check(condition.operator, actual, &condition.value);
    if let Some(lines) = trace {
        let actual = actual.map_or_else(|| "<missing>".to_string(), ToString::to_string);
        lines.push(if condition.operator.is_unary() {
            format!(
                "{} {} (actual: {}) => {}",
                condition.attribute, condition.operator, actual, outcome
            )
        } else {
            format!(
                "{} {} {} (actual: {}) => {}",
                condition.attribute, condition.operator, condition.value, actual, outcome
            )
        });
    }
    outcome
}

pub fn evaluate_condition(request: &EvaluationRequest, condition: &Condition) -> bool {
    evaluate_traced(request, condition, None)
}

/// Applies one operator to a resolved attribute and the expected operand.
pub fn check(
    operator: ConditionOperator,
    actual: Option<&AttributeValue>,
    expected: &AttributeValue,
) -> bool {
    let Some(actual) = actual else {
        return matches!(
            operator,
            ConditionOperator::NotExists | ConditionOperator::IsEmpty
        );
    };

    match operator {
        ConditionOperator::Exists => true,
        ConditionOperator::NotExists => false,
        ConditionOperator::IsEmpty => actual.is_empty(),
        ConditionOperator::IsNotEmpty => !actual.is_empty(),
        ConditionOperator::Equals => actual.loosely_equals(expected),
        ConditionOperator::NotEquals => !actual.loosely_equals(expected),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::NotContains => !contains(actual, expected),
        ConditionOperator::StartsWith => {
            text_pair(actual, expected).is_some_and(|(a, e)| a.starts_with(&e))
        }
        ConditionOperator::EndsWith => {
            text_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(&e))
        }
        ConditionOperator::Matches => matches_regex(actual, expected),
        ConditionOperator::In => is_member(actual, expected),
        ConditionOperator::NotIn => !is_member(actual, expected),
        ConditionOperator::GreaterThan => actual.compare(expected) == Some(Ordering::Greater),
        ConditionOperator::GreaterOrEqual => matches!(
            actual.compare(expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        ConditionOperator::LessThan => actual.compare(expected) == Some(Ordering::Less),
        ConditionOperator::LessOrEqual => matches!(
            actual.compare(expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        ConditionOperator::Between => match (actual.as_f64(), operand::between_bounds(expected)) {
            (Some(n), Some((low, high))) => n >= low && n <= high,
            _ => false,
        },
        ConditionOperator::IpInCidr => ip_in_networks(actual, expected),
        ConditionOperator::TimeInRange => {
            match (operand::clock_of(actual), ClockWindow::parse(expected)) {
                (Some(minute), Some(window)) => window.contains(minute),
                _ => false,
            }
        }
        ConditionOperator::DayOfWeekIn => {
            match (operand::parse_day_of_week(actual), operand::day_set(expected)) {
                (Some(day), Some(days)) => days.contains(&day),
                _ => false,
            }
        }
    }
}

fn is_scalar_text(value: &AttributeValue) -> bool {
    !matches!(
        value,
        AttributeValue::Null | AttributeValue::List(_) | AttributeValue::Map(_)
    )
}

fn text_pair(actual: &AttributeValue, expected: &AttributeValue) -> Option<(String, String)> {
    (is_scalar_text(actual) && is_scalar_text(expected))
        .then(|| (actual.render(), expected.render()))
}

fn contains(actual: &AttributeValue, expected: &AttributeValue) -> bool {
    match actual {
        AttributeValue::List(items) => items.iter().any(|item| item.loosely_equals(expected)),
        AttributeValue::Map(map) => is_scalar_text(expected) && map.contains_key(&expected.render()),
        _ => text_pair(actual, expected).is_some_and(|(a, e)| a.contains(&e)),
    }
}

fn is_member(actual: &AttributeValue, expected: &AttributeValue) -> bool {
    let candidates = match expected {
        AttributeValue::List(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };
    match actual {
        AttributeValue::List(items) => items
            .iter()
            .any(|item| candidates.iter().any(|c| item.loosely_equals(c))),
        _ => candidates.iter().any(|c| actual.loosely_equals(c)),
    }
}

fn matches_regex(actual: &AttributeValue, expected: &AttributeValue) -> bool {
    if !is_scalar_text(actual) {
        return false;
    }
    expected
        .as_str()
        .and_then(cached_regex)
        .is_some_and(|re| re.is_match(&actual.render()))
}

fn ip_in_networks(actual: &AttributeValue, expected: &AttributeValue) -> bool {
    let Some(ip) = actual.as_str().and_then(|s| s.trim().parse::<IpAddr>().ok()) else {
        return false;
    };
    operand::networks(expected).is_some_and(|nets| nets.iter().any(|net| net.contains(&ip)))
}
