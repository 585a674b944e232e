//! Property-based tests for the rule evaluator.

use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::rules::condition::{Condition, Operator, RuleEvaluator};
use crate::rules::value::{DocumentFields, Value};

fn arb_operator() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Equals),
        Just(Operator::NotEquals),
        Just(Operator::GreaterThan),
        Just(Operator::GreaterThanOrEqual),
        Just(Operator::LessThan),
        Just(Operator::LessThanOrEqual),
        Just(Operator::In),
        Just(Operator::NotIn),
        Just(Operator::Contains),
        Just(Operator::StartsWith),
        Just(Operator::EndsWith),
        Just(Operator::Regex),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000_000i64..1_000_000i64).prop_map(|n| Value::Number(Decimal::new(n, 2))),
        "[ -~]{0,12}".prop_map(Value::String),
    ]
}

fn amount_fields(amount: Decimal) -> DocumentFields {
    let mut data = DocumentFields::new();
    data.insert("amount".to_string(), Value::Number(amount));
    data
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A condition on a field the document lacks never matches.
    #[test]
    fn prop_missing_field_fails_closed(
        operator in arb_operator(),
        value in arb_value(),
    ) {
        let condition = Condition::new("absent", operator, value);
        prop_assert!(!RuleEvaluator::evaluate(&[condition], &DocumentFields::new()));
    }

    /// Threshold conditions agree with decimal ordering.
    #[test]
    fn prop_threshold_matches_decimal_ordering(
        amount in 0i64..10_000_000i64,
        threshold in 0i64..10_000_000i64,
    ) {
        let amount = Decimal::new(amount, 2);
        let threshold = Decimal::new(threshold, 2);
        let data = amount_fields(amount);

        let gte = Condition::new("amount", Operator::GreaterThanOrEqual, threshold);
        let lt = Condition::new("amount", Operator::LessThan, threshold);

        prop_assert_eq!(gte.matches(&data), amount >= threshold);
        prop_assert_eq!(lt.matches(&data), amount < threshold);
    }

    /// Numeric strings compare the same as the numbers they spell.
    #[test]
    fn prop_numeric_strings_coerce(amount in -1_000_000i64..1_000_000i64) {
        let number = Decimal::new(amount, 2);
        let mut data = DocumentFields::new();
        data.insert("amount".to_string(), Value::String(number.to_string()));

        let condition = Condition::new("amount", Operator::Equals, number);
        prop_assert!(condition.matches(&data));
    }

    /// For a present field, `!=` is exactly the negation of `=`.
    #[test]
    fn prop_not_equals_negates_equals(field in arb_value(), expected in arb_value()) {
        let mut data = DocumentFields::new();
        data.insert("f".to_string(), field);

        let eq = Condition::new("f", Operator::Equals, expected.clone());
        let ne = Condition::new("f", Operator::NotEquals, expected);
        prop_assert_ne!(eq.matches(&data), ne.matches(&data));
    }

    /// The evaluator is total: arbitrary patterns never panic.
    #[test]
    fn prop_regex_is_total(pattern in "[ -~]{0,16}", subject in "[ -~]{0,16}") {
        let mut data = DocumentFields::new();
        data.insert("s".to_string(), Value::String(subject));
        let condition = Condition::new("s", Operator::Regex, pattern);
        let _ = condition.matches(&data);
    }
}
