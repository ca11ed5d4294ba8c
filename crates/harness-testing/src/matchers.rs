//! Matchers evaluated by the assertion engine.
//!
//! A matcher answers whether a value is acceptable and explains, in words,
//! what it expected and why a value fell short.

use std::cmp::Ordering;
use std::fmt::Debug;

/// A predicate over values with human readable descriptions.
pub trait Matcher<T: ?Sized>: Send + Sync {
    fn matches(&self, value: &T) -> bool;

    /// What the matcher expects, e.g. `is 3`.
    fn describe(&self) -> String;

    /// Why `value` was rejected, e.g. `was 2`.
    fn describe_mismatch(&self, value: &T) -> String;
}

impl<T: ?Sized, M: Matcher<T> + ?Sized> Matcher<T> for Box<M> {
    fn matches(&self, value: &T) -> bool {
        (**self).matches(value)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn describe_mismatch(&self, value: &T) -> String {
        (**self).describe_mismatch(value)
    }
}

// ============================================================================
// Equality and ordering
// ============================================================================

pub struct Is<V>(V);

/// Equal to `expected`.
pub fn is<V>(expected: V) -> Is<V> {
    Is(expected)
}

impl<V> Matcher<V> for Is<V>
where
    V: PartialEq + Debug + Send + Sync,
{
    fn matches(&self, value: &V) -> bool {
        *value == self.0
    }

    fn describe(&self) -> String {
        format!("is {:?}", self.0)
    }

    fn describe_mismatch(&self, value: &V) -> String {
        format!("was {value:?}")
    }
}

pub struct IsNot<M>(M);

/// Rejects whatever `matcher` accepts.
pub fn is_not<M>(matcher: M) -> IsNot<M> {
    IsNot(matcher)
}

impl<T, M> Matcher<T> for IsNot<M>
where
    T: Debug + ?Sized,
    M: Matcher<T>,
{
    fn matches(&self, value: &T) -> bool {
        !self.0.matches(value)
    }

    fn describe(&self) -> String {
        format!("not {}", self.0.describe())
    }

    fn describe_mismatch(&self, value: &T) -> String {
        format!("was {value:?}")
    }
}

pub struct Ordered<V> {
    expected: V,
    label: &'static str,
    accepts: fn(Ordering) -> bool,
}

impl<V> Matcher<V> for Ordered<V>
where
    V: PartialOrd + Debug + Send + Sync,
{
    fn matches(&self, value: &V) -> bool {
        value
            .partial_cmp(&self.expected)
            .is_some_and(self.accepts)
    }

    fn describe(&self) -> String {
        format!("a value {} {:?}", self.label, self.expected)
    }

    fn describe_mismatch(&self, value: &V) -> String {
        format!("{value:?} was not {} {:?}", self.label, self.expected)
    }
}

pub fn greater_than<V>(expected: V) -> Ordered<V> {
    Ordered {
        expected,
        label: "greater than",
        accepts: Ordering::is_gt,
    }
}

pub fn greater_than_or_equal_to<V>(expected: V) -> Ordered<V> {
    Ordered {
        expected,
        label: "greater than or equal to",
        accepts: Ordering::is_ge,
    }
}

pub fn less_than<V>(expected: V) -> Ordered<V> {
    Ordered {
        expected,
        label: "less than",
        accepts: Ordering::is_lt,
    }
}

pub fn less_than_or_equal_to<V>(expected: V) -> Ordered<V> {
    Ordered {
        expected,
        label: "less than or equal to",
        accepts: Ordering::is_le,
    }
}

// ============================================================================
// Strings and options
// ============================================================================

pub struct ContainsString(String);

/// A string containing `fragment`.
pub fn contains_string(fragment: impl Into<String>) -> ContainsString {
    ContainsString(fragment.into())
}

impl Matcher<String> for ContainsString {
    fn matches(&self, value: &String) -> bool {
        value.contains(self.0.as_str())
    }

    fn describe(&self) -> String {
        format!("a string containing {:?}", self.0)
    }

    fn describe_mismatch(&self, value: &String) -> String {
        format!("was {value:?}")
    }
}

pub struct IsSome;
pub struct IsNone;

pub fn is_some() -> IsSome {
    IsSome
}

pub fn is_none() -> IsNone {
    IsNone
}

impl<V: Debug> Matcher<Option<V>> for IsSome {
    fn matches(&self, value: &Option<V>) -> bool {
        value.is_some()
    }

    fn describe(&self) -> String {
        "some value".to_string()
    }

    fn describe_mismatch(&self, _value: &Option<V>) -> String {
        "was None".to_string()
    }
}

impl<V: Debug> Matcher<Option<V>> for IsNone {
    fn matches(&self, value: &Option<V>) -> bool {
        value.is_none()
    }

    fn describe(&self) -> String {
        "no value".to_string()
    }

    fn describe_mismatch(&self, value: &Option<V>) -> String {
        format!("was {value:?}")
    }
}

// ============================================================================
// Predicates and combinations
// ============================================================================

pub struct Predicate<F> {
    description: String,
    predicate: F,
}

/// Accepts values for which `predicate` returns true.
pub fn matches<T, F>(description: impl Into<String>, predicate: F) -> Predicate<F>
where
    T: ?Sized,
    F: Fn(&T) -> bool + Send + Sync,
{
    Predicate {
        description: description.into(),
        predicate,
    }
}

impl<T, F> Matcher<T> for Predicate<F>
where
    T: Debug + ?Sized,
    F: Fn(&T) -> bool + Send + Sync,
{
    fn matches(&self, value: &T) -> bool {
        (self.predicate)(value)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }

    fn describe_mismatch(&self, value: &T) -> String {
        format!("was {value:?}")
    }
}

pub struct AllOf<T: ?Sized>(Vec<Box<dyn Matcher<T>>>);

/// Accepts values every matcher accepts.
pub fn all_of<T: ?Sized>(matchers: Vec<Box<dyn Matcher<T>>>) -> AllOf<T> {
    AllOf(matchers)
}

impl<T: ?Sized> Matcher<T> for AllOf<T> {
    fn matches(&self, value: &T) -> bool {
        self.0.iter().all(|m| m.matches(value))
    }

    fn describe(&self) -> String {
        join(self.0.iter().map(|m| m.describe()), " and ")
    }

    fn describe_mismatch(&self, value: &T) -> String {
        join(
            self.0
                .iter()
                .filter(|m| !m.matches(value))
                .map(|m| format!("{}: {}", m.describe(), m.describe_mismatch(value))),
            ", ",
        )
    }
}

pub struct AnyOf<T: ?Sized>(Vec<Box<dyn Matcher<T>>>);

/// Accepts values at least one matcher accepts.
pub fn any_of<T: ?Sized>(matchers: Vec<Box<dyn Matcher<T>>>) -> AnyOf<T> {
    AnyOf(matchers)
}

impl<T: ?Sized> Matcher<T> for AnyOf<T> {
    fn matches(&self, value: &T) -> bool {
        self.0.iter().any(|m| m.matches(value))
    }

    fn describe(&self) -> String {
        join(self.0.iter().map(|m| m.describe()), " or ")
    }

    fn describe_mismatch(&self, value: &T) -> String {
        join(self.0.iter().map(|m| m.describe_mismatch(value)), ", ")
    }
}

fn join(parts: impl Iterator<Item = String>, separator: &str) -> String {
    format!("({})", parts.collect::<Vec<_>>().join(separator))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_is_describes_expectation_and_mismatch() {
        let matcher = is(3);
        assert!(matcher.matches(&3));
        assert!(!matcher.matches(&2));
        assert_eq!(matcher.describe(), "is 3");
        assert_eq!(matcher.describe_mismatch(&2), "was 2");
        assert!(is_not(is(3)).matches(&2));
    }

    #[test]
    fn test_ordering_matchers() {
        assert!(greater_than(5).matches(&6));
        assert!(!greater_than(5).matches(&5));
        assert!(greater_than_or_equal_to(5).matches(&5));
        assert!(less_than(1.5).matches(&1.0));
        assert!(!less_than_or_equal_to(1.5).matches(&f64::NAN));
        assert_eq!(greater_than(5).describe_mismatch(&1), "1 was not greater than 5");
    }

    #[test]
    fn test_string_and_option_matchers() {
        assert!(contains_string("ready").matches(&"server ready".to_string()));
        assert!(is_some().matches(&Some(1)));
        assert!(is_none().matches(&None::<u8>));
        assert_eq!(is_none().describe_mismatch(&Some(4)), "was Some(4)");
    }

    #[test]
    fn test_combinations() {
        let both: AllOf<i32> = all_of(vec![Box::new(greater_than(1)), Box::new(less_than(10))]);
        assert!(both.matches(&5));
        assert!(!both.matches(&12));
        assert!(both.describe_mismatch(&12).contains("less than 10"));

        let either: AnyOf<i32> = any_of(vec![Box::new(is(1)), Box::new(is(2))]);
        assert!(either.matches(&2));
        assert_eq!(either.describe(), "(is 1 or is 2)");

        let even = matches("an even number", |n: &i32| n % 2 == 0);
        assert!(even.matches(&4));
        assert_eq!(even.describe(), "an even number");
    }
}
