//! Deferred assertions
//!
//! Assertions queued on a factory run once the whole graph has been created
//! and wired. This module only decides *what* is compared; the comparison
//! itself belongs to an [`AssertionBridge`].

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{FactoryError, FactoryResult};
use crate::model::{Produced, Record};

type RecordProjection = Arc<dyn Fn(&Record) -> Value + Send + Sync>;
type ResultProjection = Arc<dyn Fn(&Produced) -> Value + Send + Sync>;

/// A callable projection of the produced result
#[derive(Clone)]
pub enum Check {
    /// Takes one record; applied to every member of a collection
    Each(RecordProjection),
    /// Takes the whole result, applied once
    Whole(ResultProjection),
}

impl Check {
    pub fn each<F>(projection: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Check::Each(Arc::new(projection))
    }

    pub fn whole<F>(projection: F) -> Self
    where
        F: Fn(&Produced) -> Value + Send + Sync + 'static,
    {
        Check::Whole(Arc::new(projection))
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Each(_) => f.write_str("Check::Each(..)"),
            Check::Whole(_) => f.write_str("Check::Whole(..)"),
        }
    }
}

/// One argument of a queued assertion
#[derive(Debug, Clone)]
pub enum AssertionArgument {
    Value(Value),
    Check(Check),
}

impl From<Value> for AssertionArgument {
    fn from(value: Value) -> Self {
        AssertionArgument::Value(value)
    }
}

impl From<&str> for AssertionArgument {
    fn from(value: &str) -> Self {
        AssertionArgument::Value(Value::from(value))
    }
}

impl From<String> for AssertionArgument {
    fn from(value: String) -> Self {
        AssertionArgument::Value(Value::from(value))
    }
}

impl From<i64> for AssertionArgument {
    fn from(value: i64) -> Self {
        AssertionArgument::Value(Value::from(value))
    }
}

impl From<bool> for AssertionArgument {
    fn from(value: bool) -> Self {
        AssertionArgument::Value(Value::from(value))
    }
}

impl From<Check> for AssertionArgument {
    fn from(check: Check) -> Self {
        AssertionArgument::Check(check)
    }
}

/// A queued assertion call such as `assertEquals("John", "name")`
#[derive(Debug, Clone)]
pub struct AssertionRequest {
    name: String,
    arguments: Vec<AssertionArgument>,
}

impl AssertionRequest {
    pub fn new(name: impl Into<String>, arguments: Vec<AssertionArgument>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[AssertionArgument] {
        &self.arguments
    }
}

/// Assert-by-name bridge to a test framework
pub trait AssertionBridge: Send + Sync {
    /// `expected` is `None` for single-argument assertions such as `assertNotNull`
    fn assert(&self, name: &str, expected: Option<&Value>, actual: &Value) -> FactoryResult<()>;
}

/// Built-in bridge covering the common comparison names
#[derive(Debug, Clone, Copy, Default)]
pub struct TestAssertions;

impl TestAssertions {
    fn expected<'a>(name: &str, expected: Option<&'a Value>) -> FactoryResult<&'a Value> {
        expected.ok_or_else(|| FactoryError::assertion(format!("{} needs an expected value", name)))
    }

    fn pretty(value: &Value) -> String {
        serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
    }

    fn size(value: &Value) -> Option<usize> {
        match value {
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => Some(map.len()),
            Value::String(text) => Some(text.chars().count()),
            Value::Null => Some(0),
            _ => None,
        }
    }

    fn is_empty(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Bool(flag) => !flag,
            Value::Number(number) => number.as_f64() == Some(0.0),
            other => Self::size(other) == Some(0),
        }
    }
}

impl AssertionBridge for TestAssertions {
    fn assert(&self, name: &str, expected: Option<&Value>, actual: &Value) -> FactoryResult<()> {
        let holds = match name {
            "assertEquals" | "assertSame" => Self::expected(name, expected)? == actual,
            "assertNotEquals" | "assertNotSame" => Self::expected(name, expected)? != actual,
            "assertTrue" => actual == &Value::Bool(true),
            "assertFalse" => actual == &Value::Bool(false),
            "assertNull" => actual.is_null(),
            "assertNotNull" => !actual.is_null(),
            "assertEmpty" => Self::is_empty(actual),
            "assertNotEmpty" => !Self::is_empty(actual),
            "assertCount" => {
                let wanted = Self::expected(name, expected)?.as_u64().ok_or_else(|| {
                    FactoryError::assertion("assertCount expects an integer count")
                })?;
                Self::size(actual).map(|size| size as u64) == Some(wanted)
            }
            "assertContains" => {
                let needle = Self::expected(name, expected)?;
                match (actual, needle) {
                    (Value::Array(items), _) => items.contains(needle),
                    (Value::String(text), Value::String(part)) => text.contains(part.as_str()),
                    _ => false,
                }
            }
            "assertGreaterThan" => {
                let bound = Self::expected(name, expected)?.as_f64();
                matches!((actual.as_f64(), bound), (Some(a), Some(b)) if a > b)
            }
            "assertLessThan" => {
                let bound = Self::expected(name, expected)?.as_f64();
                matches!((actual.as_f64(), bound), (Some(a), Some(b)) if a < b)
            }
            other => {
                return Err(FactoryError::assertion(format!("unknown assertion '{}'", other)));
            }
        };

        if holds {
            return Ok(());
        }

        Err(FactoryError::assertion(match expected {
            Some(expected) => format!(
                "{} failed: expected {}, actual {}",
                name,
                Self::pretty(expected),
                Self::pretty(actual)
            ),
            None => format!("{} failed for {}", name, Self::pretty(actual)),
        }))
    }
}

/// Replays queued assertions against a produced result
pub struct AssertionRunner<'a> {
    bridge: &'a dyn AssertionBridge,
}

impl<'a> AssertionRunner<'a> {
    pub fn new(bridge: &'a dyn AssertionBridge) -> Self {
        Self { bridge }
    }

    pub fn replay(&self, requests: &[AssertionRequest], produced: &Produced) -> FactoryResult<()> {
        for request in requests {
            self.replay_one(request, produced)?;
        }
        Ok(())
    }

    fn replay_one(&self, request: &AssertionRequest, produced: &Produced) -> FactoryResult<()> {
        let arguments = request.arguments();
        let Some(compare) = arguments.first() else {
            return Err(FactoryError::assertion(format!(
                "{} was queued without arguments",
                request.name()
            )));
        };
        let check = arguments.get(1).unwrap_or(compare);

        let expected = if arguments.len() > 1 {
            match compare {
                AssertionArgument::Value(value) => Some(value),
                AssertionArgument::Check(_) => {
                    return Err(FactoryError::assertion(format!(
                        "{} expects a value to compare against, got a projection",
                        request.name()
                    )));
                }
            }
        } else {
            None
        };

        tracing::trace!(assertion = request.name(), "replaying assertion");

        match check {
            AssertionArgument::Check(Check::Each(projection)) => {
                for record in produced.records() {
                    self.bridge.assert(request.name(), expected, &projection(record))?;
                }
            }
            AssertionArgument::Check(Check::Whole(projection)) => {
                self.bridge.assert(request.name(), expected, &projection(produced))?;
            }
            AssertionArgument::Value(Value::String(field)) => {
                for record in produced.records() {
                    let actual = record.field(field).unwrap_or(Value::Null);
                    self.bridge.assert(request.name(), expected, &actual)?;
                }
            }
            AssertionArgument::Value(other) => {
                tracing::warn!(
                    assertion = request.name(),
                    check = %other,
                    "assertion check is neither a field name nor a projection, skipping"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::into_attributes;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Option<Value>, Value)>>,
    }

    impl AssertionBridge for Recorder {
        fn assert(
            &self,
            name: &str,
            expected: Option<&Value>,
            actual: &Value,
        ) -> FactoryResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), expected.cloned(), actual.clone()));
            Ok(())
        }
    }

    fn user(name: &str) -> Record {
        Record::new("User", into_attributes(json!({ "name": name })))
    }

    #[test]
    fn test_field_check_runs_per_member() {
        let recorder = Recorder::default();
        let produced = Produced::Many(vec![user("a"), user("b")]);
        let request = AssertionRequest::new("assertNotNull", vec!["name".into()]);

        AssertionRunner::new(&recorder).replay(&[request], &produced).unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("assertNotNull".to_string(), None, json!("a")));
        assert_eq!(calls[1].2, json!("b"));
    }

    #[test]
    fn test_expected_value_comes_first() {
        let recorder = Recorder::default();
        let produced = Produced::One(user("John"));
        let request = AssertionRequest::new("assertEquals", vec!["John".into(), "name".into()]);

        AssertionRunner::new(&recorder).replay(&[request], &produced).unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0].1, Some(json!("John")));
        assert_eq!(calls[0].2, json!("John"));
    }

    #[test]
    fn test_record_projection_applies_per_member() {
        let recorder = Recorder::default();
        let produced = Produced::Many(vec![user("ab"), user("abc")]);
        let check = Check::each(|record: &Record| json!(record.get_str("name").map(str::len)));
        let request =
            AssertionRequest::new("assertGreaterThan", vec![json!(1).into(), check.into()]);

        AssertionRunner::new(&recorder).replay(&[request], &produced).unwrap();

        let actuals: Vec<Value> = recorder
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.2.clone())
            .collect();
        assert_eq!(actuals, vec![json!(2), json!(3)]);
    }

    #[test]
    fn test_whole_projection_applies_once() {
        let recorder = Recorder::default();
        let produced = Produced::Many(vec![user("a"), user("b"), user("c")]);
        let check = Check::whole(|produced: &Produced| json!(produced.len()));
        let request = AssertionRequest::new("assertEquals", vec![json!(3).into(), check.into()]);

        AssertionRunner::new(&recorder).replay(&[request], &produced).unwrap();

        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_builtin_bridge() {
        let bridge = TestAssertions;

        assert!(bridge.assert("assertEquals", Some(&json!(1)), &json!(1)).is_ok());
        assert!(bridge.assert("assertEquals", Some(&json!(1)), &json!(2)).is_err());
        assert!(bridge.assert("assertNull", None, &Value::Null).is_ok());
        assert!(bridge.assert("assertCount", Some(&json!(2)), &json!([1, 2])).is_ok());
        assert!(bridge.assert("assertContains", Some(&json!("oh")), &json!("John")).is_ok());
        assert!(bridge.assert("assertFalse", None, &json!(false)).is_ok());
        assert!(bridge.assert("assertEmpty", None, &json!([])).is_ok());
        assert!(bridge.assert("assertEquals", None, &json!(1)).is_err());
        assert!(matches!(
            bridge.assert("assertWobbly", None, &json!(1)),
            Err(FactoryError::Assertion { .. })
        ));
    }

    #[test]
    fn test_failure_message() {
        let error = TestAssertions
            .assert("assertEquals", Some(&json!("Jane")), &json!("John"))
            .unwrap_err();

        assert_eq!(
            error.to_string(),
            "Assertion failed: assertEquals failed: expected \"Jane\", actual \"John\""
        );
    }
}
