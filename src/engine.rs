//! Transformation engine
//!
//! Applies a resolved delta chain to a record. Each step works against a
//! snapshot of the record as it stood before the step, so rules within one
//! delta never observe each other's writes. The caller's record is never
//! touched: the engine transforms an owned copy and hands it back whole or
//! not at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::delta::Record;
use crate::error::{Result, SchemaError};
use crate::expr::{parse_rule, EvalError, Evaluator};
use crate::graph::ChainStep;

/// Cooperative cancellation flag checked at delta boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Applies delta chains to records. Every rule evaluates under its own
/// step budget, so chain length never turns healthy rules into timeouts.
#[derive(Debug, Clone)]
pub struct TransformationEngine {
    step_budget: u64,
}

impl TransformationEngine {
    pub const DEFAULT_STEP_BUDGET: u64 = 10_000;

    pub fn new(step_budget: u64) -> Self {
        Self { step_budget }
    }

    pub fn step_budget(&self) -> u64 {
        self.step_budget
    }

    /// Applies `steps` to `record` and returns the transformed copy.
    pub fn apply(&self, record: &Record, steps: &[ChainStep]) -> Result<Record> {
        self.apply_cancellable(record, steps, &CancelToken::new())
    }

    /// Like [`apply`](Self::apply), checking `cancel` before each delta.
    pub fn apply_cancellable(
        &self,
        record: &Record,
        steps: &[ChainStep],
        cancel: &CancelToken,
    ) -> Result<Record> {
        let mut current = record.clone();
        for step in steps {
            if cancel.is_cancelled() {
                return Err(SchemaError::Cancelled {
                    from: step.from().clone(),
                    to: step.to().clone(),
                });
            }
            current = self.apply_step(current, step)?;
            debug!(
                from = %step.from(),
                to = %step.to(),
                fields = current.len(),
                "applied delta"
            );
        }
        Ok(current)
    }

    fn apply_step(&self, record: Record, step: &ChainStep) -> Result<Record> {
        let delta = &step.delta;
        let (rules, dropped): (_, Vec<&String>) = if step.inverse {
            (
                &delta.inverse_transformations,
                delta.added.iter().collect(),
            )
        } else {
            (&delta.transformations, delta.removed.iter().collect())
        };

        // Rules read the pre-step snapshot; writes land in `next`.
        let snapshot = record;
        let mut next = snapshot.clone();

        for (field, rule) in rules {
            let mut evaluator = Evaluator::new(&snapshot, self.step_budget);
            let value = parse_rule(rule)
                .and_then(|expr| evaluator.eval(&expr))
                .map_err(|e| rule_error(step, field, e, self.step_budget))?;
            next.insert(field.clone(), JsonValue::from(value));
        }

        if !step.inverse {
            for field in &delta.added {
                next.entry(field.clone()).or_insert(JsonValue::Null);
            }
        }
        for field in dropped {
            next.remove(field);
        }
        Ok(next)
    }
}

impl Default for TransformationEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STEP_BUDGET)
    }
}

fn rule_error(step: &ChainStep, field: &str, cause: EvalError, budget: u64) -> SchemaError {
    match cause {
        EvalError::BudgetExhausted => SchemaError::TransformationTimeout {
            field: field.to_string(),
            budget,
        },
        other => SchemaError::Transformation {
            from: step.from().clone(),
            to: step.to().clone(),
            field: field.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{Delta, VersionId};
    use serde_json::json;

    fn version(s: &str) -> VersionId {
        VersionId::new(s).unwrap()
    }

    fn record(value: serde_json::Value) -> Record {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn forward(delta: Delta) -> ChainStep {
        ChainStep {
            delta: Arc::new(delta),
            inverse: false,
        }
    }

    fn inverse(delta: Delta) -> ChainStep {
        ChainStep {
            delta: Arc::new(delta),
            inverse: true,
        }
    }

    fn name_split_delta() -> Delta {
        Delta::new(version("v1"), version("v2"))
            .add_field("firstName")
            .add_field("lastName")
            .remove_field("name")
            .transform("firstName", "get(split(name, \" \"), 0)")
            .transform("lastName", "get(split(name, \" \"), 1)")
            .inverse("name", "concat(firstName, \" \", lastName)")
    }

    #[test]
    fn test_name_split_forward() {
        let engine = TransformationEngine::default();
        let input = record(json!({"name": "Ada Lovelace"}));
        let out = engine.apply(&input, &[forward(name_split_delta())]).unwrap();
        assert_eq!(
            JsonValue::Object(out),
            json!({"firstName": "Ada", "lastName": "Lovelace"})
        );
        // Caller's record untouched.
        assert_eq!(input.len(), 1);
    }

    #[test]
    fn test_name_split_inverse_round_trips() {
        let engine = TransformationEngine::default();
        let input = record(json!({"name": "Ada Lovelace"}));
        let upgraded = engine.apply(&input, &[forward(name_split_delta())]).unwrap();
        let restored = engine
            .apply(&upgraded, &[inverse(name_split_delta())])
            .unwrap();
        assert_eq!(JsonValue::Object(restored), json!({"name": "Ada Lovelace"}));
    }

    #[test]
    fn test_added_field_without_rule_defaults_to_null() {
        let engine = TransformationEngine::default();
        let delta = Delta::new(version("v1"), version("v2")).add_field("email");
        let out = engine
            .apply(&record(json!({"name": "Ada"})), &[forward(delta)])
            .unwrap();
        assert_eq!(out["email"], JsonValue::Null);
        assert_eq!(out["name"], json!("Ada"));
    }

    #[test]
    fn test_rules_read_pre_step_snapshot() {
        // Both rules reference `a` as it stood before the step, so the
        // rewrite of `a` cannot leak into `b`.
        let engine = TransformationEngine::default();
        let delta = Delta::new(version("v1"), version("v2"))
            .transform("a", "a + 1")
            .transform("b", "a * 10");
        let out = engine
            .apply(&record(json!({"a": 5, "b": 0})), &[forward(delta)])
            .unwrap();
        assert_eq!(out["a"], json!(6.0));
        assert_eq!(out["b"], json!(50.0));
    }

    #[test]
    fn test_rule_error_names_field_and_endpoints() {
        let engine = TransformationEngine::default();
        let delta = Delta::new(version("v1"), version("v2")).transform("x", "missing + 1");
        let err = engine
            .apply(&record(json!({})), &[forward(delta)])
            .unwrap_err();
        match err {
            SchemaError::Transformation { from, to, field, .. } => {
                assert_eq!(from, version("v1"));
                assert_eq!(to, version("v2"));
                assert_eq!(field, "x");
            }
            other => panic!("expected transformation error, got {other}"),
        }
    }

    #[test]
    fn test_budget_exhaustion_maps_to_timeout() {
        let engine = TransformationEngine::new(2);
        let delta = Delta::new(version("v1"), version("v2")).transform("x", "a + a + a + a");
        let err = engine
            .apply(&record(json!({"a": 1})), &[forward(delta)])
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::TransformationTimeout { budget: 2, .. }
        ));
    }

    #[test]
    fn test_budget_is_per_rule() {
        // The budget covers one rule, not the whole chain: a long chain of
        // individually cheap rules applies cleanly.
        let engine = TransformationEngine::new(10);
        let delta = Delta::new(version("v1"), version("v2")).transform("a", "a + 1");
        let steps: Vec<ChainStep> = (0..20).map(|_| forward(delta.clone())).collect();
        let out = engine.apply(&record(json!({"a": 0})), &steps).unwrap();
        assert_eq!(out["a"], json!(20.0));

        // A single rule over budget still times out.
        let wide = Delta::new(version("v1"), version("v2"))
            .transform("a", "a + a + a + a + a + a + a + a");
        let err = engine
            .apply(&record(json!({"a": 1})), &[forward(wide)])
            .unwrap_err();
        assert!(matches!(err, SchemaError::TransformationTimeout { .. }));
    }

    #[test]
    fn test_cancellation_before_first_delta() {
        let engine = TransformationEngine::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = engine
            .apply_cancellable(
                &record(json!({"name": "Ada Lovelace"})),
                &[forward(name_split_delta())],
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::Cancelled { .. }));
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let engine = TransformationEngine::default();
        let input = record(json!({"name": "Ada"}));
        let out = engine.apply(&input, &[]).unwrap();
        assert_eq!(out, input);
    }
}
