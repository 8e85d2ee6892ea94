//! Static registration record for one executor.

use std::sync::Arc;

use serde_json::Value;
use taskstack_quality::{Evaluator, ModelClient, Upstream};

use crate::error::ExecutionError;
use crate::executor::{Executor, InputContext, Materializer, PriorAssets};

/// Builds an attempt's input.
pub type InputBuilder =
    Arc<dyn Fn(&InputContext<'_>) -> Result<Value, ExecutionError> + Send + Sync>;

/// Instantiates the executor for one attempt.
pub type ExecutorFactory = Arc<dyn Fn(Arc<dyn ModelClient>) -> Arc<dyn Executor> + Send + Sync>;

/// Instantiates the evaluator for one attempt.
pub type EvaluatorFactory = Arc<dyn Fn() -> Arc<dyn Evaluator> + Send + Sync>;

/// Instantiates the materializer for one attempt.
pub type MaterializerFactory = Arc<dyn Fn() -> Arc<dyn Materializer> + Send + Sync>;

/// Binds an executor id to its factories.
#[derive(Clone)]
pub struct ExecutorDescriptor {
    /// Registry key
    pub executor_id: String,

    /// Key the output is published under for downstream executors
    pub asset_key: String,

    /// Executor ids whose assets the evaluator cross-checks against
    pub upstream_keys: Vec<String>,

    /// Whether the previous attempt's failure is passed to the input builder
    pub feeds_back_failures: bool,

    /// Human-readable description
    pub description: String,

    input_builder: InputBuilder,
    executor_factory: ExecutorFactory,
    evaluator_factory: EvaluatorFactory,
    materializer_factory: Option<MaterializerFactory>,
}

impl ExecutorDescriptor {
    /// Create a descriptor.
    ///
    /// The asset key defaults to the executor id and the input builder
    /// passes the extra inputs through unchanged.
    pub fn new<X, V>(executor_id: impl Into<String>, executor_factory: X, evaluator_factory: V) -> Self
    where
        X: Fn(Arc<dyn ModelClient>) -> Arc<dyn Executor> + Send + Sync + 'static,
        V: Fn() -> Arc<dyn Evaluator> + Send + Sync + 'static,
    {
        let executor_id = executor_id.into();
        Self {
            asset_key: executor_id.clone(),
            executor_id,
            upstream_keys: Vec::new(),
            feeds_back_failures: false,
            description: String::new(),
            input_builder: Arc::new(|ctx: &InputContext<'_>| Ok(ctx.extra_inputs.clone())),
            executor_factory: Arc::new(executor_factory),
            evaluator_factory: Arc::new(evaluator_factory),
            materializer_factory: None,
        }
    }

    /// Set the asset key.
    pub fn with_asset_key(mut self, asset_key: impl Into<String>) -> Self {
        self.asset_key = asset_key.into();
        self
    }

    /// Set the upstream executor ids.
    pub fn with_upstream_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upstream_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Opt in to failure feedback.
    pub fn with_failure_feedback(mut self) -> Self {
        self.feeds_back_failures = true;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the input builder.
    pub fn with_input_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&InputContext<'_>) -> Result<Value, ExecutionError> + Send + Sync + 'static,
    {
        self.input_builder = Arc::new(builder);
        self
    }

    /// Attach a materializer, enabling the artifact tier.
    pub fn with_materializer<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Materializer> + Send + Sync + 'static,
    {
        self.materializer_factory = Some(Arc::new(factory));
        self
    }

    /// Build the input for one attempt.
    pub fn build_input(&self, ctx: &InputContext<'_>) -> Result<Value, ExecutionError> {
        (self.input_builder)(ctx)
    }

    /// Instantiate the executor.
    pub fn executor(&self, model: Arc<dyn ModelClient>) -> Arc<dyn Executor> {
        (self.executor_factory)(model)
    }

    /// Instantiate the evaluator.
    pub fn evaluator(&self) -> Arc<dyn Evaluator> {
        (self.evaluator_factory)()
    }

    /// Instantiate the materializer, if any.
    pub fn materializer(&self) -> Option<Arc<dyn Materializer>> {
        self.materializer_factory.as_ref().map(|f| f())
    }

    /// Whether the artifact tier applies.
    pub fn has_materializer(&self) -> bool {
        self.materializer_factory.is_some()
    }

    /// Assets of the declared upstream executors, flattened by asset key.
    pub fn upstream(&self, prior_assets: &PriorAssets) -> Upstream {
        self.upstream_keys
            .iter()
            .filter_map(|key| prior_assets.get(key))
            .flat_map(|assets| assets.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }
}

impl std::fmt::Debug for ExecutorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorDescriptor")
            .field("executor_id", &self.executor_id)
            .field("asset_key", &self.asset_key)
            .field("upstream_keys", &self.upstream_keys)
            .field("feeds_back_failures", &self.feeds_back_failures)
            .field("has_materializer", &self.has_materializer())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use taskstack_core::TaskId;
    use taskstack_quality::ModelError;

    pub(crate) struct Echo;

    #[async_trait]
    impl Executor for Echo {
        async fn run(&self, input: Value) -> Result<Value, ExecutionError> {
            Ok(input)
        }
    }

    pub(crate) struct Lenient;

    impl Evaluator for Lenient {
        fn name(&self) -> &str {
            "lenient"
        }
    }

    pub(crate) struct NullModel;

    #[async_trait]
    impl ModelClient for NullModel {
        async fn complete_json(&self, _system: &str, _user: &str) -> Result<Value, ModelError> {
            Ok(json!({"dimensions": {}}))
        }
    }

    pub(crate) fn create_test_descriptor(id: &str) -> ExecutorDescriptor {
        ExecutorDescriptor::new(
            id,
            |_model| Arc::new(Echo) as Arc<dyn Executor>,
            || Arc::new(Lenient) as Arc<dyn Evaluator>,
        )
    }

    #[test]
    fn test_defaults() {
        let descriptor = create_test_descriptor("echo");
        assert_eq!(descriptor.asset_key, "echo");
        assert!(!descriptor.feeds_back_failures);
        assert!(!descriptor.has_materializer());

        let priors = PriorAssets::new();
        let extra = json!({"text": "hello"});
        let ctx = InputContext {
            task_id: TaskId::new(),
            prior_assets: &priors,
            extra_inputs: &extra,
            rework_notes: None,
            attempt: 1,
        };
        assert_eq!(descriptor.build_input(&ctx).unwrap(), extra);
    }

    #[test]
    fn test_upstream_selects_declared_keys() {
        let descriptor = create_test_descriptor("digest").with_upstream_keys(["outline"]);

        let mut priors = PriorAssets::new();
        priors.insert(
            "outline".to_string(),
            BTreeMap::from([("sections".to_string(), json!(["a", "b"]))]),
        );
        priors.insert(
            "echo".to_string(),
            BTreeMap::from([("echo".to_string(), json!("ignored"))]),
        );

        let upstream = descriptor.upstream(&priors);
        assert_eq!(upstream.len(), 1);
        assert_eq!(upstream["sections"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_factories_produce_fresh_instances() {
        let descriptor = create_test_descriptor("echo");
        let executor = descriptor.executor(Arc::new(NullModel));
        assert_eq!(executor.run(json!(1)).await.unwrap(), json!(1));
        assert_eq!(descriptor.evaluator().name(), "lenient");
        assert!(descriptor.materializer().is_none());
    }
}
