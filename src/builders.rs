//! Model and loss construction.
//!
//! [`Builders`] pairs a model registry with a loss registry. The free
//! functions ([`build_model`], [`register_model`], ...) work on a
//! process-wide instance per backend, seeded with the default entries on
//! first use, and read the names to build from the global configuration.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use burn::tensor::backend::Backend;
use parking_lot::RwLock;

use crate::config::{Config, cfg};
use crate::errors::{BuildError, Result};
use crate::losses::{LossFn, SoftCrossEntropyLoss};
use crate::models::{
    AnyNet, Classifier, EffNetV1, EffNetV2, MobileNetV3, RegNet, ResNet, ShuffleNetV2,
};
use crate::registry::Registry;

/// Builds a model from the configuration on the given device.
pub type ModelCtor<B> = Arc<
    dyn Fn(&Config, &<B as Backend>::Device) -> Result<Box<dyn Classifier<B>>> + Send + Sync,
>;

/// Builds a loss function from the configuration on the given device.
pub type LossCtor<B> =
    Arc<dyn Fn(&Config, &<B as Backend>::Device) -> Result<Box<dyn LossFn<B>>> + Send + Sync>;

/// Wraps a constructor of a concrete model type.
pub fn model_ctor<B, M, F>(ctor: F) -> ModelCtor<B>
where
    B: Backend,
    M: Classifier<B> + 'static,
    F: Fn(&Config, &B::Device) -> Result<M> + Send + Sync + 'static,
{
    Arc::new(move |config: &Config, device: &B::Device| {
        ctor(config, device).map(|model| Box::new(model) as Box<dyn Classifier<B>>)
    })
}

/// Wraps a constructor of a concrete loss type.
pub fn loss_ctor<B, L, F>(ctor: F) -> LossCtor<B>
where
    B: Backend,
    L: LossFn<B> + 'static,
    F: Fn(&Config, &B::Device) -> Result<L> + Send + Sync + 'static,
{
    Arc::new(move |config: &Config, device: &B::Device| {
        ctor(config, device).map(|loss| Box::new(loss) as Box<dyn LossFn<B>>)
    })
}

/// Model and loss registries for one backend.
#[derive(Debug)]
pub struct Builders<B: Backend> {
    models: Registry<ModelCtor<B>>,
    losses: Registry<LossCtor<B>>,
}

impl<B: Backend> Default for Builders<B> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<B: Backend> Builders<B> {
    /// Creates empty registries.
    pub fn new() -> Self {
        Self {
            models: Registry::new("model"),
            losses: Registry::new("loss function"),
        }
    }

    /// Creates registries holding every built-in model and loss.
    pub fn with_defaults() -> Self {
        let builders = Self::new();
        builders.register_defaults();
        builders
    }

    fn register_defaults(&self) {
        self.models.register("anynet", model_ctor(AnyNet::<B>::from_config));
        self.models.register("effnet_v1", model_ctor(EffNetV1::<B>::from_config));
        self.models.register("resnet", model_ctor(ResNet::<B>::from_config));
        self.models.register("regnet", model_ctor(RegNet::<B>::from_config));
        self.models.register("mobilenetv3_small", model_ctor(MobileNetV3::<B>::small));
        self.models.register("mobilenetv3_large", model_ctor(MobileNetV3::<B>::large));
        self.models.register("shufflenetv2", model_ctor(ShuffleNetV2::<B>::from_config));
        self.models.register("effnet_v2", model_ctor(EffNetV2::<B>::from_config));

        self.losses.register(
            "cross_entropy",
            loss_ctor(|config: &Config, _device: &B::Device| {
                Ok(SoftCrossEntropyLoss::from_config(config))
            }),
        );

        log::debug!(
            "Registered default builders - models: {:?}, losses: {:?}",
            self.models.names(),
            self.losses.names()
        );
    }

    /// Registers a model constructor, overwriting any entry with the same
    /// name. Returns true if an entry was replaced.
    pub fn register_model<M, F>(&self, name: impl Into<String>, ctor: F) -> bool
    where
        M: Classifier<B> + 'static,
        F: Fn(&Config, &B::Device) -> Result<M> + Send + Sync + 'static,
    {
        self.models.register(name, model_ctor(ctor))
    }

    /// Registers a loss constructor, overwriting any entry with the same
    /// name. Returns true if an entry was replaced.
    pub fn register_loss_fun<L, F>(&self, name: impl Into<String>, ctor: F) -> bool
    where
        L: LossFn<B> + 'static,
        F: Fn(&Config, &B::Device) -> Result<L> + Send + Sync + 'static,
    {
        self.losses.register(name, loss_ctor(ctor))
    }

    /// Looks up the constructor for `MODEL.TYPE`.
    pub fn get_model(&self, config: &Config) -> Result<ModelCtor<B>> {
        let name = &config.model.model_type;
        self.models
            .get(name)
            .ok_or_else(|| BuildError::UnsupportedModel { name: name.clone() })
    }

    /// Looks up the constructor for `MODEL.LOSS_FUN`.
    pub fn get_loss_fun(&self, config: &Config) -> Result<LossCtor<B>> {
        let name = &config.model.loss_fun;
        self.losses
            .get(name)
            .ok_or_else(|| BuildError::UnsupportedLoss { name: name.clone() })
    }

    /// Builds the model named by `MODEL.TYPE` on `device`.
    pub fn build_model(&self, config: &Config, device: &B::Device) -> Result<Box<dyn Classifier<B>>> {
        let ctor = self.get_model(config)?;
        log::info!("Building model '{}'", config.model.model_type);
        let model = ctor(config, device)?;
        log::debug!(
            "Built {} with {} parameters",
            model.arch(),
            model.num_params()
        );
        Ok(model)
    }

    /// Builds the loss named by `MODEL.LOSS_FUN` on `device`.
    pub fn build_loss_fun(&self, config: &Config, device: &B::Device) -> Result<Box<dyn LossFn<B>>> {
        let ctor = self.get_loss_fun(config)?;
        log::info!("Building loss function '{}'", config.model.loss_fun);
        ctor(config, device)
    }

    /// Registered model names, sorted.
    pub fn model_names(&self) -> Vec<String> {
        self.models.names()
    }

    /// Registered loss names, sorted.
    pub fn loss_names(&self) -> Vec<String> {
        self.losses.names()
    }
}

type BuildersMap = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static GLOBAL_BUILDERS: OnceLock<BuildersMap> = OnceLock::new();

/// Returns the process-wide builders of backend `B`, creating them with the
/// default entries on first access.
pub fn global_builders<B: Backend>() -> Arc<Builders<B>> {
    let map = GLOBAL_BUILDERS.get_or_init(Default::default);
    let key = TypeId::of::<B>();

    let existing = map.read().get(&key).cloned();
    let entry = match existing {
        Some(entry) => entry,
        None => {
            let mut guard = map.write();
            let entry = guard.entry(key).or_insert_with(|| {
                log::info!("Initializing global builders for {}", std::any::type_name::<B>());
                Arc::new(Builders::<B>::with_defaults())
            });
            Arc::clone(entry)
        }
    };

    entry
        .downcast::<Builders<B>>()
        .unwrap_or_else(|_| unreachable!("global builders are keyed by their backend type"))
}

/// Replaces the global builders of backend `B` with fresh defaults,
/// dropping every runtime registration.
pub fn reset_builders<B: Backend>() {
    let map = GLOBAL_BUILDERS.get_or_init(Default::default);
    map.write()
        .insert(TypeId::of::<B>(), Arc::new(Builders::<B>::with_defaults()));
}

/// Gets the model constructor named by `MODEL.TYPE` in the global configuration.
pub fn get_model<B: Backend>() -> Result<ModelCtor<B>> {
    global_builders::<B>().get_model(&cfg())
}

/// Gets the loss constructor named by `MODEL.LOSS_FUN` in the global configuration.
pub fn get_loss_fun<B: Backend>() -> Result<LossCtor<B>> {
    global_builders::<B>().get_loss_fun(&cfg())
}

/// Builds the model selected by the global configuration.
pub fn build_model<B: Backend>(device: &B::Device) -> Result<Box<dyn Classifier<B>>> {
    global_builders::<B>().build_model(&cfg(), device)
}

/// Builds the loss function selected by the global configuration.
pub fn build_loss_fun<B: Backend>(device: &B::Device) -> Result<Box<dyn LossFn<B>>> {
    global_builders::<B>().build_loss_fun(&cfg(), device)
}

/// Registers a model in the global registry of backend `B`.
pub fn register_model<B, M, F>(name: impl Into<String>, ctor: F) -> bool
where
    B: Backend,
    M: Classifier<B> + 'static,
    F: Fn(&Config, &B::Device) -> Result<M> + Send + Sync + 'static,
{
    global_builders::<B>().register_model(name, ctor)
}

/// Registers a loss function in the global registry of backend `B`.
pub fn register_loss_fun<B, L, F>(name: impl Into<String>, ctor: F) -> bool
where
    B: Backend,
    L: LossFn<B> + 'static,
    F: Fn(&Config, &B::Device) -> Result<L> + Send + Sync + 'static,
{
    global_builders::<B>().register_loss_fun(name, ctor)
}

pub fn list_models<B: Backend>() -> Vec<String> {
    global_builders::<B>().model_names()
}

pub fn list_loss_funs<B: Backend>() -> Vec<String> {
    global_builders::<B>().loss_names()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;

    type TestBackend = NdArray;

    #[derive(Debug)]
    struct ConstantLoss;

    impl<B: Backend> LossFn<B> for ConstantLoss {
        fn forward(&self, logits: Tensor<B, 2>, _targets: Tensor<B, 2>) -> Tensor<B, 1> {
            logits.zeros_like().sum()
        }

        fn name(&self) -> &'static str {
            "constant"
        }
    }

    #[test]
    fn test_default_names() {
        let builders = Builders::<TestBackend>::with_defaults();
        assert_eq!(
            builders.model_names(),
            vec![
                "anynet",
                "effnet_v1",
                "effnet_v2",
                "mobilenetv3_large",
                "mobilenetv3_small",
                "regnet",
                "resnet",
                "shufflenetv2",
            ]
        );
        assert_eq!(builders.loss_names(), vec!["cross_entropy"]);
        assert!(Builders::<TestBackend>::new().model_names().is_empty());
    }

    #[test]
    fn test_unsupported_names() {
        let builders = Builders::<TestBackend>::with_defaults();
        let device = Default::default();

        let config = Config::new().model_type("vgg16");
        let err = builders.build_model(&config, &device).unwrap_err();
        assert_eq!(err.to_string(), "Model type 'vgg16' not supported");

        let config = Config::new().loss_fun("hinge");
        let err = builders.build_loss_fun(&config, &device).unwrap_err();
        assert_eq!(err.to_string(), "Loss function type 'hinge' not supported");
    }

    #[test]
    fn test_build_default_loss() {
        let builders = Builders::<TestBackend>::with_defaults();
        let loss = builders.build_loss_fun(&Config::new(), &Default::default()).unwrap();
        assert_eq!(loss.name(), "cross_entropy");
    }

    #[test]
    fn test_register_loss_overwrites() {
        let builders = Builders::<TestBackend>::with_defaults();
        let replaced = builders.register_loss_fun("cross_entropy", |_: &Config, _: &_| Ok(ConstantLoss));
        assert!(replaced);

        let loss = builders.build_loss_fun(&Config::new(), &Default::default()).unwrap();
        assert_eq!(loss.name(), "constant");
        assert_eq!(builders.loss_names(), vec!["cross_entropy"]);
    }

    #[test]
    fn test_ctor_errors_propagate() {
        let builders = Builders::<TestBackend>::with_defaults();
        // Default ANYNET section has no stages.
        let config = Config::new().model_type("anynet");
        let err = builders.build_model(&config, &Default::default()).unwrap_err();
        assert!(matches!(err, BuildError::InvalidArchitecture { arch: "anynet", .. }));
    }

    #[test]
    fn test_constructor_may_register() {
        let builders = Arc::new(Builders::<TestBackend>::new());
        let inner = Arc::clone(&builders);
        builders.register_loss_fun("outer", move |_: &Config, _: &_| {
            inner.register_loss_fun("inner", |_: &Config, _: &_| Ok(ConstantLoss));
            Ok(ConstantLoss)
        });

        let config = Config::new().loss_fun("outer");
        builders.build_loss_fun(&config, &Default::default()).unwrap();
        assert_eq!(builders.loss_names(), vec!["inner", "outer"]);
    }
}
