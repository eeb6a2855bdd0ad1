//! Spoof classifier: MobileNetV3-Small backbone with a small dense head
//!
//! Architecture:
//! - MobileNetV3-Small feature extractor (frozen by default)
//! - Global average pooling
//! - Dense(512) + ReLU
//! - Dropout(0.5)
//! - Dense(num_classes)

use burn::{
    config::Config,
    module::{AutodiffModule, Module},
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};
use tracing::{info, warn};

use crate::config::ModelConfig;
use crate::model::backbone::{MobileNetV3Small, MobileNetV3SmallConfig};

#[derive(Config, Debug)]
pub struct SpoofClassifierConfig {
    pub num_classes: usize,

    /// Width of the hidden dense layer
    #[config(default = "512")]
    pub dense_units: usize,

    #[config(default = "0.5")]
    pub dropout: f64,

    /// Train backbone weights too instead of only the head
    #[config(default = "false")]
    pub trainable_backbone: bool,
}

impl SpoofClassifierConfig {
    /// Build with a randomly initialised backbone
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpoofClassifier<B> {
        let backbone = MobileNetV3SmallConfig::new().init(device);
        self.init_with_backbone(backbone, device)
    }

    pub fn init_with_backbone<B: Backend>(
        &self,
        backbone: MobileNetV3Small<B>,
        device: &B::Device,
    ) -> SpoofClassifier<B> {
        let backbone = if self.trainable_backbone {
            backbone
        } else {
            backbone.no_grad()
        };
        let features = backbone.out_channels();

        SpoofClassifier {
            backbone,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dense: LinearConfig::new(features, self.dense_units).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(self.dense_units, self.num_classes).init(device),
            num_classes: self.num_classes,
            trainable_backbone: self.trainable_backbone,
        }
    }
}

#[derive(Module, Debug)]
pub struct SpoofClassifier<B: Backend> {
    pub backbone: MobileNetV3Small<B>,
    pub pool: AdaptiveAvgPool2d,
    pub dense: Linear<B>,
    pub relu: Relu,
    pub dropout: Dropout,
    pub output: Linear<B>,
    num_classes: usize,
    trainable_backbone: bool,
}

impl<B: Backend> SpoofClassifier<B> {
    /// `[batch, 3, H, W]` pixels in `[0, 255]` -> `[batch, num_classes]` logits
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        self.forward_head(features)
    }

    /// Class probabilities
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    /// Pool backbone features and run the dense head
    pub fn forward_head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(features);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.relu.forward(self.dense.forward(x));
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn is_backbone_trainable(&self) -> bool {
        self.trainable_backbone
    }

    /// Number of parameters in the dense head
    pub fn head_params(&self) -> usize {
        self.dense.num_params() + self.output.num_params()
    }
}

impl<B: AutodiffBackend> SpoofClassifier<B> {
    /// Training-mode forward pass.
    ///
    /// A frozen backbone runs on the inner backend, so its batch norms use
    /// their running statistics and no graph is recorded for it. Only the
    /// head sees dropout and receives gradients.
    pub fn forward_train(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = if self.trainable_backbone {
            self.backbone.forward(x)
        } else {
            let frozen = self.backbone.valid();
            Tensor::from_inner(frozen.forward(x.inner()))
        };
        self.forward_head(features)
    }
}

/// Build the classifier, loading pretrained backbone weights when configured
pub fn build_model<B: Backend>(
    config: &ModelConfig,
    device: &B::Device,
) -> crate::utils::error::Result<SpoofClassifier<B>> {
    let backbone = MobileNetV3SmallConfig::new().init(device);
    let backbone = match &config.pretrained_weights {
        Some(path) => backbone.load_pretrained(path, device)?,
        None => {
            warn!("No pretrained backbone weights configured, using random initialisation");
            backbone
        }
    };

    let model = config.classifier_config().init_with_backbone(backbone, device);
    info!(
        "Built classifier: {} parameters ({} in head), backbone {}",
        model.num_params(),
        model.head_params(),
        if model.is_backbone_trainable() { "trainable" } else { "frozen" }
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = SpoofClassifierConfig::new(2).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);

        assert_eq!(model.forward(input).dims(), [2, 2]);
        assert_eq!(model.num_classes(), 2);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = SpoofClassifierConfig::new(2).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::ones([3, 3, 32, 32], &device).mul_scalar(100.0);

        let probs = model.forward_softmax(input).into_data().to_vec::<f32>().unwrap();
        for row in probs.chunks(2) {
            assert!((row[0] + row[1] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_head_parameter_count() {
        let device = Default::default();
        let model = SpoofClassifierConfig::new(2).init::<TestBackend>(&device);
        assert_eq!(model.head_params(), 576 * 512 + 512 + 512 * 2 + 2);
    }

    #[test]
    fn test_frozen_backbone_gets_no_gradients() {
        let device = Default::default();
        let model = SpoofClassifierConfig::new(2).init::<TestAutodiffBackend>(&device);
        let input = Tensor::<TestAutodiffBackend, 4>::ones([1, 3, 32, 32], &device);

        let loss = model.forward_train(input).sum();
        let grads = loss.backward();

        assert!(model.output.weight.grad(&grads).is_some());
        assert!(model.backbone.head.conv.weight.grad(&grads).is_none());
    }

    #[test]
    fn test_trainable_backbone_gets_gradients() {
        let device = Default::default();
        let model = SpoofClassifierConfig::new(2)
            .with_trainable_backbone(true)
            .init::<TestAutodiffBackend>(&device);
        let input = Tensor::<TestAutodiffBackend, 4>::ones([2, 3, 32, 32], &device);

        let loss = model.forward_train(input).sum();
        let grads = loss.backward();

        assert!(model.backbone.head.conv.weight.grad(&grads).is_some());
    }

    #[test]
    fn test_build_without_pretrained_weights() {
        let device = Default::default();
        let config = ModelConfig {
            pretrained_weights: None,
            ..Default::default()
        };
        let model = build_model::<TestBackend>(&config, &device).unwrap();
        assert!(!model.is_backbone_trainable());
    }
}
