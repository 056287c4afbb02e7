//! ResNet Architecture for Fracture Classification
//!
//! ResNet-18 (basic blocks) and ResNet-50 (bottleneck blocks) in Burn,
//! laid out like the torchvision reference so pretrained ImageNet weights map
//! onto the same parameter names (`conv1`, `bn1`, `layer1`..`layer4`, `fc`).

use std::fmt;
use std::str::FromStr;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

/// Supported ResNet depths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResNetArch {
    ResNet18,
    ResNet50,
}

impl ResNetArch {
    /// Number of blocks in each of the four stages
    pub fn stage_depths(&self) -> [usize; 4] {
        match self {
            ResNetArch::ResNet18 => [2, 2, 2, 2],
            ResNetArch::ResNet50 => [3, 4, 6, 3],
        }
    }

    /// Architecture with the given stage depths, if any
    pub fn from_stage_depths(depths: [usize; 4]) -> Option<Self> {
        [ResNetArch::ResNet18, ResNetArch::ResNet50]
            .into_iter()
            .find(|arch| arch.stage_depths() == depths)
    }

    /// Channel expansion of the last convolution in a block
    pub fn expansion(&self) -> usize {
        match self {
            ResNetArch::ResNet18 => 1,
            ResNetArch::ResNet50 => 4,
        }
    }

    /// Width of the pooled feature vector fed to the head
    pub fn feature_dim(&self) -> usize {
        512 * self.expansion()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResNetArch::ResNet18 => "resnet18",
            ResNetArch::ResNet50 => "resnet50",
        }
    }
}

impl fmt::Display for ResNetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResNetArch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "resnet18" => Ok(ResNetArch::ResNet18),
            "resnet50" => Ok(ResNetArch::ResNet50),
            other => Err(format!(
                "unknown architecture '{}', expected resnet18 or resnet50",
                other
            )),
        }
    }
}

/// Configuration for the ResNet classifier
#[derive(Config, Debug)]
pub struct ResNetConfig {
    pub arch: ResNetArch,

    /// Number of output classes (ImageNet backbones have 1000)
    #[config(default = "2")]
    pub num_classes: usize,
}

impl ResNetConfig {
    /// Initialize a network with random weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        ResNet::new(self, device)
    }
}

fn conv<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .init(device)
}

/// 1x1 projection on the residual path when shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv([in_channels, out_channels], 1, stride, 0, device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Residual block
///
/// A basic block has two 3x3 convolutions and no `conv3`. A bottleneck block
/// is 1x1 -> 3x3 (strided) -> 1x1 with the channel expansion on `conv3`.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B>,
    pub conv3: Option<Conv2d<B>>,
    pub bn3: Option<BatchNorm<B>>,
    pub downsample: Option<Downsample<B>>,
    pub relu: Relu,
}

impl<B: Backend> ResidualBlock<B> {
    fn basic(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != planes)
            .then(|| Downsample::new(in_channels, planes, stride, device));

        Self {
            conv1: conv([in_channels, planes], 3, stride, 1, device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv([planes, planes], 3, 1, 1, device),
            bn2: BatchNormConfig::new(planes).init(device),
            conv3: None,
            bn3: None,
            downsample,
            relu: Relu::new(),
        }
    }

    fn bottleneck(
        in_channels: usize,
        planes: usize,
        stride: usize,
        expansion: usize,
        device: &B::Device,
    ) -> Self {
        let out_channels = planes * expansion;
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: conv([in_channels, planes], 1, 1, 0, device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv([planes, planes], 3, stride, 1, device),
            bn2: BatchNormConfig::new(planes).init(device),
            conv3: Some(conv([planes, out_channels], 1, 1, 0, device)),
            bn3: Some(BatchNormConfig::new(out_channels).init(device)),
            downsample,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(input)));
        let mut x = self.bn2.forward(self.conv2.forward(x));

        if let (Some(conv3), Some(bn3)) = (&self.conv3, &self.bn3) {
            x = bn3.forward(conv3.forward(self.relu.forward(x)));
        }

        self.relu.forward(x + identity)
    }
}

/// ResNet image classifier
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub relu: Relu,
    pub maxpool: MaxPool2d,
    pub layer1: Vec<ResidualBlock<B>>,
    pub layer2: Vec<ResidualBlock<B>>,
    pub layer3: Vec<ResidualBlock<B>>,
    pub layer4: Vec<ResidualBlock<B>>,
    pub avgpool: AdaptiveAvgPool2d,
    pub fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// Create a new ResNet from configuration
    pub fn new(config: &ResNetConfig, device: &B::Device) -> Self {
        let arch = config.arch;
        let expansion = arch.expansion();
        let mut in_channels = 64;

        let mut make_stage = |planes: usize, blocks: usize, stride: usize| {
            let mut stage = Vec::with_capacity(blocks);
            for i in 0..blocks {
                let stride = if i == 0 { stride } else { 1 };
                let block = match arch {
                    ResNetArch::ResNet18 => ResidualBlock::basic(in_channels, planes, stride, device),
                    ResNetArch::ResNet50 => {
                        ResidualBlock::bottleneck(in_channels, planes, stride, expansion, device)
                    }
                };
                in_channels = planes * expansion;
                stage.push(block);
            }
            stage
        };

        let [d1, d2, d3, d4] = arch.stage_depths();
        let layer1 = make_stage(64, d1, 1);
        let layer2 = make_stage(128, d2, 2);
        let layer3 = make_stage(256, d3, 2);
        let layer4 = make_stage(512, d4, 2);

        Self {
            conv1: conv([3, 64], 7, 2, 3, device),
            bn1: BatchNormConfig::new(64).init(device),
            relu: Relu::new(),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(arch.feature_dim(), config.num_classes).init(device),
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.relu.forward(self.bn1.forward(x));
        let mut x = self.maxpool.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }

        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        self.fc.forward(x.reshape([batch_size, channels]))
    }

    /// Forward pass with softmax over classes
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Number of output classes of the head
    pub fn stage_depths(&self) -> [usize; 4] {
        [
            self.layer1.len(),
            self.layer2.len(),
            self.layer3.len(),
            self.layer4.len(),
        ]
    }

    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Swap the final linear layer for a freshly initialised one
    pub fn replace_head(mut self, num_classes: usize, device: &B::Device) -> Self {
        let in_features = self.fc.weight.dims()[0];
        self.fc = LinearConfig::new(in_features, num_classes).init(device);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_arch_parsing() {
        assert_eq!("resnet50".parse::<ResNetArch>(), Ok(ResNetArch::ResNet50));
        assert_eq!("ResNet-18".parse::<ResNetArch>(), Ok(ResNetArch::ResNet18));
        assert!("vgg16".parse::<ResNetArch>().is_err());
        assert_eq!(ResNetArch::ResNet18.to_string(), "resnet18");
        assert_eq!(
            ResNetArch::from_stage_depths([3, 4, 6, 3]),
            Some(ResNetArch::ResNet50)
        );
        assert_eq!(ResNetArch::from_stage_depths([1, 1, 1, 1]), None);
    }

    #[test]
    fn test_resnet18_forward_shape() {
        let device = Default::default();
        let model = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);
        assert_eq!(model.layer3.len(), 2);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 2]);
    }

    #[test]
    fn test_resnet50_layout() {
        let device = Default::default();
        let model = ResNetConfig::new(ResNetArch::ResNet50)
            .with_num_classes(1000)
            .init::<TestBackend>(&device);
        assert_eq!(model.layer3.len(), 6);
        assert!(model.layer1[0].conv3.is_some());
        assert!(model.layer1[0].downsample.is_some());
        assert!(model.layer1[1].downsample.is_none());
        assert_eq!(model.fc.weight.dims(), [2048, 1000]);
    }

    #[test]
    fn test_replace_head() {
        let device = Default::default();
        let model = ResNetConfig::new(ResNetArch::ResNet18)
            .with_num_classes(1000)
            .init::<TestBackend>(&device)
            .replace_head(2, &device);
        assert_eq!(model.num_classes(), 2);

        let probs = model.forward_softmax(Tensor::zeros([1, 3, 32, 32], &device));
        let sum: f32 = probs.sum().into_scalar();
        assert!((sum - 1.0).abs() < 1e-4);
    }
}
