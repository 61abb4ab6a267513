use crate::{
    error::ExportError,
    trace::{Traceable, TracedTensor, Tracer},
};
use burn::{
    nn::{
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

/// Channels expected by the first convolution.
pub const INPUT_CHANNELS: usize = 3;

/// Spatial size of the pooled feature map fed to the classifier.
const POOLED_SIZE: usize = 6;

/// AlexNet with the layer layout of torchvision's `alexnet`.
#[derive(Module, Debug)]
pub struct AlexNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    conv5: Conv2d<B>,
    pool: MaxPool2d,
    avgpool: AdaptiveAvgPool2d,
    dropout: Dropout,
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct AlexNetConfig {
    #[config(default = 1000)]
    pub num_classes: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl AlexNetConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AlexNet<B> {
        let conv = |channels: [usize; 2], kernel: usize, stride: usize, padding: usize| {
            Conv2dConfig::new(channels, [kernel, kernel])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .init::<B>(device)
        };
        let features = 256 * POOLED_SIZE * POOLED_SIZE;

        AlexNet {
            conv1: conv([INPUT_CHANNELS, 64], 11, 4, 2),
            conv2: conv([64, 192], 5, 1, 2),
            conv3: conv([192, 384], 3, 1, 1),
            conv4: conv([384, 256], 3, 1, 1),
            conv5: conv([256, 256], 3, 1, 1),
            pool: MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
            avgpool: AdaptiveAvgPool2dConfig::new([POOLED_SIZE, POOLED_SIZE]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc1: LinearConfig::new(features, 4096).init(device),
            fc2: LinearConfig::new(4096, 4096).init(device),
            fc3: LinearConfig::new(4096, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> AlexNet<B> {
    /// # Shapes
    ///   - Images [batch_size, 3, height, width]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.conv1.forward(images));
        let x = self.pool.forward(x);
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);
        let x = self.activation.forward(self.conv3.forward(x));
        let x = self.activation.forward(self.conv4.forward(x));
        let x = self.activation.forward(self.conv5.forward(x));
        let x = self.pool.forward(x);

        let x = self.avgpool.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.dropout.forward(x);
        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        let x = self.activation.forward(self.fc2.forward(x));

        self.fc3.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.fc3.weight.val().dims()[1]
    }
}

impl<B: Backend> Traceable for AlexNet<B> {
    fn trace(
        &self,
        tracer: &mut Tracer,
        images: TracedTensor,
    ) -> Result<TracedTensor, ExportError> {
        let x = self.conv1.trace(tracer, images)?;
        let x = self.activation.trace(tracer, x)?;
        let x = self.pool.trace(tracer, x)?;
        let x = self.conv2.trace(tracer, x)?;
        let x = self.activation.trace(tracer, x)?;
        let x = self.pool.trace(tracer, x)?;
        let x = self.conv3.trace(tracer, x)?;
        let x = self.activation.trace(tracer, x)?;
        let x = self.conv4.trace(tracer, x)?;
        let x = self.activation.trace(tracer, x)?;
        let x = self.conv5.trace(tracer, x)?;
        let x = self.activation.trace(tracer, x)?;
        let x = self.pool.trace(tracer, x)?;

        let x = self.avgpool.trace(tracer, x)?;
        let x = tracer.flatten(x, 1, 3)?;

        let x = self.dropout.trace(tracer, x)?;
        let x = self.fc1.trace(tracer, x)?;
        let x = self.activation.trace(tracer, x)?;
        let x = self.dropout.trace(tracer, x)?;
        let x = self.fc2.trace(tracer, x)?;
        let x = self.activation.trace(tracer, x)?;

        self.fc3.trace(tracer, x)
    }
}
