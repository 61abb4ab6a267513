use crate::error::ClassifyError;
use burn::{prelude::*, tensor::Shape};
use image::{
    RgbImage,
    imageops::{self, FilterType},
};
use std::path::Path;

/// Side of the square images AlexNet is trained on.
pub const IMAGE_SIZE: u32 = 224;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode `path` as RGB and turn it into a normalized `[1, 3, 224, 224]` batch.
pub fn load_image<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<Tensor<B, 4>, ClassifyError> {
    let image = image::open(path)?.into_rgb8();
    log::debug!(
        "Decoded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );

    Ok(to_tensor(&resize(image), device))
}

/// Bilinear resize to `IMAGE_SIZE`, a no-op when the image already has that size.
pub fn resize(image: RgbImage) -> RgbImage {
    if image.dimensions() == (IMAGE_SIZE, IMAGE_SIZE) {
        return image;
    }

    imageops::resize(&image, IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle)
}

/// Scale to `[0, 1]`, normalize per channel and lay out as NCHW.
pub fn to_tensor<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = image.dimensions();
    let shape = Shape::new([height as usize, width as usize, 3]);

    let data = TensorData::new(image.as_raw().clone(), shape).convert::<B::FloatElem>();
    let pixels = Tensor::<B, 3>::from_data(data, device)
        .swap_dims(0, 1)
        .swap_dims(0, 2)
        .div_scalar(255.0);

    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, device).reshape([3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, device).reshape([3, 1, 1]);

    ((pixels - mean) / std).unsqueeze::<4>()
}
