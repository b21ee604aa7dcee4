//! Frame to input tensor conversion.

use image::{DynamicImage, RgbImage, imageops::FilterType};
use tract_onnx::prelude::*;

use recyclo_core::{model::Frame, ports::InferenceError};

/// Centre-crop `frame` to a square, resize it to `size`, and scale pixels to `[-1, 1]`.
///
/// The tensor is laid out NHWC as `[1, size, size, 3]`.
pub(crate) fn frame_to_tensor(frame: &Frame, size: u32) -> Result<Tensor, InferenceError> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone()).ok_or_else(
        || {
            InferenceError::InvalidFrame(format!(
                "{} bytes do not fill {}x{} RGB",
                frame.rgb.len(),
                frame.width,
                frame.height
            ))
        },
    )?;
    let image = DynamicImage::ImageRgb8(image);

    let side = frame.width.min(frame.height);
    let crop_x = (frame.width - side) / 2;
    let crop_y = (frame.height - side) / 2;
    let square = image
        .crop_imm(crop_x, crop_y, side, side)
        .resize_exact(size, size, FilterType::Triangle);

    let data: Vec<f32> = square
        .to_rgb8()
        .into_raw()
        .into_iter()
        .map(|channel| f32::from(channel) / 127.5 - 1.0)
        .collect();

    let edge = usize::try_from(size)
        .map_err(|err| InferenceError::Backend(format!("input size {size}: {err}")))?;
    Tensor::from_shape(&[1, edge, edge, 3], &data)
        .map_err(|err| InferenceError::Backend(format!("{err:#}")))
}
