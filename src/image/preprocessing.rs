use crate::Result;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array4, ArrayView4};

/// VGG16 (caffe 模式) 的 ImageNet 通道均值，按 BGR 顺序
pub const VGG16_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// 训练时使用的缩放滤波器
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// 模型输入张量，形状固定为 (1, H, W, 3)，BGR 通道、减均值
///
/// 创建后不可修改，只提供只读视图。
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor {
    /// 全零张量，用于模型预热
    pub fn zeros(height: usize, width: usize) -> Self {
        Self(Array4::zeros((1, height, width, 3)))
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }
}

/// 训练一致的预处理流水线
///
/// 步骤顺序固定：解码 → RGB → 缩放(不裁剪) → f32 + batch 维 → BGR + 减均值。
/// 无内部状态，可并发调用。
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    width: u32,
    height: u32,
}

impl ImagePreprocessor {
    pub fn new(input_size: u32) -> Self {
        Self {
            width: input_size,
            height: input_size,
        }
    }

    pub fn input_shape(&self) -> (usize, usize) {
        (self.height as usize, self.width as usize)
    }

    pub fn preprocess(&self, image_bytes: &[u8]) -> Result<ImageTensor> {
        // 1. 解码
        let image = image::load_from_memory(image_bytes)?;

        // 2. 统一为3通道RGB（丢弃alpha，灰度扩展）
        let rgb = image.to_rgb8();

        // 3. 直接缩放到目标尺寸
        let resized = image::imageops::resize(&rgb, self.width, self.height, RESIZE_FILTER);

        // 4. 转为 f32 并加 batch 维  5. BGR + 减均值
        Ok(Self::to_caffe_tensor(&resized))
    }

    /// RGB u8 图像 → (1, H, W, 3) f32，通道翻转为 BGR 并减去 ImageNet 均值（不做缩放）
    fn to_caffe_tensor(rgb: &RgbImage) -> ImageTensor {
        let (width, height) = rgb.dimensions();
        let mut array = Array4::<f32>::zeros((1, height as usize, width as usize, 3));

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let (h, w) = (y as usize, x as usize);
            array[[0, h, w, 0]] = b as f32 - VGG16_MEAN_BGR[0];
            array[[0, h, w, 1]] = g as f32 - VGG16_MEAN_BGR[1];
            array[[0, h, w, 2]] = r as f32 - VGG16_MEAN_BGR[2];
        }

        ImageTensor(array)
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_INPUT_SIZE)
    }
}
