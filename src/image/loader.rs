use crate::utils::error::ClassifierError;
use crate::Result;
use base64::Engine;
use image::ImageFormat;

/// 上传图像的字节级处理：大小限制、格式探测、base64 编解码
///
/// 真正的像素解码在预处理流水线中完成。
pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串加载图像字节
    pub fn from_base64(base64_data: &str, max_size: usize) -> Result<Vec<u8>> {
        // 检测并移除可能的数据URL前缀 (data:image/xxx;base64,)
        let base64_clean = match base64_data.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
            None => base64_data,
        };

        let image_bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?;

        Self::check_size(&image_bytes, max_size)?;
        Ok(image_bytes)
    }

    /// 检查文件大小
    pub fn check_size(bytes: &[u8], max_size: usize) -> Result<()> {
        if bytes.is_empty() {
            return Err(ClassifierError::InvalidInput("Empty image data".to_string()));
        }
        if bytes.len() > max_size {
            return Err(ClassifierError::FileTooLarge(bytes.len(), max_size));
        }
        Ok(())
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Gif
                | ImageFormat::Tiff
                | ImageFormat::WebP
        )
    }

    /// 生成浏览器预览用的 data URI，未知格式按 JPEG 处理
    pub fn to_data_uri(bytes: &[u8]) -> String {
        let mime = Self::detect_format(bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or("image/jpeg");
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        format!("data:{};base64,{}", mime, encoded)
    }
}
