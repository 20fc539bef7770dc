//! # 校验模块
//!
//! ## 设计思路
//!
//! 在“尽可能早”的阶段拒绝非法输入：先看声明类型与字节签名，再看体积，
//! 最后才通过图片头读取尺寸（不做完整解码）。目标是尽快失败，
//! 减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - 类型：声明 MIME 必须在白名单内，且 magic bytes 签名必须是图片
//!   且与白名单匹配（防止改扩展名绕过）。
//! - 体积：`max_size_mb * 1024 * 1024` 的硬上限。
//! - 尺寸：仅读取图片头的宽高，按 min 宽 → min 高 → max 宽 → max 高
//!   的顺序检查，首个失败即返回。
//! - `run_all` 按类型 → 体积 → 尺寸顺序执行，首个失败即中止。

use std::io::Cursor;

use crate::asset::SourceAsset;
use crate::config::UploadConfig;
use crate::error::PrepError;

/// 允许的栅格格式白名单。
const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// 校验声明类型与字节签名是否都是受支持的栅格格式。
pub fn validate_type(asset: &SourceAsset) -> Result<(), PrepError> {
    if !ALLOWED_MIME_TYPES.contains(&asset.declared_mime.as_str()) {
        return Err(PrepError::UnsupportedType(format!(
            "仅支持 JPEG、PNG、GIF、WebP（声明类型：{}）",
            asset.declared_mime
        )));
    }

    if asset.bytes.is_empty() {
        return Err(PrepError::UnsupportedType("图片内容为空".to_string()));
    }

    let kind = infer::get(&asset.bytes)
        .ok_or_else(|| PrepError::UnsupportedType("无法识别文件签名".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(PrepError::UnsupportedType(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    if !ALLOWED_MIME_TYPES.contains(&kind.mime_type()) {
        return Err(PrepError::UnsupportedType(format!(
            "文件签名格式不在白名单内：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

/// 校验字节体积是否超过上限。
pub fn validate_size(asset: &SourceAsset, max_size_mb: u32) -> Result<(), PrepError> {
    let max_bytes = max_size_mb as u64 * 1024 * 1024;
    if asset.byte_size > max_bytes {
        return Err(PrepError::TooLarge(format!(
            "{:.2} MB（限制：{} MB）",
            asset.byte_size as f64 / 1024.0 / 1024.0,
            max_size_mb
        )));
    }
    Ok(())
}

/// 仅通过图片头读取宽高并检查尺寸约束。
///
/// 四项约束均为可选；检查顺序固定为 min 宽 → min 高 → max 宽 → max 高，
/// 首个失败即返回，错误消息带上当前值便于宿主展示。
pub fn validate_dimensions(asset: &SourceAsset, config: &UploadConfig) -> Result<(), PrepError> {
    if config.min_width.is_none()
        && config.min_height.is_none()
        && config.max_source_width.is_none()
        && config.max_source_height.is_none()
    {
        return Ok(());
    }

    let (width, height) = probe_dimensions(&asset.bytes)?;

    if let Some(min_width) = config.min_width {
        if width < min_width {
            return Err(PrepError::DimensionOutOfRange(format!(
                "宽度至少需要 {}px（当前：{}px）",
                min_width, width
            )));
        }
    }
    if let Some(min_height) = config.min_height {
        if height < min_height {
            return Err(PrepError::DimensionOutOfRange(format!(
                "高度至少需要 {}px（当前：{}px）",
                min_height, height
            )));
        }
    }
    if let Some(max_width) = config.max_source_width {
        if width > max_width {
            return Err(PrepError::DimensionOutOfRange(format!(
                "宽度最多允许 {}px（当前：{}px）",
                max_width, width
            )));
        }
    }
    if let Some(max_height) = config.max_source_height {
        if height > max_height {
            return Err(PrepError::DimensionOutOfRange(format!(
                "高度最多允许 {}px（当前：{}px）",
                max_height, height
            )));
        }
    }

    Ok(())
}

/// 仅通过内存中的图片头信息读取宽高，不做完整解码。
pub(crate) fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), PrepError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PrepError::UnsupportedType(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| PrepError::DimensionOutOfRange(format!("无法读取图片尺寸：{}", e)))
}

/// 按类型 → 体积 → 尺寸顺序执行全部校验，首个失败即中止。
pub fn run_all(asset: &SourceAsset, config: &UploadConfig) -> Result<(), PrepError> {
    validate_type(asset)?;
    validate_size(asset, config.max_size_mb)?;
    validate_dimensions(asset, config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};

    fn png_asset(width: u32, height: u32) -> SourceAsset {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        SourceAsset::from_bytes(cursor.into_inner(), "image/png", "test.png")
    }

    #[test]
    fn valid_png_passes_all_checks() {
        let mut config = UploadConfig::default();
        config.min_width = Some(8);
        config.min_height = Some(8);
        config.max_source_width = Some(4096);
        config.max_source_height = Some(4096);

        let asset = png_asset(64, 32);
        run_all(&asset, &config).expect("valid asset should pass");
    }

    #[test]
    fn declared_mime_outside_allow_list_is_rejected() {
        let mut asset = png_asset(16, 16);
        asset.declared_mime = "image/tiff".to_string();

        assert!(matches!(validate_type(&asset), Err(PrepError::UnsupportedType(_))));
    }

    #[test]
    fn renamed_non_image_bytes_are_rejected_by_signature() {
        let asset = SourceAsset::from_bytes(b"%PDF-1.4 not an image".to_vec(), "image/png", "fake.png");
        assert!(matches!(validate_type(&asset), Err(PrepError::UnsupportedType(_))));
    }

    #[test]
    fn oversized_asset_is_rejected() {
        let mut asset = png_asset(16, 16);
        asset.byte_size = 11 * 1024 * 1024;

        assert!(matches!(validate_size(&asset, 10), Err(PrepError::TooLarge(_))));
    }

    #[test]
    fn small_image_fails_min_width() {
        let mut config = UploadConfig::default();
        config.min_width = Some(800);

        let asset = png_asset(300, 200);
        let result = validate_dimensions(&asset, &config);
        assert!(matches!(result, Err(PrepError::DimensionOutOfRange(_))));
    }

    #[test]
    fn source_larger_than_output_cap_passes_validation() {
        // 默认配置不限制原图上限，超大原图交给流水线等比缩放
        let config = UploadConfig::default();
        let asset = png_asset(2100, 1200);
        validate_dimensions(&asset, &config).expect("oversized source should pass validation");
    }

    #[test]
    fn source_above_explicit_source_cap_is_rejected() {
        let mut config = UploadConfig::default();
        config.max_source_width = Some(1024);

        let asset = png_asset(1200, 500);
        let result = validate_dimensions(&asset, &config);
        assert!(matches!(result, Err(PrepError::DimensionOutOfRange(_))));
    }

    #[test]
    fn dimension_check_skipped_when_unconstrained() {
        let mut config = UploadConfig::default();
        config.min_width = None;
        config.min_height = None;
        config.max_source_width = None;
        config.max_source_height = None;

        let asset = SourceAsset::from_bytes(vec![0u8; 4], "image/png", "broken.png");
        validate_dimensions(&asset, &config).expect("unconstrained check should not decode");
    }
}
