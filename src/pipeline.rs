//! # 压缩编码流水线模块
//!
//! ## 设计思路
//!
//! 接收裁剪阶段的无损中间图，产出最终交付宿主的编码产物。
//! 四个检查点（进入 / 解码后 / 缩放计划后 / 重采样后 / 编码后）上报
//! 粗粒度进度，并在每个检查点协作式检查取消标志——一旦触发，
//! 立即返回 `Aborted`，不再做任何后续工作。
//!
//! ## 实现思路
//!
//! 1. 解码中间图（失败归为 `EncodingFailed`）
//! 2. 计算等比缩放计划：`scale = min(max_w/w, max_h/h, 1)`，
//!    相对上限超出更多的那一维恰好贴到上限，绝不放大
//! 3. `fast_image_resize` 重采样，失败回退 `image::resize_exact`
//! 4. 按目标格式编码：转换开启时统一输出 WebP（`image` 的无损编码器），
//!    否则保留原格式——JPEG 按质量因子有损编码，PNG/GIF 无损重编码

use std::io::Cursor;

use fast_image_resize as fr;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba, imageops::FilterType};

use crate::asset::{CropBuffer, ProcessedAsset};
use crate::config::UploadConfig;
use crate::error::PrepError;

/// 流水线进度检查点（百分比）。
const PROGRESS_ENTER: u8 = 10;
const PROGRESS_DECODED: u8 = 30;
const PROGRESS_PLANNED: u8 = 50;
const PROGRESS_RESAMPLED: u8 = 70;
const PROGRESS_ENCODED: u8 = 100;

/// 执行压缩编码：等比缩放 + 质量控制重编码 + 可选格式转换。
///
/// `source_mime` 为原始资产的声明类型，在不转换格式时决定输出编码；
/// `source_file_name` 用于产物命名（转换时重写扩展名）。
pub fn process<P, C>(
    crop: &CropBuffer,
    source_mime: &str,
    source_file_name: &str,
    config: &UploadConfig,
    on_progress: P,
    is_cancelled: C,
) -> Result<ProcessedAsset, PrepError>
where
    P: Fn(u8),
    C: Fn() -> bool,
{
    let checkpoint = |progress: u8| -> Result<(), PrepError> {
        if is_cancelled() {
            return Err(PrepError::Aborted);
        }
        on_progress(progress);
        Ok(())
    };

    checkpoint(PROGRESS_ENTER)?;

    let decoded = image::load_from_memory(&crop.bytes)
        .map_err(|e| PrepError::EncodingFailed(format!("中间图解码失败：{}", e)))?;
    checkpoint(PROGRESS_DECODED)?;

    let (width, height) = (decoded.width(), decoded.height());
    let plan = plan_resize(width, height, config.max_width, config.max_height);
    checkpoint(PROGRESS_PLANNED)?;

    let resized = match plan {
        Some((target_width, target_height)) => {
            log::info!(
                "🧩 等比缩放：{}x{} -> {}x{}（filter={:?}）",
                width, height, target_width, target_height, config.resize_filter
            );
            match resize_with_fast_image_resize(&decoded, target_width, target_height, config.resize_filter) {
                Ok(resized) => resized,
                Err(err) => {
                    log::warn!("⚠️ fast_image_resize 失败，回退 image::resize_exact：{}", err);
                    decoded.resize_exact(target_width, target_height, config.resize_filter)
                }
            }
        }
        None => decoded,
    };
    checkpoint(PROGRESS_RESAMPLED)?;

    let (mime_type, bytes) = encode_output(&resized, source_mime, config)?;
    checkpoint(PROGRESS_ENCODED)?;

    let file_name = rewrite_extension(source_file_name, &mime_type);
    let byte_size = bytes.len() as u64;

    log::info!(
        "✅ 压缩编码完成 - {}x{} -> {}x{} 输出 {}（{:.2} KB）",
        width, height, resized.width(), resized.height(), mime_type,
        byte_size as f64 / 1024.0
    );

    Ok(ProcessedAsset { bytes, mime_type, byte_size, file_name })
}

/// 计算等比缩放计划；任一维未超限或未配置上限时返回 `None`（不缩放）。
///
/// 缩放因子取两轴限制中更严格的一个，保证两维都不超限且绝不放大。
pub(crate) fn plan_resize(
    width: u32,
    height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> Option<(u32, u32)> {
    let width_scale = max_width
        .filter(|max| width > *max)
        .map(|max| max as f64 / width as f64);
    let height_scale = max_height
        .filter(|max| height > *max)
        .map(|max| max as f64 / height as f64);

    let scale = match (width_scale, height_scale) {
        (None, None) => return None,
        (Some(w), None) => w,
        (None, Some(h)) => h,
        (Some(w), Some(h)) => w.min(h),
    };

    let target_width = ((width as f64 * scale).round() as u32).max(1);
    let target_height = ((height as f64 * scale).round() as u32).max(1);
    Some((target_width, target_height))
}

/// 基于 `fast_image_resize` 的高质量重采样。
fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<DynamicImage, PrepError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image =
        fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
            .map_err(|e| PrepError::EncodingFailed(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| PrepError::EncodingFailed(format!("fast_image_resize 执行失败：{}", e)))?;

    let rgba =
        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
            .ok_or_else(|| {
                PrepError::EncodingFailed("fast_image_resize 输出缓冲长度异常".to_string())
            })?;

    Ok(DynamicImage::ImageRgba8(rgba))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

/// 按目标格式编码，返回 `(mime, bytes)`。
///
/// WebP 走 `image` 的无损编码器（质量因子对 WebP 不生效）；
/// JPEG 将 `(0, 1]` 质量因子映射到 1~100。
fn encode_output(
    image: &DynamicImage,
    source_mime: &str,
    config: &UploadConfig,
) -> Result<(String, Vec<u8>), PrepError> {
    let target_mime = if config.convert_to_webp { "image/webp" } else { source_mime };
    let mut cursor = Cursor::new(Vec::new());

    match target_mime {
        "image/webp" => {
            let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut cursor);
            image
                .to_rgba8()
                .write_with_encoder(encoder)
                .map_err(|e| PrepError::EncodingFailed(format!("WebP 编码失败：{}", e)))?;
        }
        "image/jpeg" => {
            let quality = (config.quality * 100.0).round().clamp(1.0, 100.0) as u8;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
            // JPEG 不支持透明通道
            image
                .to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| PrepError::EncodingFailed(format!("JPEG 编码失败：{}", e)))?;
        }
        "image/gif" => {
            image
                .write_to(&mut cursor, ImageFormat::Gif)
                .map_err(|e| PrepError::EncodingFailed(format!("GIF 编码失败：{}", e)))?;
        }
        "image/png" => {
            image
                .write_to(&mut cursor, ImageFormat::Png)
                .map_err(|e| PrepError::EncodingFailed(format!("PNG 编码失败：{}", e)))?;
        }
        other => {
            return Err(PrepError::EncodingFailed(format!("不支持的输出格式：{}", other)));
        }
    }

    Ok((target_mime.to_string(), cursor.into_inner()))
}

/// 按输出 MIME 重写文件扩展名。
fn rewrite_extension(file_name: &str, mime_type: &str) -> String {
    let extension = match mime_type {
        "image/webp" => "webp",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        _ => "png",
    };
    match file_name.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => format!("{}.{}", base, extension),
        _ => format!("{}.{}", file_name, extension),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract;
    use crate::decoder::decode_bitmap;
    use crate::geometry::{CropRegion, MeasuredLayout, ViewportTransform};
    use std::sync::atomic::{AtomicU8, Ordering};

    fn crop_buffer(width: u32, height: u32) -> CropBuffer {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 31, 255])
        });
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        CropBuffer { width, height, bytes: cursor.into_inner() }
    }

    #[test]
    fn plan_resize_hits_the_tighter_axis_cap() {
        assert_eq!(plan_resize(4000, 2000, Some(1920), Some(1080)), Some((1920, 960)));
        assert_eq!(plan_resize(2000, 1900, Some(1920), Some(1080)), Some((1137, 1080)));
    }

    #[test]
    fn plan_resize_never_upscales() {
        assert_eq!(plan_resize(800, 600, Some(1920), Some(1080)), None);
        assert_eq!(plan_resize(800, 600, None, None), None);
    }

    #[test]
    fn process_downscales_and_converts_to_webp() {
        let crop = crop_buffer(2400, 1200);
        let config = UploadConfig::default();

        let asset = process(&crop, "image/png", "cover.png", &config, |_| {}, || false)
            .expect("process should succeed");

        assert_eq!(asset.mime_type, "image/webp");
        assert_eq!(asset.file_name, "cover.webp");
        assert_eq!(asset.byte_size, asset.bytes.len() as u64);

        let decoded = image::load_from_memory(&asset.bytes).expect("webp should decode");
        assert_eq!(decoded.width(), 1920);
        assert_eq!(decoded.height(), 960);
    }

    #[test]
    fn process_keeps_source_format_when_conversion_disabled() {
        let crop = crop_buffer(320, 200);
        let mut config = UploadConfig::default();
        config.convert_to_webp = false;

        let asset = process(&crop, "image/jpeg", "photo.jpeg", &config, |_| {}, || false)
            .expect("process should succeed");

        assert_eq!(asset.mime_type, "image/jpeg");
        assert_eq!(asset.file_name, "photo.jpg");
        let decoded = image::load_from_memory(&asset.bytes).expect("jpeg should decode");
        assert_eq!(decoded.width(), 320);
    }

    #[test]
    fn process_reports_monotonic_checkpoints() {
        let crop = crop_buffer(64, 64);
        let config = UploadConfig::default();
        let last = AtomicU8::new(0);

        process(
            &crop,
            "image/png",
            "cover.png",
            &config,
            |progress| {
                let prev = last.swap(progress, Ordering::SeqCst);
                assert!(progress >= prev, "progress went backwards: {} -> {}", prev, progress);
            },
            || false,
        )
        .expect("process should succeed");

        assert_eq!(last.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn cancellation_at_first_checkpoint_stops_all_work() {
        let crop = crop_buffer(64, 64);
        let config = UploadConfig::default();
        let progressed = AtomicU8::new(0);

        let result = process(
            &crop,
            "image/png",
            "cover.png",
            &config,
            |p| progressed.store(p, Ordering::SeqCst),
            || true,
        );

        assert!(matches!(result, Err(PrepError::Aborted)));
        assert_eq!(progressed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn identical_inputs_yield_identical_pixels() {
        let crop = crop_buffer(300, 150);
        let mut config = UploadConfig::default();
        config.convert_to_webp = false;
        config.quality = 0.85;

        let first = process(&crop, "image/png", "a.png", &config, |_| {}, || false)
            .expect("first run should succeed");
        let second = process(&crop, "image/png", "a.png", &config, |_| {}, || false)
            .expect("second run should succeed");

        let first_px = image::load_from_memory(&first.bytes).expect("decode").to_rgba8();
        let second_px = image::load_from_memory(&second.bytes).expect("decode").to_rgba8();
        assert_eq!(first_px.as_raw(), second_px.as_raw());
    }

    #[test]
    fn extract_then_process_matches_display_resolution() {
        let bitmap = {
            let img = ImageBuffer::from_fn(4000, 2000, |x, y| {
                Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
            });
            let mut cursor = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(img)
                .write_to(&mut cursor, ImageFormat::Png)
                .expect("encode");
            decode_bitmap(&cursor.into_inner()).expect("decode")
        };

        let layout =
            MeasuredLayout::derive(4000, 2000, &ViewportTransform::default(), 4000.0, 2000.0);
        let region = CropRegion { x: 0.0, y: 0.0, width: 100.0, height: 100.0 };
        let crop = extract(Some(&bitmap), &region, &layout, FilterType::Triangle).expect("extract");

        let config = UploadConfig::default();
        let asset =
            process(&crop, "image/jpeg", "big.jpg", &config, |_| {}, || false).expect("process");

        let decoded = image::load_from_memory(&asset.bytes).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (1920, 960));
    }
}
