//! # 裁剪提取模块
//!
//! ## 设计思路
//!
//! 把“屏幕上框住的那一块”精确还原成原图像素矩形，再渲染成一张
//! 独立的无损中间图。输出分辨率跟随裁剪框的**屏幕**像素尺寸，
//! 而不是固定分辨率——所见即所得。
//!
//! ## 实现思路
//!
//! 1. 校验实测布局（零尺寸视口直接拒绝）
//! 2. 裁剪框百分比 → 视口像素 → 位图局部像素 → 原图像素（逐对换算）
//! 3. 原图矩形夹取进位图范围，框出图的部分渲染为透明
//! 4. 采样区按显示比例重采样后合成到画布，PNG 无损编码返回

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage, imageops::FilterType};

use crate::asset::{CropBuffer, NaturalBitmap};
use crate::error::PrepError;
use crate::geometry::{
    CropRegion, MeasuredLayout,
    mapping::{crop_region_to_viewport_px, image_local_to_source_px, viewport_px_to_image_local},
};

/// 将当前裁剪框渲染为 PNG 无损中间图。
///
/// - `bitmap` 为 `None` 时返回 [`PrepError::NoImageLoaded`]
/// - 实测布局不可用时返回 [`PrepError::InvalidLayout`]
/// - 裁剪框超出位图边缘的部分被截断为透明，而不是报错
pub fn extract(
    bitmap: Option<&NaturalBitmap>,
    region: &CropRegion,
    layout: &MeasuredLayout,
    filter: FilterType,
) -> Result<CropBuffer, PrepError> {
    let bitmap = bitmap.ok_or(PrepError::NoImageLoaded)?;
    layout.ensure_valid()?;

    let crop_px = crop_region_to_viewport_px(region, layout);
    let out_width = crop_px.width.round().max(1.0) as u32;
    let out_height = crop_px.height.round().max(1.0) as u32;

    let local = viewport_px_to_image_local(&crop_px, layout);
    let scale = layout.source_scale(bitmap.width);
    let source = image_local_to_source_px(&local, scale, bitmap.width, bitmap.height);

    // 框的左上角落在位图外时，位图在画布上的起笔位置向内偏移
    let dest_x = (layout.image_left - crop_px.x).max(0.0).round() as i64;
    let dest_y = (layout.image_top - crop_px.y).max(0.0).round() as i64;

    let mut canvas = RgbaImage::new(out_width, out_height);

    if source.sw >= 1.0 && source.sh >= 1.0 {
        let sx = (source.sx.round() as u32).min(bitmap.width - 1);
        let sy = (source.sy.round() as u32).min(bitmap.height - 1);
        let sw = (source.sw.round() as u32).clamp(1, bitmap.width - sx);
        let sh = (source.sh.round() as u32).clamp(1, bitmap.height - sy);

        let dest_w = ((source.sw / scale).round() as u32).max(1);
        let dest_h = ((source.sh / scale).round() as u32).max(1);

        let cropped = bitmap.image.crop_imm(sx, sy, sw, sh);
        let resampled = if dest_w == sw && dest_h == sh {
            cropped
        } else {
            cropped.resize_exact(dest_w, dest_h, filter)
        };

        image::imageops::overlay(&mut canvas, &resampled.to_rgba8(), dest_x, dest_y);
    }

    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| PrepError::EncodingFailed(format!("裁剪中间图编码失败：{}", e)))?;

    log::debug!(
        "✂️ 裁剪提取完成 - 源矩形 ({:.1},{:.1} {:.1}x{:.1}) 输出 {}x{}",
        source.sx, source.sy, source.sw, source.sh, out_width, out_height
    );

    Ok(CropBuffer { width: out_width, height: out_height, bytes: cursor.into_inner() })
}
