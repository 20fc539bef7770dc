//! # 位图解码模块
//!
//! ## 设计思路
//!
//! 把“字节 → 位图”的过程集中到一个入口，先做图片头探测再完整解码，
//! 解码结果作为 [`NaturalBitmap`] 只读共享给裁剪与预览两条路径。

use std::sync::Arc;

use crate::asset::NaturalBitmap;
use crate::error::PrepError;
use crate::validator::probe_dimensions;

/// 将原始字节解码为只读位图。
///
/// 失败场景：
/// - 无法识别或解码的字节流
/// - 任一维度为 0 的退化图像
pub fn decode_bitmap(bytes: &[u8]) -> Result<NaturalBitmap, PrepError> {
    let (header_width, header_height) = probe_dimensions(bytes)?;
    if header_width == 0 || header_height == 0 {
        return Err(PrepError::EncodingFailed(format!(
            "图片头尺寸无效：{}x{}",
            header_width, header_height
        )));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| PrepError::EncodingFailed(format!("图片解码失败：{}", e)))?;

    let width = decoded.width();
    let height = decoded.height();
    if width == 0 || height == 0 {
        return Err(PrepError::EncodingFailed(format!(
            "解码后尺寸无效：{}x{}",
            width, height
        )));
    }

    log::debug!("🖼️ 位图解码完成 - 尺寸: {}x{}", width, height);

    Ok(NaturalBitmap {
        image: Arc::new(decoded),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, 0, 255])
        });
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn decodes_dimensions_from_valid_png() {
        let bitmap = decode_bitmap(&png_bytes(40, 24)).expect("decode should succeed");
        assert_eq!(bitmap.width, 40);
        assert_eq!(bitmap.height, 24);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = decode_bitmap(&[0u8, 1, 2, 3, 4, 5]);
        assert!(result.is_err());
    }
}
