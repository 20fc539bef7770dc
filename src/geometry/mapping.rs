//! # 坐标系换算模块
//!
//! ## 设计思路
//!
//! 三个坐标系逐对换算，每一步都是命名化纯函数：
//!
//! 1. 视口百分比 → 视口像素（乘视口实测尺寸）
//! 2. 视口像素 → 位图局部像素（减去位图显示原点）
//! 3. 位图局部像素 → 原图像素（乘 `natural_w / display_w`）
//!
//! 显示矩形由变换状态推导：位图以自身中心为缩放原点，
//! 先平移后缩放（等价于宿主侧 `translate(pan) scale(zoom)` 的渲染规则），
//! 因此 `left = pan_x + natural_w·(1−zoom)/2`，显示宽高为 `natural·zoom`。

use crate::error::PrepError;
use crate::geometry::{CropRegion, ViewportTransform};

/// 屏幕像素坐标系下的浮点矩形。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// 原图像素坐标系下的采样矩形，已夹取进位图范围。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub sx: f64,
    pub sy: f64,
    pub sw: f64,
    pub sh: f64,
}

/// 视口容器与位图元素的实测屏幕几何。
///
/// 坐标全部以视口容器左上角为原点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredLayout {
    /// 视口容器宽度（像素）。
    pub viewport_width: f64,
    /// 视口容器高度（像素）。
    pub viewport_height: f64,
    /// 位图显示矩形左边界。
    pub image_left: f64,
    /// 位图显示矩形上边界。
    pub image_top: f64,
    /// 位图显示宽度（已含缩放）。
    pub image_display_width: f64,
    /// 位图显示高度（已含缩放）。
    pub image_display_height: f64,
}

impl MeasuredLayout {
    /// 由视口尺寸与当前变换推导位图显示矩形。
    ///
    /// 位图基准尺寸为原图尺寸、基准原点为视口左上角，
    /// 缩放以位图中心为原点，因此左上角要回退 `natural·(1−zoom)/2`。
    pub fn derive(
        natural_width: u32,
        natural_height: u32,
        transform: &ViewportTransform,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Self {
        let natural_w = natural_width as f64;
        let natural_h = natural_height as f64;

        Self {
            viewport_width,
            viewport_height,
            image_left: transform.pan_x + natural_w * (1.0 - transform.zoom) / 2.0,
            image_top: transform.pan_y + natural_h * (1.0 - transform.zoom) / 2.0,
            image_display_width: natural_w * transform.zoom,
            image_display_height: natural_h * transform.zoom,
        }
    }

    /// 校验实测几何是否可用于裁剪计算。
    pub fn ensure_valid(&self) -> Result<(), PrepError> {
        let values = [
            self.viewport_width,
            self.viewport_height,
            self.image_display_width,
            self.image_display_height,
        ];
        if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(PrepError::InvalidLayout(format!(
                "视口 {}x{}，位图显示 {}x{}",
                self.viewport_width,
                self.viewport_height,
                self.image_display_width,
                self.image_display_height
            )));
        }
        Ok(())
    }

    /// 原图像素与显示像素的比例因子（显示尺寸已含缩放）。
    pub fn source_scale(&self, natural_width: u32) -> f64 {
        natural_width as f64 / self.image_display_width
    }
}

/// 视口百分比 → 视口像素。
pub fn crop_region_to_viewport_px(region: &CropRegion, layout: &MeasuredLayout) -> RectF {
    RectF {
        x: region.x / 100.0 * layout.viewport_width,
        y: region.y / 100.0 * layout.viewport_height,
        width: region.width / 100.0 * layout.viewport_width,
        height: region.height / 100.0 * layout.viewport_height,
    }
}

/// 视口像素 → 位图局部像素（减去位图显示原点，不夹取）。
pub fn viewport_px_to_image_local(rect: &RectF, layout: &MeasuredLayout) -> RectF {
    RectF {
        x: rect.x - layout.image_left,
        y: rect.y - layout.image_top,
        width: rect.width,
        height: rect.height,
    }
}

/// 位图局部像素 → 原图像素，并夹取进位图范围。
///
/// 超出位图边缘的裁剪框被截断而不是报错：起点下夹到 0，
/// 宽高上夹到剩余可用范围（可能为 0，表示框完全落在图外）。
pub fn image_local_to_source_px(
    local: &RectF,
    scale: f64,
    natural_width: u32,
    natural_height: u32,
) -> SourceRect {
    let sx = (local.x * scale).max(0.0);
    let sy = (local.y * scale).max(0.0);
    let sw = (local.width * scale).min(natural_width as f64 - sx).max(0.0);
    let sh = (local.height * scale).min(natural_height as f64 - sy).max(0.0);
    SourceRect { sx, sy, sw, sh }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_layout(natural_w: u32, natural_h: u32, vw: f64, vh: f64) -> MeasuredLayout {
        MeasuredLayout::derive(natural_w, natural_h, &ViewportTransform::default(), vw, vh)
    }

    #[test]
    fn derive_at_identity_places_image_at_origin() {
        let layout = identity_layout(400, 200, 400.0, 250.0);
        assert_eq!(layout.image_left, 0.0);
        assert_eq!(layout.image_top, 0.0);
        assert_eq!(layout.image_display_width, 400.0);
        assert_eq!(layout.image_display_height, 200.0);
    }

    #[test]
    fn derive_applies_center_origin_zoom() {
        let mut transform = ViewportTransform::default();
        transform.set_zoom(2.0);

        let layout = MeasuredLayout::derive(400, 200, &transform, 400.0, 250.0);
        // 以中心缩放：左上角向外扩张一半的增量
        assert_eq!(layout.image_left, -200.0);
        assert_eq!(layout.image_top, -100.0);
        assert_eq!(layout.image_display_width, 800.0);
        assert_eq!(layout.image_display_height, 400.0);
    }

    #[test]
    fn derive_composes_pan_with_zoom() {
        let mut transform = ViewportTransform::default();
        transform.pan(30.0, -10.0);
        transform.set_zoom(0.5);

        let layout = MeasuredLayout::derive(400, 200, &transform, 400.0, 250.0);
        assert_eq!(layout.image_left, 30.0 + 400.0 * 0.25);
        assert_eq!(layout.image_top, -10.0 + 200.0 * 0.25);
        assert_eq!(layout.image_display_width, 200.0);
    }

    #[test]
    fn ensure_valid_rejects_zero_viewport() {
        let mut layout = identity_layout(400, 200, 0.0, 250.0);
        assert!(matches!(layout.ensure_valid(), Err(PrepError::InvalidLayout(_))));

        layout.viewport_width = f64::NAN;
        assert!(matches!(layout.ensure_valid(), Err(PrepError::InvalidLayout(_))));
    }

    #[test]
    fn percent_to_viewport_px_scales_both_axes() {
        let layout = identity_layout(400, 200, 640.0, 400.0);
        let region = CropRegion { x: 10.0, y: 25.0, width: 50.0, height: 50.0 };

        let rect = crop_region_to_viewport_px(&region, &layout);
        assert_eq!(rect, RectF { x: 64.0, y: 100.0, width: 320.0, height: 200.0 });
    }

    #[test]
    fn viewport_to_image_local_subtracts_display_origin() {
        let mut layout = identity_layout(400, 200, 640.0, 400.0);
        layout.image_left = 40.0;
        layout.image_top = -20.0;

        let rect = RectF { x: 64.0, y: 100.0, width: 320.0, height: 200.0 };
        let local = viewport_px_to_image_local(&rect, &layout);
        assert_eq!(local, RectF { x: 24.0, y: 120.0, width: 320.0, height: 200.0 });
    }

    #[test]
    fn image_local_to_source_px_scales_and_clamps() {
        let local = RectF { x: -10.0, y: 5.0, width: 500.0, height: 100.0 };
        let source = image_local_to_source_px(&local, 2.0, 400, 200);

        assert_eq!(source.sx, 0.0);
        assert_eq!(source.sy, 10.0);
        assert_eq!(source.sw, 400.0);
        assert_eq!(source.sh, 190.0);
    }

    #[test]
    fn fully_outside_crop_collapses_to_zero_area() {
        let local = RectF { x: 1000.0, y: 1000.0, width: 50.0, height: 50.0 };
        let source = image_local_to_source_px(&local, 1.0, 400, 200);

        assert_eq!(source.sw, 0.0);
        assert_eq!(source.sh, 0.0);
    }

    #[test]
    fn source_scale_is_inverse_of_zoom() {
        let mut transform = ViewportTransform::default();
        transform.set_zoom(2.0);
        let layout = MeasuredLayout::derive(400, 200, &transform, 400.0, 250.0);

        assert_eq!(layout.source_scale(400), 0.5);
    }
}
