//! # 视口变换模型
//!
//! ## 设计思路
//!
//! 只跟踪“解码位图在固定视口内如何显示”：平移量与缩放因子。
//! 平移刻意不做任何夹取——图片可以被整体拖出可视区域，
//! 这与手动重新构图的工作流一致；缩放则始终夹取在合法区间内，
//! 越界输入被修正而不是报错。

/// 缩放下限。
pub const MIN_ZOOM: f64 = 0.5;
/// 缩放上限。
pub const MAX_ZOOM: f64 = 3.0;
/// 缩放按钮单步步长。
pub const ZOOM_STEP: f64 = 0.1;

/// 位图在视口内的显示变换。
///
/// 仅由拖拽与缩放控件修改；加载新图或取消裁剪时重置为 `{0, 0, 1}`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    /// 水平平移（屏幕像素）。
    pub pan_x: f64,
    /// 垂直平移（屏幕像素）。
    pub pan_y: f64,
    /// 缩放因子，恒在 `[0.5, 3.0]` 内。
    pub zoom: f64,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self { pan_x: 0.0, pan_y: 0.0, zoom: 1.0 }
    }
}

impl ViewportTransform {
    /// 平移显示位置，不做夹取。
    pub fn pan(&mut self, delta_x: f64, delta_y: f64) {
        self.pan_x += delta_x;
        self.pan_y += delta_y;
    }

    /// 设置缩放因子，越界输入夹取到 `[0.5, 3.0]`。
    pub fn set_zoom(&mut self, factor: f64) {
        self.zoom = factor.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// 放大一档。
    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + ZOOM_STEP);
    }

    /// 缩小一档。
    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - ZOOM_STEP);
    }

    /// 重置为初始显示状态。
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
