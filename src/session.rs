//! # 裁剪会话模块
//!
//! ## 设计思路
//!
//! 裁剪阶段的交互状态集中在一个会话对象里：视口变换、裁剪框，
//! 以及指针交互模式。交互模式用单枚举
//! `Idle | Panning | Resizing(handle)` 表达，“同时拖图又拉框”这类
//! 非法组合在类型上就不可能出现。
//!
//! ## 实现思路
//!
//! 指针事件处理器全部同步执行、只改会话内状态；
//! 是否触发预览重算由调用侧根据返回的“是否有变化”决定，
//! 会话本身不直接驱动异步工作。

use crate::geometry::{CropRegion, ResizeHandle, ViewportTransform};

/// 指针交互模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerMode {
    #[default]
    Idle,
    /// 正在拖拽图片（平移）。
    Panning,
    /// 正在通过某个把手缩放裁剪框。
    Resizing(ResizeHandle),
}

/// 一次裁剪交互的全部可变状态。
///
/// 生命周期与 `cropping` 阶段一致：进入时创建，确认/取消时销毁。
#[derive(Debug, Clone, Copy, Default)]
pub struct CropSession {
    transform: ViewportTransform,
    region: CropRegion,
    mode: PointerMode,
}

impl CropSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transform(&self) -> ViewportTransform {
        self.transform
    }

    pub fn region(&self) -> CropRegion {
        self.region
    }

    pub fn mode(&self) -> PointerMode {
        self.mode
    }

    /// 指针按在图片上：进入平移模式。
    pub fn begin_pan(&mut self) {
        self.mode = PointerMode::Panning;
    }

    /// 指针按在某个把手上：进入缩放模式。
    pub fn begin_resize(&mut self, handle: ResizeHandle) {
        self.mode = PointerMode::Resizing(handle);
    }

    /// 指针抬起：回到空闲模式。
    pub fn end_pointer(&mut self) {
        self.mode = PointerMode::Idle;
    }

    /// 指针移动增量（屏幕像素）。按当前模式分发；返回状态是否变化。
    ///
    /// 缩放模式下增量先换算成视口百分比，再交给裁剪框做逐步夹取。
    pub fn pointer_move(
        &mut self,
        delta_x_px: f64,
        delta_y_px: f64,
        viewport_width: f64,
        viewport_height: f64,
    ) -> bool {
        match self.mode {
            PointerMode::Idle => false,
            PointerMode::Panning => {
                self.transform.pan(delta_x_px, delta_y_px);
                true
            }
            PointerMode::Resizing(handle) => {
                if viewport_width <= 0.0 || viewport_height <= 0.0 {
                    return false;
                }
                let before = self.region;
                self.region.resize(
                    handle,
                    delta_x_px / viewport_width * 100.0,
                    delta_y_px / viewport_height * 100.0,
                );
                self.region != before
            }
        }
    }

    /// 设置缩放因子（夹取）；返回是否变化。
    pub fn set_zoom(&mut self, factor: f64) -> bool {
        let before = self.transform.zoom;
        self.transform.set_zoom(factor);
        self.transform.zoom != before
    }

    pub fn zoom_in(&mut self) -> bool {
        let before = self.transform.zoom;
        self.transform.zoom_in();
        self.transform.zoom != before
    }

    pub fn zoom_out(&mut self) -> bool {
        let before = self.transform.zoom;
        self.transform.zoom_out();
        self.transform.zoom != before
    }

    /// 整体平移裁剪框；返回是否变化。
    pub fn translate_region(&mut self, delta_x_pct: f64, delta_y_pct: f64) -> bool {
        let before = self.region;
        self.region.translate(delta_x_pct, delta_y_pct);
        self.region != before
    }
}
