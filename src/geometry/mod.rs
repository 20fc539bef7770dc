//! # 几何模块（geometry）
//!
//! ## 设计思路
//!
//! 裁剪交互横跨三个坐标系：视口百分比、屏幕像素、原图像素。
//! 三者之间的换算是整条链路最容易出错的地方，因此：
//!
//! - `viewport`：位移/缩放状态，只管“图片如何显示在视口里”
//! - `crop_region`：百分比裁剪框，只管“框住视口的哪一块”
//! - `mapping`：命名化的坐标系换算函数，逐对坐标系单独测试
//!
//! 所有换算都是纯函数：输入状态，输出矩形，不触碰任何共享状态。

mod crop_region;
pub mod mapping;
mod viewport;

pub use crop_region::{CropRegion, ResizeHandle};
pub use mapping::{MeasuredLayout, RectF, SourceRect};
pub use viewport::ViewportTransform;
