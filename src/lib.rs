//! # 封面图片准备核心库
//!
//! 博客封面图片上传前的完整准备链路：文件校验、交互式裁剪、
//! 压缩编码。库本身不做任何网络上传，只产出可交付的处理产物。
//!
//! ## 架构总览
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    UploadMachine                    │
//! │        （stage：阶段状态机，唯一状态写入者）        │
//! └───────┬──────────────┬──────────────┬───────────────┘
//!         │              │              │
//!   ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!   │ validator │  │  session  │  │ pipeline  │
//!   │ 类型/体积 │  │ 裁剪交互  │  │ 缩放/编码 │
//!   │ /尺寸校验 │  │ 会话状态  │  │ 进度上报  │
//!   └─────┬─────┘  └─────┬─────┘  └─────▲─────┘
//!         │              │              │
//!   ┌─────▼─────┐  ┌─────▼─────┐  ┌─────┴─────┐
//!   │  decoder  │  │ geometry  │  │ extractor │
//!   │ 位图解码  │  │ 坐标换算  │──▶ 裁剪提取  │
//!   └───────────┘  └───────────┘  └───────────┘
//!                        │
//!                  ┌─────▼─────┐
//!                  │  preview  │
//!                  │ 去抖+序号 │
//!                  └───────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`stage`] | 阶段状态机：idle → validating → cropping → processing → complete |
//! | [`validator`] | 类型嗅探、体积上限、像素尺寸范围校验 |
//! | [`decoder`] | 字节流解码为常驻内存的自然位图 |
//! | [`geometry`] | 视口变换、百分比裁剪框、三坐标系换算 |
//! | [`session`] | 裁剪阶段的指针交互状态（平移/拉框互斥） |
//! | [`extractor`] | 裁剪框 → PNG 无损中间图 |
//! | [`pipeline`] | 等比缩放 + 目标格式编码，带进度与取消 |
//! | [`preview`] | 预览重算的去抖与“最新请求胜出”守卫 |
//! | [`config`] | 校验与处理参数，运行前范围检查 |
//!
//! ## 使用示例
//!
//! ```no_run
//! use cover_image_prep::{SourceAsset, UploadMachine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let machine = UploadMachine::new()?;
//! let bytes = std::fs::read("cover.jpg")?;
//! let asset = SourceAsset::from_bytes(bytes, "image/jpeg", "cover.jpg");
//!
//! machine.select_file(asset).await?;            // validating → cropping
//! machine.begin_pan()?;
//! machine.pointer_move(24.0, -10.0, 800.0, 500.0)?;
//! machine.end_pointer()?;
//! machine.confirm_crop(800.0, 500.0).await?;    // processing → complete
//!
//! if let Some(processed) = machine.processed()? {
//!     println!("{} ({} bytes)", processed.file_name, processed.byte_size);
//! }
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod config;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod geometry;
pub mod pipeline;
pub mod preview;
pub mod session;
pub mod stage;
pub mod validator;

pub use asset::{CropBuffer, NaturalBitmap, ProcessedAsset, SourceAsset};
pub use config::UploadConfig;
pub use error::PrepError;
pub use geometry::{CropRegion, MeasuredLayout, ResizeHandle, ViewportTransform};
pub use session::{CropSession, PointerMode};
pub use stage::{StageSnapshot, UploadMachine, UploadStage};
