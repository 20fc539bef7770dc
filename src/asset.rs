//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `SourceAsset` 表示用户选中的原始文件（字节 + 声明类型）
//! - `NaturalBitmap` 表示解码后的原始位图（只读）
//! - `CropBuffer` 表示裁剪阶段输出的无损中间图
//! - `ProcessedAsset` 表示最终交付宿主的编码产物
//!
//! ## 实现思路
//!
//! Data URL 入口沿用“先估算解码体积再真正解码”的策略，
//! 避免超大 Base64 载荷在解码阶段才被发现。

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use image::DynamicImage;

use crate::error::PrepError;

/// 用户原始选择的文件，创建后不可变。
#[derive(Debug, Clone)]
pub struct SourceAsset {
    /// 原始图片字节。
    pub bytes: Vec<u8>,
    /// 宿主声明的 MIME 类型（如 `image/png`）。
    pub declared_mime: String,
    /// 字节体积。
    pub byte_size: u64,
    /// 原始文件名，用于产物命名。
    pub file_name: String,
}

impl SourceAsset {
    /// 从原始字节构建资产。
    pub fn from_bytes(bytes: Vec<u8>, declared_mime: impl Into<String>, file_name: impl Into<String>) -> Self {
        let byte_size = bytes.len() as u64;
        Self {
            bytes,
            declared_mime: declared_mime.into(),
            byte_size,
            file_name: file_name.into(),
        }
    }

    /// 从 `data:image/...;base64,` 形式的 Data URL 构建资产。
    ///
    /// 解码前先按 Base64 长度估算解码体积上界并与 `max_bytes` 比较，
    /// 超限直接拒绝，不做无谓解码。
    pub fn from_data_url(data: &str, file_name: impl Into<String>, max_bytes: u64) -> Result<Self, PrepError> {
        let normalized = data.trim();
        if !normalized.starts_with("data:image/") {
            return Err(PrepError::UnsupportedType(
                "Data URL 必须以 data:image/ 开头".to_string(),
            ));
        }

        let marker = normalized
            .find(";base64,")
            .ok_or_else(|| PrepError::UnsupportedType("Data URL 缺少 base64 标记".to_string()))?;
        let declared_mime = normalized["data:".len()..marker].to_string();
        let payload = &normalized[marker + ";base64,".len()..];

        let estimated = estimate_decoded_upper_bound(payload);
        if estimated > max_bytes {
            return Err(PrepError::TooLarge(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                max_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| PrepError::UnsupportedType(format!("Base64 解码失败：{}", e)))?;

        Ok(Self::from_bytes(bytes, declared_mime, file_name))
    }
}

/// 按 Base64 文本长度估算解码后体积上界（不执行解码）。
fn estimate_decoded_upper_bound(payload: &str) -> u64 {
    (payload.len() as u64 / 4 + 1) * 3
}

/// 解码后的原始位图，派生一次后只读。
///
/// 内部以 `Arc` 共享解码句柄，允许异步步骤在不持锁的情况下读取像素。
#[derive(Clone)]
pub struct NaturalBitmap {
    /// 解码后的图像句柄。
    pub image: Arc<DynamicImage>,
    /// 原始宽度（像素），恒大于 0。
    pub width: u32,
    /// 原始高度（像素），恒大于 0。
    pub height: u32,
}

impl std::fmt::Debug for NaturalBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NaturalBitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// 裁剪阶段输出：PNG 无损中间图。
///
/// 尺寸等于裁剪框在屏幕上的像素尺寸（跟随显示分辨率，而非固定分辨率）。
#[derive(Debug, Clone)]
pub struct CropBuffer {
    pub width: u32,
    pub height: u32,
    /// PNG 编码字节。
    pub bytes: Vec<u8>,
}

impl CropBuffer {
    /// 中间产物的统一文件名（与压缩阶段的输入命名保持一致）。
    pub const FILE_NAME: &'static str = "cropped.png";
}

/// 流水线最终产物，交付宿主持久化。
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessedAsset {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub byte_size: u64,
    pub file_name: String,
}
