//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `UploadConfig`，保证运行时行为可观测、可调整、可测试。
//! 默认值即生产可用值（与宿主表单的默认约束一致）。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产配置：10MB 上限、800×400 最小原图尺寸、
//!   1920×1080 输出上限、压缩与 WebP 转换开启、质量 0.85。
//! - `validate` 在状态机接受外部覆盖前做范围检查，拒绝明显不合理的参数。

use image::imageops::FilterType;

use crate::error::PrepError;

/// 图片准备流程配置。
///
/// 字段覆盖校验、裁剪输出与压缩编码三个阶段。
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// 原始文件体积上限（MB）。
    pub max_size_mb: u32,
    /// 原图最小宽度（像素），`None` 表示不限制。
    pub min_width: Option<u32>,
    /// 原图最小高度（像素），`None` 表示不限制。
    pub min_height: Option<u32>,
    /// 原图最大宽度校验值（像素），`None` 表示不限制。
    ///
    /// 与输出上限 [`Self::max_width`] 独立：超大原图默认放行，
    /// 由流水线等比缩放到输出上限，而不是在校验阶段拒绝。
    pub max_source_width: Option<u32>,
    /// 原图最大高度校验值（像素），`None` 表示不限制。
    pub max_source_height: Option<u32>,
    /// 输出最大宽度（像素），超出时流水线等比缩放到该上限。
    pub max_width: Option<u32>,
    /// 输出最大高度（像素），超出时流水线等比缩放到该上限。
    pub max_height: Option<u32>,
    /// 是否启用压缩（关闭时裁剪结果直接作为产物）。
    pub enable_compression: bool,
    /// 是否统一转换为 WebP 输出格式。
    pub convert_to_webp: bool,
    /// 编码质量因子，范围 `(0, 1]`，仅对有损格式生效。
    pub quality: f32,
    /// 最终重采样滤镜策略。
    pub resize_filter: FilterType,
    /// 实时预览使用的轻量滤镜策略。
    pub preview_filter: FilterType,
    /// 预览去抖窗口（毫秒）。
    pub preview_debounce_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 10,
            min_width: Some(800),
            min_height: Some(400),
            max_source_width: None,
            max_source_height: None,
            max_width: Some(1920),
            max_height: Some(1080),
            enable_compression: true,
            convert_to_webp: true,
            quality: 0.85,
            resize_filter: FilterType::CatmullRom,
            preview_filter: FilterType::Triangle,
            preview_debounce_ms: 100,
        }
    }
}

impl UploadConfig {
    /// 范围检查外部覆盖值，拒绝明显不合理的配置。
    ///
    /// 最小/最大尺寸允许为 `None`（不限制），但同轴的 min 不得超过 max。
    pub fn validate(&self) -> Result<(), PrepError> {
        if self.max_size_mb == 0 || self.max_size_mb > 512 {
            return Err(PrepError::EncodingFailed(format!(
                "max_size_mb 必须在 1~512 之间（当前：{}）",
                self.max_size_mb
            )));
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(PrepError::EncodingFailed(format!(
                "quality 必须在 (0, 1] 区间（当前：{}）",
                self.quality
            )));
        }
        if let (Some(min_w), Some(max_w)) = (self.min_width, self.max_source_width) {
            if min_w > max_w {
                return Err(PrepError::EncodingFailed(format!(
                    "min_width({}) 不能大于 max_source_width({})",
                    min_w, max_w
                )));
            }
        }
        if let (Some(min_h), Some(max_h)) = (self.min_height, self.max_source_height) {
            if min_h > max_h {
                return Err(PrepError::EncodingFailed(format!(
                    "min_height({}) 不能大于 max_source_height({})",
                    min_h, max_h
                )));
            }
        }
        if self.preview_debounce_ms > 5_000 {
            return Err(PrepError::EncodingFailed(format!(
                "preview_debounce_ms 不能超过 5000 毫秒（当前：{}）",
                self.preview_debounce_ms
            )));
        }
        Ok(())
    }

    /// 体积上限折算为字节。
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb as u64 * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_production_constraints() {
        let config = UploadConfig::default();
        assert_eq!(config.max_size_mb, 10);
        assert_eq!(config.min_width, Some(800));
        assert_eq!(config.min_height, Some(400));
        assert_eq!(config.max_source_width, None);
        assert_eq!(config.max_source_height, None);
        assert_eq!(config.max_width, Some(1920));
        assert_eq!(config.max_height, Some(1080));
        assert!(config.enable_compression);
        assert!(config.convert_to_webp);
        assert!((config.quality - 0.85).abs() < f32::EPSILON);
        config.validate().expect("default config should validate");
    }

    #[test]
    fn validate_rejects_out_of_range_quality() {
        let mut config = UploadConfig::default();
        config.quality = 0.0;
        assert!(config.validate().is_err());

        config.quality = 1.2;
        assert!(config.validate().is_err());

        config.quality = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_dimension_bounds() {
        let mut config = UploadConfig::default();
        config.min_width = Some(2000);
        config.max_source_width = Some(1024);
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_size_bytes_converts_from_megabytes() {
        let config = UploadConfig::default();
        assert_eq!(config.max_size_bytes(), 10 * 1024 * 1024);
    }
}
