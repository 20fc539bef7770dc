//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载整条图片准备链路（校验 → 裁剪 → 压缩编码）中的
//! 所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! `Aborted` 是唯一的“静默”错误：它表示结果已被新请求取代或被用户主动
//! 取消，状态机收到后直接丢弃，绝不写入对外状态快照。

/// 图片准备流程统一错误类型。
///
/// 除 [`PrepError::Aborted`] 外，所有分支最终都会以人类可读消息的形式
/// 进入 `StageSnapshot.error_message` 供宿主展示。
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    #[error("不支持的图片类型：{0}")]
    UnsupportedType(String),

    #[error("图片体积过大：{0}")]
    TooLarge(String),

    #[error("图片尺寸超出范围：{0}")]
    DimensionOutOfRange(String),

    #[error("尚未加载任何图片")]
    NoImageLoaded,

    #[error("视口布局无效：{0}")]
    InvalidLayout(String),

    #[error("编码处理失败：{0}")]
    EncodingFailed(String),

    #[error("操作已取消")]
    Aborted,
}

impl PrepError {
    /// 稳定错误码，供宿主按类别处理（展示、埋点）。
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "E_UNSUPPORTED_TYPE",
            Self::TooLarge(_) => "E_TOO_LARGE",
            Self::DimensionOutOfRange(_) => "E_DIMENSION_OUT_OF_RANGE",
            Self::NoImageLoaded => "E_NO_IMAGE",
            Self::InvalidLayout(_) => "E_INVALID_LAYOUT",
            Self::EncodingFailed(_) => "E_ENCODING_FAILED",
            Self::Aborted => "E_ABORTED",
        }
    }

    /// 错误发生的流水线阶段，用于日志与失败载荷。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) | Self::TooLarge(_) | Self::DimensionOutOfRange(_) => {
                "validating"
            }
            Self::NoImageLoaded | Self::InvalidLayout(_) => "cropping",
            Self::EncodingFailed(_) => "processing",
            Self::Aborted => "aborted",
        }
    }

    /// 是否应静默丢弃（不进入对外错误状态）。
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<PrepError> for String {
    /// 兼容部分仍使用字符串错误的调用点。
    fn from(error: PrepError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_is_the_only_silent_error() {
        assert!(PrepError::Aborted.is_silent());
        assert!(!PrepError::NoImageLoaded.is_silent());
        assert!(!PrepError::EncodingFailed("x".to_string()).is_silent());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(PrepError::UnsupportedType("t".to_string()).code(), "E_UNSUPPORTED_TYPE");
        assert_eq!(PrepError::Aborted.code(), "E_ABORTED");
    }

    #[test]
    fn stage_maps_errors_to_pipeline_stages() {
        assert_eq!(PrepError::TooLarge("x".to_string()).stage(), "validating");
        assert_eq!(PrepError::InvalidLayout("x".to_string()).stage(), "cropping");
        assert_eq!(PrepError::EncodingFailed("x".to_string()).stage(), "processing");
    }
}
