//! # 上传阶段状态机模块
//!
//! ## 设计思路
//!
//! `UploadMachine` 是唯一的共享状态写入者：校验、裁剪、压缩三个阶段
//! 的所有状态变迁都经过它。宿主只读 [`StageSnapshot`] 渲染进度与错误。
//!
//! 合法变迁（其余一律拒绝或忽略）：
//!
//! ```text
//! idle --select--> validating --pass--> cropping --confirm--> processing --ok--> complete
//! idle --select--> validating --fail--> error
//! cropping --cancel--> idle
//! processing --fail--> error
//! error --retry--> idle（宿主重新选择文件后回到 validating）
//! complete --select(replace)--> validating    complete --remove--> idle
//! ```
//!
//! ## 实现思路
//!
//! - 异步步骤以“代号 + 取消标志”双重守卫：每次 `select_file` 自增代号
//!   并点燃上一次运行的取消标志；被取代/被取消的运行在任何提交点都
//!   无法再写入共享状态（`commit_if_current`）。
//! - 单次运行使用同一配置快照，处理中途改配置不影响在途请求。
//! - 替换失败不破坏已完成产物：`processed` 只在新产物成功时被覆盖。
//! - 处理阶段失败会丢弃裁剪状态，宿主需重新选择文件（与取消裁剪一致）。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use crate::asset::{CropBuffer, ProcessedAsset, SourceAsset};
use crate::config::UploadConfig;
use crate::decoder::decode_bitmap;
use crate::error::PrepError;
use crate::extractor::extract;
use crate::geometry::{MeasuredLayout, ResizeHandle};
use crate::pipeline;
use crate::preview::PreviewSynchronizer;
use crate::session::CropSession;
use crate::validator;

/// 上传阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStage {
    Idle,
    Validating,
    Cropping,
    Processing,
    Complete,
    Error,
}

/// 对外状态快照：宿主 UI 渲染的唯一事实来源。
#[derive(Debug, Clone, serde::Serialize)]
pub struct StageSnapshot {
    pub stage: UploadStage,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub original_byte_size: u64,
    pub processed_byte_size: u64,
}

type ProcessedHook = Box<dyn Fn(&ProcessedAsset) + Send + Sync>;
type RemovedHook = Box<dyn Fn() + Send + Sync>;

struct Inner {
    stage: UploadStage,
    progress: u8,
    error_message: Option<String>,
    original_byte_size: u64,
    processed_byte_size: u64,
    source: Option<SourceAsset>,
    bitmap: Option<crate::asset::NaturalBitmap>,
    session: Option<CropSession>,
    processed: Option<ProcessedAsset>,
    preview_image: Option<CropBuffer>,
    /// 编辑已有图片时由宿主预置的外部产物引用，不经过校验。
    existing_reference: Option<String>,
    generation: u64,
    cancel_flag: Arc<AtomicBool>,
}

impl Inner {
    fn new() -> Self {
        Self {
            stage: UploadStage::Idle,
            progress: 0,
            error_message: None,
            original_byte_size: 0,
            processed_byte_size: 0,
            source: None,
            bitmap: None,
            session: None,
            processed: None,
            preview_image: None,
            existing_reference: None,
            generation: 0,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// 图片准备状态机。
pub struct UploadMachine {
    config: Arc<RwLock<UploadConfig>>,
    inner: Arc<Mutex<Inner>>,
    preview: Arc<PreviewSynchronizer>,
    on_processed: Option<ProcessedHook>,
    on_removed: Option<RemovedHook>,
}

impl UploadMachine {
    /// 使用默认配置创建状态机。
    pub fn new() -> Result<Self, PrepError> {
        Self::with_config(UploadConfig::default())
    }

    /// 使用自定义配置创建状态机；配置先过范围检查。
    pub fn with_config(config: UploadConfig) -> Result<Self, PrepError> {
        config.validate()?;
        let debounce = config.preview_debounce_ms;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            inner: Arc::new(Mutex::new(Inner::new())),
            preview: Arc::new(PreviewSynchronizer::new(debounce)),
            on_processed: None,
            on_removed: None,
        })
    }

    /// 注册产物交付回调（宿主负责持久化）。
    pub fn on_processed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ProcessedAsset) + Send + Sync + 'static,
    {
        self.on_processed = Some(Box::new(hook));
        self
    }

    /// 注册移除通知回调（宿主据此丢弃已持久化引用）。
    pub fn on_removed<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_removed = Some(Box::new(hook));
        self
    }

    fn lock_inner(&self) -> Result<std::sync::MutexGuard<'_, Inner>, PrepError> {
        self.inner
            .lock()
            .map_err(|_| PrepError::EncodingFailed("状态锁已中毒".to_string()))
    }

    /// 获取配置快照，保证单次运行链路参数一致。
    fn config_snapshot(&self) -> Result<UploadConfig, PrepError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| PrepError::EncodingFailed("配置读取锁已中毒".to_string()))
    }

    /// 运行时更新配置（先过范围检查），对在途请求不生效。
    pub fn set_config(&self, config: UploadConfig) -> Result<(), PrepError> {
        config.validate()?;
        let mut guard = self
            .config
            .write()
            .map_err(|_| PrepError::EncodingFailed("配置写入锁已中毒".to_string()))?;
        *guard = config;
        Ok(())
    }

    /// 当前状态快照。
    pub fn snapshot(&self) -> Result<StageSnapshot, PrepError> {
        let inner = self.lock_inner()?;
        Ok(StageSnapshot {
            stage: inner.stage,
            progress_percent: inner.progress,
            error_message: inner.error_message.clone(),
            original_byte_size: inner.original_byte_size,
            processed_byte_size: inner.processed_byte_size,
        })
    }

    /// 最近一次成功产物（克隆）。
    pub fn processed(&self) -> Result<Option<ProcessedAsset>, PrepError> {
        Ok(self.lock_inner()?.processed.clone())
    }

    /// 最近一次落地的预览中间图（克隆）。
    pub fn preview_image(&self) -> Result<Option<CropBuffer>, PrepError> {
        Ok(self.lock_inner()?.preview_image.clone())
    }

    /// 编辑场景：预置一个已处理产物的外部引用，不重新校验。
    pub fn preseed_existing(&self, reference: impl Into<String>) -> Result<(), PrepError> {
        self.lock_inner()?.existing_reference = Some(reference.into());
        Ok(())
    }

    /// 宿主预置的外部引用（若有）。
    pub fn existing_reference(&self) -> Result<Option<String>, PrepError> {
        Ok(self.lock_inner()?.existing_reference.clone())
    }

    /// 点燃当前运行的取消标志。已中止的在途工作不再提交任何状态。
    pub fn abort(&self) -> Result<(), PrepError> {
        let inner = self.lock_inner()?;
        inner.cancel_flag.store(true, Ordering::SeqCst);
        log::info!("🛑 已发出中止信号（generation={}）", inner.generation);
        Ok(())
    }

    /// 仅当代号一致且取消标志未触发时提交状态变更。
    fn commit_if_current<F>(&self, generation: u64, flag: &AtomicBool, mutate: F) -> Result<bool, PrepError>
    where
        F: FnOnce(&mut Inner),
    {
        let mut inner = self.lock_inner()?;
        if inner.generation != generation || flag.load(Ordering::SeqCst) {
            return Ok(false);
        }
        mutate(&mut inner);
        Ok(true)
    }

    /// 选择（或替换）文件：进入校验阶段，校验通过后进入裁剪阶段。
    ///
    /// 任何在途运行都被本次选择取代；替换失败不破坏已完成产物。
    pub async fn select_file(&self, asset: SourceAsset) -> Result<(), PrepError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let (generation, flag) = {
            let mut inner = self.lock_inner()?;
            // 取代上一次运行
            inner.cancel_flag.store(true, Ordering::SeqCst);
            inner.generation += 1;
            inner.cancel_flag = Arc::new(AtomicBool::new(false));

            inner.stage = UploadStage::Validating;
            inner.progress = 10;
            inner.error_message = None;
            inner.original_byte_size = asset.byte_size;
            // processed_byte_size 不动：替换失败时快照仍要反映幸存产物
            inner.source = Some(asset.clone());
            inner.bitmap = None;
            inner.session = None;
            inner.preview_image = None;

            (inner.generation, Arc::clone(&inner.cancel_flag))
        };

        log::info!(
            "📥 开始校验 - 文件: {} 类型: {} 体积: {:.2} KB",
            asset.file_name,
            asset.declared_mime,
            asset.byte_size as f64 / 1024.0
        );

        let result = self
            .run_validation(&asset, &config, generation, &flag)
            .await;

        match result {
            Ok(bitmap) => {
                let committed = self.commit_if_current(generation, &flag, |inner| {
                    inner.bitmap = Some(bitmap);
                    inner.session = Some(CropSession::new());
                    inner.stage = UploadStage::Cropping;
                    inner.progress = 0;
                })?;
                if !committed {
                    return Err(PrepError::Aborted);
                }
                log::info!(
                    "✅ 校验通过，进入裁剪 - 耗时 {}ms",
                    total_start.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) if err.is_silent() => Err(err),
            Err(err) => {
                let message = err.to_string();
                self.commit_if_current(generation, &flag, |inner| {
                    inner.stage = UploadStage::Error;
                    inner.progress = 0;
                    inner.error_message = Some(message.clone());
                    inner.source = None;
                })?;
                log::warn!("❌ 校验失败（{}）：{}", err.code(), message);
                Err(err)
            }
        }
    }

    /// 校验子流程：类型 → 体积 → 尺寸 → 解码，逐检查点上报进度。
    async fn run_validation(
        &self,
        asset: &SourceAsset,
        config: &UploadConfig,
        generation: u64,
        flag: &AtomicBool,
    ) -> Result<crate::asset::NaturalBitmap, PrepError> {
        let checkpoint = |progress: u8| -> Result<(), PrepError> {
            if flag.load(Ordering::SeqCst) {
                return Err(PrepError::Aborted);
            }
            self.commit_if_current(generation, flag, |inner| inner.progress = progress)?;
            Ok(())
        };

        validator::validate_type(asset)?;
        checkpoint(20)?;

        validator::validate_size(asset, config.max_size_mb)?;
        checkpoint(30)?;

        validator::validate_dimensions(asset, config)?;
        checkpoint(50)?;

        // 解码是潜在挂起点：让出一次调度再做重活
        tokio::task::yield_now().await;
        if flag.load(Ordering::SeqCst) {
            return Err(PrepError::Aborted);
        }
        decode_bitmap(&asset.bytes)
    }

    /// 在裁剪会话上执行一次同步交互变更。
    ///
    /// 返回 `Some(ticket)` 表示状态有变化且预览已失效，
    /// 宿主应随后调用 [`Self::refresh_preview`] 驱动去抖重算。
    pub fn with_session<F>(&self, mutate: F) -> Result<Option<u64>, PrepError>
    where
        F: FnOnce(&mut CropSession) -> bool,
    {
        let mut inner = self.lock_inner()?;
        if inner.stage != UploadStage::Cropping {
            return Err(PrepError::NoImageLoaded);
        }
        let session = inner.session.as_mut().ok_or(PrepError::NoImageLoaded)?;
        if mutate(session) {
            Ok(Some(self.preview.invalidate()))
        } else {
            Ok(None)
        }
    }

    pub fn begin_pan(&self) -> Result<(), PrepError> {
        self.with_session(|s| {
            s.begin_pan();
            false
        })?;
        Ok(())
    }

    pub fn begin_resize(&self, handle: ResizeHandle) -> Result<(), PrepError> {
        self.with_session(|s| {
            s.begin_resize(handle);
            false
        })?;
        Ok(())
    }

    pub fn end_pointer(&self) -> Result<(), PrepError> {
        self.with_session(|s| {
            s.end_pointer();
            false
        })?;
        Ok(())
    }

    pub fn pointer_move(
        &self,
        delta_x_px: f64,
        delta_y_px: f64,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Result<Option<u64>, PrepError> {
        self.with_session(|s| s.pointer_move(delta_x_px, delta_y_px, viewport_width, viewport_height))
    }

    pub fn set_zoom(&self, factor: f64) -> Result<Option<u64>, PrepError> {
        self.with_session(|s| s.set_zoom(factor))
    }

    pub fn zoom_in(&self) -> Result<Option<u64>, PrepError> {
        self.with_session(|s| s.zoom_in())
    }

    pub fn zoom_out(&self) -> Result<Option<u64>, PrepError> {
        self.with_session(|s| s.zoom_out())
    }

    pub fn translate_region(
        &self,
        delta_x_pct: f64,
        delta_y_pct: f64,
    ) -> Result<Option<u64>, PrepError> {
        self.with_session(|s| s.translate_region(delta_x_pct, delta_y_pct))
    }

    /// 去抖重算一次裁剪预览（轻量滤镜，跳过压缩编码）。
    ///
    /// 票据过期或会话已结束时静默返回 `Ok(None)`。
    pub async fn refresh_preview(
        &self,
        ticket: u64,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Result<Option<CropBuffer>, PrepError> {
        let config = self.config_snapshot()?;
        let (bitmap, transform, region, generation) = {
            let inner = self.lock_inner()?;
            if inner.stage != UploadStage::Cropping {
                return Ok(None);
            }
            let session = inner.session.as_ref().ok_or(PrepError::NoImageLoaded)?;
            (
                inner.bitmap.clone(),
                session.transform(),
                session.region(),
                inner.generation,
            )
        };

        let result = self
            .preview
            .refresh(ticket, || {
                let layout = MeasuredLayout::derive(
                    bitmap.as_ref().map(|b| b.width).unwrap_or(0),
                    bitmap.as_ref().map(|b| b.height).unwrap_or(0),
                    &transform,
                    viewport_width,
                    viewport_height,
                );
                extract(bitmap.as_ref(), &region, &layout, config.preview_filter)
            })
            .await?;

        if let Some(buffer) = &result {
            let mut inner = self.lock_inner()?;
            if inner.generation == generation && inner.stage == UploadStage::Cropping {
                inner.preview_image = Some(buffer.clone());
            }
        }
        Ok(result)
    }

    /// 确认裁剪：提取 → 压缩编码 → 完成。
    ///
    /// 处理失败丢弃裁剪状态（宿主需重新选择文件）；
    /// 中止/被取代的运行不产生任何状态变迁。
    pub async fn confirm_crop(
        &self,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Result<(), PrepError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let (bitmap, transform, region, source, generation, flag) = {
            let mut inner = self.lock_inner()?;
            if inner.stage != UploadStage::Cropping {
                return Err(PrepError::NoImageLoaded);
            }
            // 已中止的运行在进入处理前就退出，不留下任何状态变迁
            if inner.cancel_flag.load(Ordering::SeqCst) {
                return Err(PrepError::Aborted);
            }
            let session = inner.session.as_ref().ok_or(PrepError::NoImageLoaded)?;
            let bitmap = inner.bitmap.clone().ok_or(PrepError::NoImageLoaded)?;
            let source = inner.source.clone().ok_or(PrepError::NoImageLoaded)?;
            let snapshot = (session.transform(), session.region());

            inner.stage = UploadStage::Processing;
            inner.progress = 10;

            (
                bitmap,
                snapshot.0,
                snapshot.1,
                source,
                inner.generation,
                Arc::clone(&inner.cancel_flag),
            )
        };

        let extract_start = Instant::now();
        let layout = MeasuredLayout::derive(
            bitmap.width,
            bitmap.height,
            &transform,
            viewport_width,
            viewport_height,
        );
        let crop_result = extract(Some(&bitmap), &region, &layout, config.resize_filter);
        let extract_elapsed = extract_start.elapsed();

        let outcome = match crop_result {
            Ok(crop) => {
                if flag.load(Ordering::SeqCst) {
                    return Err(PrepError::Aborted);
                }
                self.commit_if_current(generation, &flag, |inner| inner.progress = 40)?;

                if config.enable_compression {
                    // 压缩阶段进度映射到 40~90 区间
                    let inner_ref = Arc::clone(&self.inner);
                    let flag_ref = Arc::clone(&flag);
                    let on_progress = move |p: u8| {
                        if flag_ref.load(Ordering::SeqCst) {
                            return;
                        }
                        if let Ok(mut inner) = inner_ref.lock() {
                            if inner.generation == generation {
                                inner.progress = 40 + p / 2;
                            }
                        }
                    };
                    tokio::task::yield_now().await;
                    pipeline::process(
                        &crop,
                        &source.declared_mime,
                        &source.file_name,
                        &config,
                        on_progress,
                        || flag.load(Ordering::SeqCst),
                    )
                } else {
                    // 不压缩：裁剪中间图直接作为产物交付
                    let byte_size = crop.bytes.len() as u64;
                    Ok(ProcessedAsset {
                        bytes: crop.bytes,
                        mime_type: "image/png".to_string(),
                        byte_size,
                        file_name: CropBuffer::FILE_NAME.to_string(),
                    })
                }
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(asset) => {
                let delivered = asset.clone();
                let committed = self.commit_if_current(generation, &flag, |inner| {
                    inner.processed_byte_size = asset.byte_size;
                    inner.processed = Some(asset);
                    inner.stage = UploadStage::Complete;
                    inner.progress = 100;
                    inner.session = None;
                    inner.preview_image = None;
                    inner.existing_reference = None;
                })?;
                if !committed {
                    return Err(PrepError::Aborted);
                }
                log::info!(
                    "✅ 图片处理完成 - extract={}ms total={}ms 产物 {:.2} KB",
                    extract_elapsed.as_millis(),
                    total_start.elapsed().as_millis(),
                    delivered.byte_size as f64 / 1024.0
                );
                if let Some(hook) = &self.on_processed {
                    hook(&delivered);
                }
                Ok(())
            }
            Err(err) if err.is_silent() => Err(err),
            Err(err) => {
                let message = err.to_string();
                self.commit_if_current(generation, &flag, |inner| {
                    inner.stage = UploadStage::Error;
                    inner.progress = 0;
                    inner.error_message = Some(message.clone());
                    // 处理失败丢弃裁剪状态，与取消路径一致
                    inner.session = None;
                    inner.bitmap = None;
                    inner.preview_image = None;
                    inner.source = None;
                })?;
                log::warn!("❌ 处理失败（{}）：{}", err.code(), message);
                Err(err)
            }
        }
    }

    /// 取消裁剪：回到空闲，丢弃本次选择的一切中间状态。
    pub fn cancel_crop(&self) -> Result<(), PrepError> {
        let mut inner = self.lock_inner()?;
        if inner.stage != UploadStage::Cropping {
            return Ok(());
        }
        inner.cancel_flag.store(true, Ordering::SeqCst);
        inner.stage = UploadStage::Idle;
        inner.progress = 0;
        inner.error_message = None;
        inner.original_byte_size = 0;
        inner.source = None;
        inner.bitmap = None;
        inner.session = None;
        inner.preview_image = None;
        log::info!("↩️ 裁剪已取消，回到空闲");
        Ok(())
    }

    /// 错误恢复：清除错误回到空闲，宿主重新选择文件后将回到校验阶段。
    pub fn retry(&self) -> Result<(), PrepError> {
        let mut inner = self.lock_inner()?;
        if inner.stage != UploadStage::Error {
            return Ok(());
        }
        inner.stage = UploadStage::Idle;
        inner.progress = 0;
        inner.error_message = None;
        Ok(())
    }

    /// 移除当前产物并通知宿主：在途工作中止，回到空闲。
    pub fn remove(&self) -> Result<(), PrepError> {
        {
            let mut inner = self.lock_inner()?;
            inner.cancel_flag.store(true, Ordering::SeqCst);
            *inner = Inner::new();
        }
        log::info!("🗑️ 产物已移除，回到空闲");
        if let Some(hook) = &self.on_removed {
            hook();
        }
        Ok(())
    }
}
