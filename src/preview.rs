//! # 预览同步器模块
//!
//! ## 设计思路
//!
//! 裁剪期间用户连续拖拽/缩放，每次变化都触发一次预览重算请求。
//! 去抖窗口内的突发请求合并为一次；对“先发后至”的过期结果，
//! 用单调递增的请求序号判定——只有最新序号的结果允许落地，
//! 与完成先后无关。序号守卫而不是计时器启发式，是这里的关键。
//!
//! ## 实现思路
//!
//! - `invalidate` 自增序号并返回票据
//! - `refresh` 先去抖等待，期间若有更新票据则直接放弃；
//!   渲染完成后再次校验票据，并保证不回退到更早的已落地结果

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::PrepError;

/// 预览重算的去抖与“最新请求胜出”守卫。
pub struct PreviewSynchronizer {
    /// 最新一次失效的请求序号。
    sequence: AtomicU64,
    /// 已落地结果的请求序号。
    last_applied: Mutex<u64>,
    /// 去抖窗口。
    debounce: Duration,
}

impl PreviewSynchronizer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            last_applied: Mutex::new(0),
            debounce: Duration::from_millis(debounce_ms),
        }
    }

    /// 声明视图状态已变化，返回本次请求票据。
    pub fn invalidate(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 当前最新票据。
    pub fn current(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// 去抖等待后执行一次预览渲染。
    ///
    /// 返回值：
    /// - `Ok(Some(_))`：本票据仍是最新，结果已被采纳
    /// - `Ok(None)`：票据已过期（被更新请求取代），结果被静默丢弃
    /// - `Err(_)`：渲染本身失败
    pub async fn refresh<T, F>(&self, ticket: u64, render: F) -> Result<Option<T>, PrepError>
    where
        F: FnOnce() -> Result<T, PrepError>,
    {
        tokio::time::sleep(self.debounce).await;

        if self.current() != ticket {
            return Ok(None);
        }

        let result = render()?;

        if !self.try_apply(ticket) {
            return Ok(None);
        }
        Ok(Some(result))
    }

    /// 票据落地判定：必须仍是最新票据，且不回退已落地的更新结果。
    fn try_apply(&self, ticket: u64) -> bool {
        if self.current() != ticket {
            return false;
        }
        let Ok(mut last) = self.last_applied.lock() else {
            return false;
        };
        if ticket <= *last {
            return false;
        }
        *last = ticket;
        true
    }
}
