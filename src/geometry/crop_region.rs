//! # 裁剪框模型
//!
//! ## 设计思路
//!
//! 裁剪框以视口百分比表达，天然与视口实际像素尺寸解耦。
//! 八个方位把手各自只动自己接触的边：`n` 只动 `y/height`，
//! `e` 只动 `width`，角把手组合相邻两条边的规则。
//!
//! ## 实现思路
//!
//! 夹取发生在**每一步**而不是松手时，把手永远不会越出视口。
//! 每条边的公式与以下不变量逐步可证：
//! `x,y ∈ [0,100]`、`width,height ∈ [5,100]`、
//! `x+width ≤ 100`、`y+height ≤ 100`。

/// 最小边长（百分比）。
pub const MIN_EDGE_PCT: f64 = 5.0;

/// 八方位缩放把手。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeHandle {
    North,
    South,
    East,
    West,
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl ResizeHandle {
    fn touches_north(self) -> bool {
        matches!(self, Self::North | Self::NorthWest | Self::NorthEast)
    }

    fn touches_south(self) -> bool {
        matches!(self, Self::South | Self::SouthWest | Self::SouthEast)
    }

    fn touches_west(self) -> bool {
        matches!(self, Self::West | Self::NorthWest | Self::SouthWest)
    }

    fn touches_east(self) -> bool {
        matches!(self, Self::East | Self::NorthEast | Self::SouthEast)
    }
}

/// 视口百分比坐标下的裁剪框。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for CropRegion {
    /// 进入裁剪阶段时的初始框。
    fn default() -> Self {
        Self { x: 10.0, y: 10.0, width: 80.0, height: 60.0 }
    }
}

impl CropRegion {
    /// 按把手方向缩放，增量为视口百分比。
    ///
    /// 北/西把手移动起始边并反向补偿边长，对侧边保持不动；
    /// 南/东把手只改边长。所有分支先夹取再写回。
    pub fn resize(&mut self, handle: ResizeHandle, delta_x_pct: f64, delta_y_pct: f64) {
        if handle.touches_north() {
            let new_y = (self.y + delta_y_pct).clamp(0.0, self.y + self.height - MIN_EDGE_PCT);
            self.height -= new_y - self.y;
            self.y = new_y;
        }
        if handle.touches_south() {
            self.height = (self.height + delta_y_pct).clamp(MIN_EDGE_PCT, 100.0 - self.y);
        }
        if handle.touches_west() {
            let new_x = (self.x + delta_x_pct).clamp(0.0, self.x + self.width - MIN_EDGE_PCT);
            self.width -= new_x - self.x;
            self.x = new_x;
        }
        if handle.touches_east() {
            self.width = (self.width + delta_x_pct).clamp(MIN_EDGE_PCT, 100.0 - self.x);
        }
    }

    /// 整体平移裁剪框，只动 `x/y`，夹取保证框不出视口。
    pub fn translate(&mut self, delta_x_pct: f64, delta_y_pct: f64) {
        self.x = (self.x + delta_x_pct).clamp(0.0, 100.0 - self.width);
        self.y = (self.y + delta_y_pct).clamp(0.0, 100.0 - self.height);
    }

    /// 不变量检查，供调试断言与测试使用。
    pub fn is_within_bounds(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.width >= MIN_EDGE_PCT
            && self.height >= MIN_EDGE_PCT
            && self.x + self.width <= 100.0 + 1e-9
            && self.y + self.height <= 100.0 + 1e-9
    }
}
