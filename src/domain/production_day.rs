// ==========================================
// 注塑生产时段追踪 - 生产日
// ==========================================
// 生产日 = 当日 08:00 → 次日 08:00 (不按午夜切分)
// 切换生产日时, 所有产线的内存状态全部重置
// ==========================================

use crate::domain::types::TimeWindow;
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 生产日起点小时
pub const PRODUCTION_DAY_START_HOUR: u32 = 8;

// ==========================================
// ProductionDay - 生产日
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductionDay {
    pub date: NaiveDate, // 生产日键 (非提交时的墙钟日期)
}

impl ProductionDay {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    fn day_start_time() -> NaiveTime {
        NaiveTime::from_hms_opt(PRODUCTION_DAY_START_HOUR, 0, 0).unwrap_or_default()
    }

    /// 生产日起点 (当日 08:00)
    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(Self::day_start_time())
    }

    /// 生产日终点 (次日 08:00, 不含)
    pub fn end(&self) -> NaiveDateTime {
        self.next().start()
    }

    /// 下一个生产日
    pub fn next(&self) -> ProductionDay {
        ProductionDay::new(self.date.checked_add_days(Days::new(1)).unwrap_or(self.date))
    }

    /// 给定墙钟时刻所属的生产日
    ///
    /// # 规则
    /// - 08:00 之前 → 前一日的生产日
    /// - 08:00 及之后 → 当日的生产日
    pub fn containing(at: NaiveDateTime) -> ProductionDay {
        let date = at.date();
        if at.time() < Self::day_start_time() {
            ProductionDay::new(date.checked_sub_days(Days::new(1)).unwrap_or(date))
        } else {
            ProductionDay::new(date)
        }
    }

    /// 时段在本生产日内的绝对起始时刻
    ///
    /// 00-02 ~ 06-08 落在次日
    pub fn window_start(&self, window: TimeWindow) -> NaiveDateTime {
        let date = if window.is_next_calendar_day() {
            self.next().date
        } else {
            self.date
        };
        date.and_time(window.start_time())
    }

    /// 时段在本生产日内的绝对结束时刻
    pub fn window_end(&self, window: TimeWindow) -> NaiveDateTime {
        match TimeWindow::from_index(window.index() + 1) {
            Some(next_window) => self.window_start(next_window),
            None => self.end(),
        }
    }

    /// 包含给定时刻的时段 (时刻不在本生产日内时返回 None)
    pub fn window_at(&self, at: NaiveDateTime) -> Option<TimeWindow> {
        if at < self.start() || at >= self.end() {
            return None;
        }
        Some(TimeWindow::containing(at.time()))
    }
}

impl fmt::Display for ProductionDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%d"))
    }
}

impl From<NaiveDate> for ProductionDay {
    fn from(date: NaiveDate) -> Self {
        ProductionDay::new(date)
    }
}
