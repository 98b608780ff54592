// ==========================================
// 注塑生产时段追踪 - 领域类型定义
// ==========================================
// 红线: 12 个固定检验时段, 顺序固定 (08:00 起算的滚动生产日)
// ==========================================

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 检验时段 (Time Window)
// ==========================================
// 变体按生产日内的先后顺序声明, Ord 即规范顺序
// 命名: H{起始小时}
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeWindow {
    H08, // 08-10
    H10, // 10-12
    H12, // 12-14
    H14, // 14-16
    H16, // 16-18
    H18, // 18-20
    H20, // 20-22
    H22, // 22-00
    H00, // 00-02
    H02, // 02-04
    H04, // 04-06
    H06, // 06-08
}

impl TimeWindow {
    /// 规范时段序列 (生产日顺序)
    pub const ALL: [TimeWindow; 12] = [
        TimeWindow::H08,
        TimeWindow::H10,
        TimeWindow::H12,
        TimeWindow::H14,
        TimeWindow::H16,
        TimeWindow::H18,
        TimeWindow::H20,
        TimeWindow::H22,
        TimeWindow::H00,
        TimeWindow::H02,
        TimeWindow::H04,
        TimeWindow::H06,
    ];

    /// 时段在规范序列中的下标 (0..12)
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// 按下标取时段
    pub fn from_index(index: usize) -> Option<TimeWindow> {
        Self::ALL.get(index).copied()
    }

    /// 起始小时 (0-23)
    pub fn start_hour(&self) -> u32 {
        ((8 + 2 * self.index()) % 24) as u32
    }

    /// 结束小时 (0-23, 22-00 的结束小时为 0)
    pub fn end_hour(&self) -> u32 {
        (self.start_hour() + 2) % 24
    }

    pub fn start_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour(), 0, 0).unwrap_or_default()
    }

    pub fn end_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.end_hour(), 0, 0).unwrap_or_default()
    }

    /// 存储编码, 例如 "08-10"
    pub fn code(&self) -> String {
        format!("{:02}-{:02}", self.start_hour(), self.end_hour())
    }

    /// 显示标签, 例如 "08:00 - 10:00"
    pub fn label(&self) -> String {
        format!("{:02}:00 - {:02}:00", self.start_hour(), self.end_hour())
    }

    /// 所属班次
    ///
    /// # 规则
    /// - 08-10 ~ 18-20 → 白班
    /// - 20-22 ~ 06-08 → 夜班
    pub fn shift(&self) -> Shift {
        if self.index() < 6 {
            Shift::Day
        } else {
            Shift::Night
        }
    }

    /// 时段是否落在生产日的次日 (00:00 之后)
    pub fn is_next_calendar_day(&self) -> bool {
        self.index() >= 8
    }

    /// 查找包含给定时刻的时段
    pub fn containing(time: NaiveTime) -> TimeWindow {
        let hour = time.hour() as usize;
        // 08:00 为第 0 个时段起点
        let offset = (hour + 24 - 8) % 24;
        Self::ALL[offset / 2]
    }

    /// 解析时段
    ///
    /// 接受:
    /// - 存储编码 "08-10"
    /// - 显示标签 "08:00 - 10:00"
    /// - 旧版编码 "24-02" (等价于 "00-02")
    pub fn parse(raw: &str) -> Option<TimeWindow> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let (start, end) = compact.split_once('-')?;
        let start_hour = parse_hour(start)?;
        let end_hour = parse_hour(end)?;

        Self::ALL
            .iter()
            .copied()
            .find(|w| w.start_hour() == start_hour && w.end_hour() == end_hour)
    }
}

/// 解析 "HH" 或 "HH:00", 24 视为 0
fn parse_hour(raw: &str) -> Option<u32> {
    let (hour, minute) = match raw.split_once(':') {
        Some((h, m)) => (h, Some(m)),
        None => (raw, None),
    };
    if let Some(minute) = minute {
        if minute.parse::<u32>().ok()? != 0 {
            return None;
        }
    }
    match hour.parse::<u32>().ok()? {
        24 => Some(0),
        h if h < 24 => Some(h),
        _ => None,
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==========================================
// 班次 (Shift)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Shift {
    Day,   // 白班
    Night, // 夜班
}

impl Shift {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Day => "day",
            Shift::Night => "night",
        }
    }

    pub fn parse(raw: &str) -> Option<Shift> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" => Some(Shift::Day),
            "night" => Some(Shift::Night),
            _ => None,
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 报表类型 (Report Kind)
// ==========================================
// 存储鉴别字段, 同一张记录表承载两种质量流程
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportKind {
    CavityWeight, // 班次穴重追踪
    FirstPieces,  // 首件尺寸确认
}

impl ReportKind {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ReportKind::CavityWeight => "CAVITY_WEIGHT",
            ReportKind::FirstPieces => "FIRST_PIECES",
        }
    }

    pub fn from_db_str(raw: &str) -> Option<ReportKind> {
        match raw {
            "CAVITY_WEIGHT" => Some(ReportKind::CavityWeight),
            "FIRST_PIECES" => Some(ReportKind::FirstPieces),
            _ => None,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 公差判定 (Tolerance Class)
// ==========================================
// 顺序: NoData < Exact < WithinTolerance < OutOfTolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToleranceClass {
    NoData,         // 无数据 (界面不显示, 非错误)
    Exact,          // 与标准值一致
    WithinTolerance, // 公差带内
    OutOfTolerance, // 超差
}

impl fmt::Display for ToleranceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToleranceClass::NoData => write!(f, "NO_DATA"),
            ToleranceClass::Exact => write!(f, "EXACT"),
            ToleranceClass::WithinTolerance => write!(f, "WITHIN_TOLERANCE"),
            ToleranceClass::OutOfTolerance => write!(f, "OUT_OF_TOLERANCE"),
        }
    }
}

// ==========================================
// 时段状态 (Slot Status)
// ==========================================
// 派生状态, 不单独存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Pending,    // 待录入
    InProgress, // 录入中
    Completed,  // 已提交
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Pending => write!(f, "PENDING"),
            SlotStatus::InProgress => write!(f, "IN_PROGRESS"),
            SlotStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}
