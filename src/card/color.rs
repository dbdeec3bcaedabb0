//! 级别 -> 主题色
//!
//! 颜色表按 `LogLevel::ALL` 的顺序存放，数组长度由类型保证覆盖全部级别。

use crate::event::LogLevel;

/// 缺省颜色（Verbose / Debug 也使用它）
pub const DEFAULT_COLOR: &str = "777777";

/// 默认颜色表，顺序与 `LogLevel::ALL` 一致
const DEFAULT_PALETTE: [&str; 6] = [
    DEFAULT_COLOR, // Verbose
    DEFAULT_COLOR, // Debug
    "5bc0de",      // Information
    "ffc83d",      // Warning
    "d9534f",      // Error
    "8b0000",      // Fatal
];

/// 级别颜色表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPalette {
    colors: [String; 6],
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_PALETTE.map(|c| c.to_string()),
        }
    }
}

impl ColorPalette {
    /// 取某个级别的颜色（总是 6 位小写 hex）
    pub fn color_for(&self, level: LogLevel) -> &str {
        &self.colors[level.index()]
    }

    /// 覆盖颜色；调用方需先经过 `normalize_color`
    pub(crate) fn set(&mut self, level: LogLevel, color: String) {
        self.colors[level.index()] = color;
    }
}

/// 规范化颜色：去掉 `#`，转小写，必须是 6 位 hex
pub fn normalize_color(input: &str) -> Option<String> {
    let hex = input.trim().trim_start_matches('#');
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(hex.to_ascii_lowercase())
    } else {
        None
    }
}
