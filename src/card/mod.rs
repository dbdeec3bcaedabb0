//! MessageCard 构建与序列化
//!
//! `model` 定义 JSON 线上格式，`builder` 负责 LogEvent -> MessageCard，
//! `color` 是级别到主题色的全映射表。

pub mod builder;
pub mod color;
pub mod model;

pub use builder::CardBuilder;
pub use color::{ColorPalette, DEFAULT_COLOR};
pub use model::{Action, ActionTarget, Fact, MessageCard, Section};
