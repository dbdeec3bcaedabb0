//! LogEvent -> MessageCard
//!
//! 纯函数，不会失败：
//! 1. 主题色取自颜色表
//! 2. title 取配置，text 取渲染后的消息
//! 3. 未省略时输出唯一的 "Properties" section：Level、MessageTemplate、counter、Occurred on，
//!    有异常时追加 Exception。其余事件属性不展开。
//! 4. 每个按钮生成一个 OpenUri 动作，顺序不变

use super::model::{Action, Fact, MessageCard, Section};
use crate::event::LogEvent;
use crate::options::SinkOptions;
use chrono::SecondsFormat;

/// Properties section 标题
pub const PROPERTIES_SECTION: &str = "Properties";

/// Fact 名称
pub mod fact {
    pub const LEVEL: &str = "Level";
    pub const MESSAGE_TEMPLATE: &str = "MessageTemplate";
    pub const COUNTER: &str = "counter";
    pub const OCCURRED_ON: &str = "Occurred on";
    pub const EXCEPTION: &str = "Exception";
}

/// 卡片构建器
pub struct CardBuilder;

impl CardBuilder {
    /// 构建卡片
    ///
    /// # Arguments
    /// * `event` - 日志事件
    /// * `options` - sink 配置（标题、按钮、颜色、是否省略 properties）
    /// * `counter` - 由 scheduler 分配的递增序号
    pub fn build(event: &LogEvent, options: &SinkOptions, counter: u64) -> MessageCard {
        let mut card = MessageCard::new(
            options.title.clone(),
            event.text(),
            options.palette.color_for(event.level),
        );

        if !options.omit_properties_section {
            card.sections = Some(vec![Self::properties_section(event, counter)]);
        }

        if !options.buttons.is_empty() {
            let actions = options
                .buttons
                .iter()
                .map(|b| Action::open_uri(b.name.clone(), b.uri.clone()))
                .collect();
            card.potential_action = Some(actions);
        }

        card
    }

    fn properties_section(event: &LogEvent, counter: u64) -> Section {
        let mut facts = vec![
            Fact::new(fact::LEVEL, event.level.as_str()),
            Fact::new(fact::MESSAGE_TEMPLATE, event.message_template.clone()),
            Fact::new(fact::COUNTER, counter.to_string()),
            Fact::new(fact::OCCURRED_ON, format_timestamp(event)),
        ];

        if let Some(exception) = &event.exception {
            let mut value = format!("{}: {}", exception.type_name, exception.message);
            if let Some(stack) = &exception.stack {
                value.push('\n');
                value.push_str(stack);
            }
            facts.push(Fact::new(fact::EXCEPTION, value));
        }

        Section {
            title: PROPERTIES_SECTION.to_string(),
            facts,
        }
    }
}

/// RFC 3339，毫秒精度，UTC 用 `Z`
fn format_timestamp(event: &LogEvent) -> String {
    event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
