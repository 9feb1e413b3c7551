//! 通知与短信模块
//!
//! - `NotificationSender`：账本提交后的客户通知，后台任务发送
//! - `SmsDispatcher`：验证码短信，每次发送写审计记录
//!
//! 两者都不参与账本事务，失败不会回滚已提交的流水。

pub mod channels;
pub mod sender;
pub mod service;
pub mod sms;
pub mod template;
pub mod types;

pub use sender::NotificationSender;
pub use service::NotificationService;
pub use sms::{
    HttpSmsGateway, SimulatedSmsGateway, SmsDispatcher, SmsGateway, SmsGatewayError, SmsMessage,
    build_gateway,
};
pub use template::TemplateEngine;
pub use types::{
    ChannelResult, ChannelType, Notification, NotificationKind, NotificationResult, SendStatus,
};
