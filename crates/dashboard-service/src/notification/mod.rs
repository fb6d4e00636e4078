//! 收入通知
//!
//! 邮件通知实现，聚合器通过 `RevenueNotifier` 钩子调用。

mod email;

pub use email::{EmailMessage, SendGridNotifier, daily_report_message, milestone_message};
