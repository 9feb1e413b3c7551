//! 通知模板引擎
//!
//! 支持 `{{variable}}` 占位符。推送模板按通知类型注册，
//! 短信验证码模板按语言注册，未注册的语言回退到 `en`。
//!
//! ```ignore
//! let engine = TemplateEngine::with_defaults();
//! let text = engine.render_sms("ar", &vars);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

use super::types::NotificationKind;

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("template regex is valid"));

/// 短信模板的回退语言
pub const FALLBACK_LANGUAGE: &str = "en";

pub struct TemplateEngine {
    push_templates: HashMap<NotificationKind, (String, String)>,
    sms_templates: HashMap<String, String>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self {
            push_templates: HashMap::new(),
            sms_templates: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut engine = Self::new();

        engine.register_template(
            NotificationKind::PointsEarned,
            "Points earned",
            "You earned {{amount}} points from {{rule_name}}.",
        );
        engine.register_template(
            NotificationKind::PointsBurned,
            "Points redeemed",
            "{{amount}} points were redeemed for order {{order_id}}.",
        );
        engine.register_template(
            NotificationKind::CouponRedeemed,
            "Coupon used",
            "Your coupon was used on order {{order_id}}.",
        );

        engine.register_sms_template(
            "en",
            "Your verification code is {{otp}}. It expires in {{minutes}} minutes.",
        );
        engine.register_sms_template(
            "ar",
            "رمز التحقق الخاص بك هو {{otp}}. صالح لمدة {{minutes}} دقائق.",
        );

        engine
    }

    pub fn register_template(
        &mut self,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) {
        self.push_templates.insert(kind, (title.into(), body.into()));
    }

    /// 语言代码按主语言归一，`ar-SA` 与 `ar` 共用模板
    pub fn register_sms_template(&mut self, language_code: &str, template: impl Into<String>) {
        self.sms_templates
            .insert(primary_language(language_code), template.into());
    }

    pub fn get_template(&self, kind: NotificationKind) -> Option<(&str, &str)> {
        self.push_templates
            .get(&kind)
            .map(|(title, body)| (title.as_str(), body.as_str()))
    }

    /// 替换 `{{variable}}`，缺失的变量保留原样
    pub fn render(&self, template: &str, variables: &HashMap<String, String>) -> String {
        VARIABLE_RE
            .replace_all(template, |caps: &Captures| {
                let name = &caps[1];
                match variables.get(name) {
                    Some(value) => value.clone(),
                    None => {
                        warn!(variable = name, "模板变量未找到，保留原样");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    /// 渲染推送通知的标题与正文，未注册的类型返回 None
    pub fn render_push(
        &self,
        kind: NotificationKind,
        variables: &HashMap<String, String>,
    ) -> Option<(String, String)> {
        let (title, body) = self.get_template(kind)?;
        Some((self.render(title, variables), self.render(body, variables)))
    }

    /// 渲染短信正文，返回实际使用的语言
    pub fn render_sms(
        &self,
        language_code: &str,
        variables: &HashMap<String, String>,
    ) -> (String, String) {
        let language = primary_language(language_code);
        let (language, template) = match self.sms_templates.get(&language) {
            Some(template) => (language, template),
            None => match self.sms_templates.get(FALLBACK_LANGUAGE) {
                Some(template) => (FALLBACK_LANGUAGE.to_string(), template),
                None => return (FALLBACK_LANGUAGE.to_string(), String::new()),
            },
        };
        (language, self.render(template, variables))
    }
}

fn primary_language(language_code: &str) -> String {
    language_code
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
