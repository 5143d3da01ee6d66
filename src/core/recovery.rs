//! 错误分类与恢复引擎
//!
//! 上游 LLM / 工具层不提供类型化错误，只能按错误文本分类：
//! CLASSIFICATION_TABLE 是有序的 (模式, 类别) 表，按顺序首个命中者胜出，属于公开契约。
//! RecoveryEngine 再结合错误来源（抛出 / 嵌在输出中）与剩余次数给出 RecoveryAction。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::core::RecoveryAction;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 搜索/工具正常返回了零结果，不是故障
    NoData,
    /// 网络、超时、SSL、协议层错误，丢弃会话后可重试
    Recoverable,
    /// 其余一切：立即失败
    Fatal,
}

/// 有序分类表（小写子串匹配）。NoData 排在前面：同时命中时按无数据处理。
pub const CLASSIFICATION_TABLE: &[(&str, ErrorCategory)] = &[
    ("no web results", ErrorCategory::NoData),
    ("no results found", ErrorCategory::NoData),
    ("err_http2_protocol_error", ErrorCategory::Recoverable),
    ("net::err_", ErrorCategory::Recoverable),
    ("page.goto:", ErrorCategory::Recoverable),
    ("timeout", ErrorCategory::Recoverable),
    ("connection refused", ErrorCategory::Recoverable),
    ("connection reset", ErrorCategory::Recoverable),
    ("ssl_error", ErrorCategory::Recoverable),
    ("certificate", ErrorCategory::Recoverable),
    ("name not resolved", ErrorCategory::Recoverable),
    ("### error", ErrorCategory::Recoverable),
];

fn matches_category(text: &str, category: ErrorCategory) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    CLASSIFICATION_TABLE
        .iter()
        .any(|(pattern, c)| *c == category && lower.contains(pattern))
}

/// 按分类表顺序给错误文本归类；无命中（含空文本）为 Fatal
pub fn classify(text: &str) -> ErrorCategory {
    let lower = text.to_lowercase();
    CLASSIFICATION_TABLE
        .iter()
        .find(|(pattern, _)| !lower.is_empty() && lower.contains(pattern))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Fatal)
}

/// 文本中是否含可恢复的网络错误
pub fn is_recoverable(text: &str) -> bool {
    matches_category(text, ErrorCategory::Recoverable)
}

/// 文本是否表示「没有找到数据」
pub fn is_no_data(text: &str) -> bool {
    matches_category(text, ErrorCategory::NoData)
}

static URL_RE: OnceLock<Regex> = OnceLock::new();

/// 与输出解析共用的 URL 模式
pub(crate) fn url_regex() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(r#"https?://[^\s)"'`\]<>]+"#).unwrap())
}

/// 提取错误文本中的第一个 URL（去掉末尾标点），用于下一次尝试的排除提示
pub fn extract_failed_url(text: &str) -> Option<String> {
    url_regex()
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string())
}

/// 错误出现的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// 执行器调用直接返回 Err
    Raised,
    /// 调用成功，但最终文本里描述了工具失败
    Output,
}

/// 根据类别、来源与剩余次数决定恢复动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// attempt 从 0 开始；max_retries 为本次 run 的总尝试次数
    pub fn handle(
        &self,
        category: ErrorCategory,
        source: ErrorSource,
        attempt: usize,
        max_retries: usize,
    ) -> RecoveryAction {
        let has_more = attempt + 1 < max_retries;
        match (source, category) {
            (ErrorSource::Raised, ErrorCategory::NoData) => RecoveryAction::ReturnPartial,
            (_, ErrorCategory::Recoverable) if has_more => RecoveryAction::ResetAndRetry,
            // 输出中的错误在最后一次尝试里被当作 Agent 自己的最终回答
            (ErrorSource::Output, ErrorCategory::Recoverable) => RecoveryAction::ReturnOutput,
            (ErrorSource::Output, _) => RecoveryAction::ReturnOutput,
            (ErrorSource::Raised, _) => RecoveryAction::Abort,
        }
    }
}
