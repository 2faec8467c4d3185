//! 日志脱敏
//! 记录命令前遮盖其中的密码、令牌等敏感片段

use once_cell::sync::Lazy;
use regex::Regex;

/// 脱敏规则
struct RedactRule {
    pattern: Regex,
    replacement: &'static str,
}

static RULES: Lazy<Vec<RedactRule>> = Lazy::new(|| {
    vec![
        // 密码相关
        RedactRule {
            pattern: Regex::new(r"(?i)(password|passwd|pwd)([\s=:]+)[^\s]+").unwrap(),
            replacement: "$1$2***",
        },
        // Token / API Key / Secret
        RedactRule {
            pattern: Regex::new(
                r"(?i)(token|api[_-]?key|secret|private[_-]?key)([\s=:]+)[^\s]+",
            )
            .unwrap(),
            replacement: "$1$2***",
        },
        // sshpass -p <password>
        RedactRule {
            pattern: Regex::new(r"(sshpass\s+-p\s*)[^\s]+").unwrap(),
            replacement: "$1***",
        },
        // URL 中的用户密码
        RedactRule {
            pattern: Regex::new(r"://([^:/\s]+):[^@/\s]+@").unwrap(),
            replacement: "://$1:***@",
        },
    ]
});

/// 遮盖文本中的敏感信息
pub fn redact(text: &str) -> String {
    RULES.iter().fold(text.to_string(), |acc, rule| {
        rule.pattern
            .replace_all(&acc, rule.replacement)
            .into_owned()
    })
}
