use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static SHORTCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{<\s*([A-Za-z][\w-]*)((?:\s+[\w-]+=\x22[^\x22]*\x22)*)\s*>\}\}").unwrap());

static ARG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\w-]+)="([^"]*)""#).unwrap());

#[derive(Debug, Error)]
pub enum ShortcodeError {
    #[error("短代码 {name} 执行失败：{message}")]
    Failed { name: String, message: String },
}

/// 对正文、摘要等文本做短代码展开
pub trait ShortcodeRenderer: Send + Sync {
    fn render(&self, input: &str, locale: &str) -> Result<String, ShortcodeError>;
}

/// 原样返回输入
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl ShortcodeRenderer for Passthrough {
    fn render(&self, input: &str, _locale: &str) -> Result<String, ShortcodeError> {
        Ok(input.to_owned())
    }
}

/// 一次短代码调用：`{{< name key="value" >}}`
#[derive(Debug, Clone)]
pub struct ShortcodeCall<'a> {
    pub name: &'a str,
    pub args: BTreeMap<&'a str, &'a str>,
    pub locale: &'a str,
}

type Handler = Box<dyn Fn(&ShortcodeCall<'_>) -> Result<String, ShortcodeError> + Send + Sync>;

/// 基于正则的短代码注册表；未注册的短代码保持原文
#[derive(Default)]
pub struct ShortcodeRegistry {
    handlers: HashMap<String, Handler>,
}

impl ShortcodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&ShortcodeCall<'_>) -> Result<String, ShortcodeError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_owned(), Box::new(handler));
    }

    pub fn with<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&ShortcodeCall<'_>) -> Result<String, ShortcodeError> + Send + Sync + 'static,
    {
        self.register(name, handler);
        self
    }
}

impl fmt::Debug for ShortcodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("ShortcodeRegistry")
            .field("handlers", &names)
            .finish()
    }
}

impl ShortcodeRenderer for ShortcodeRegistry {
    fn render(&self, input: &str, locale: &str) -> Result<String, ShortcodeError> {
        if !input.contains("{{<") {
            return Ok(input.to_owned());
        }

        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in SHORTCODE_RE.captures_iter(input) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&input[last..whole.start()]);
            last = whole.end();

            let call = parse_call(&caps, locale);
            match self.handlers.get(call.name) {
                Some(handler) => out.push_str(&handler(&call)?),
                None => {
                    tracing::warn!("未知短代码 {}，保留原文", call.name);
                    out.push_str(whole.as_str());
                }
            }
        }
        out.push_str(&input[last..]);
        Ok(out)
    }
}

fn parse_call<'a>(caps: &Captures<'a>, locale: &'a str) -> ShortcodeCall<'a> {
    let name = caps.get(1).map_or("", |m| m.as_str());
    let args = caps
        .get(2)
        .map(|m| {
            ARG_RE
                .captures_iter(m.as_str())
                .filter_map(|a| Some((a.get(1)?.as_str(), a.get(2)?.as_str())))
                .collect()
        })
        .unwrap_or_default();
    ShortcodeCall { name, args, locale }
}
