use std::str::FromStr;

use serde::Deserialize;

use crate::errors::Error;

/// Language used for the few strings the gateway itself produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en-US", alias = "en_US")]
    EnUs,
    #[serde(rename = "zh-CN", alias = "zh_CN")]
    ZhCn,
}

impl Locale {
    pub fn operation_failed_prefix(self) -> &'static str {
        match self {
            Locale::EnUs => "Operation failed: ",
            Locale::ZhCn => "操作失败：",
        }
    }

    pub fn downloading(self) -> &'static str {
        match self {
            Locale::EnUs => "Downloading...",
            Locale::ZhCn => "下载中...",
        }
    }
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "en-us" | "en" => Ok(Locale::EnUs),
            "zh-cn" | "zh" => Ok(Locale::ZhCn),
            other => Err(Error::Config(format!(
                "Unknown locale '{}'; expected 'en-US' or 'zh-CN'",
                other
            ))),
        }
    }
}
