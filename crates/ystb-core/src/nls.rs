use crate::error::{Error, Result};
use encoding_rs::{Encoding as RsEncoding, GB18030, SHIFT_JIS, UTF_8};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::str::FromStr;

/// Code page used for string literals, text lines and label names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Encoding {
    #[default]
    ShiftJis,
    Utf8,
    /// Treat GBK as GB18030 (superset).
    Gbk,
}

impl Encoding {
    #[inline]
    pub fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            Encoding::ShiftJis => SHIFT_JIS,
            Encoding::Utf8 => UTF_8,
            Encoding::Gbk => GB18030,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::ShiftJis => "sjis",
            Encoding::Utf8 => "utf8",
            Encoding::Gbk => "gbk",
        }
    }

    /// Strict encode: unrepresentable characters are an error.
    pub fn encode(self, s: &str) -> Result<Vec<u8>> {
        let (cow, _, had_errors) = self.as_encoding_rs().encode(s);
        if had_errors {
            return Err(Error::Encoding {
                encoding: self.name(),
                text: s.to_string(),
            });
        }
        Ok(cow.into_owned())
    }

    pub fn decode<'a>(self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (cow, _, had_errors) = self.as_encoding_rs().decode(bytes);
        if had_errors {
            log::warn!("{} decode error in {} byte(s) of text", self.name(), bytes.len());
        }
        cow
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sjis" | "shiftjis" | "shift_jis" | "shift-jis" | "cp932" => Ok(Encoding::ShiftJis),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "gbk" | "gb18030" | "cp936" => Ok(Encoding::Gbk),
            other => Err(format!("unsupported nls: {other}")),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Encoding> for String {
    fn from(e: Encoding) -> Self {
        e.name().to_string()
    }
}
