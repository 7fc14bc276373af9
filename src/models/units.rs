//! 长度单位解析
//!
//! 页面尺寸、出血等参数以 CSS 长度字符串给出（如 `210mm`、`8.5in`），
//! 内部统一换算为毫米。

use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;

const MM_PER_INCH: f64 = 25.4;

static LENGTH_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?|\.\d+)\s*(mm|cm|in|pt|px)?\s*$"));

/// 非负长度，内部以毫米存储
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[serde(try_from = "LengthInput")]
pub struct Length {
    mm: f64,
}

/// 反序列化时接受数字（毫米）或带单位的字符串
#[derive(Deserialize)]
#[serde(untagged)]
enum LengthInput {
    Number(f64),
    Text(String),
}

impl TryFrom<LengthInput> for Length {
    type Error = String;

    fn try_from(input: LengthInput) -> Result<Self, Self::Error> {
        match input {
            LengthInput::Number(mm) if mm.is_finite() && mm >= 0.0 => Ok(Self::from_mm(mm)),
            LengthInput::Number(mm) => Err(format!("无效的长度: {}", mm)),
            LengthInput::Text(text) => Self::parse(&text),
        }
    }
}

impl Length {
    pub const ZERO: Length = Length { mm: 0.0 };

    pub fn from_mm(mm: f64) -> Self {
        Self { mm }
    }

    /// 解析 CSS 长度字符串，无单位时按毫米处理
    pub fn parse(text: &str) -> Result<Self, String> {
        let re = LENGTH_PATTERN
            .as_ref()
            .map_err(|e| format!("长度正则表达式无效: {}", e))?;
        let captures = re
            .captures(text)
            .ok_or_else(|| format!("无法解析长度: '{}'", text))?;

        let value: f64 = captures[1]
            .parse()
            .map_err(|_| format!("无法解析长度数值: '{}'", text))?;

        let factor = match captures.get(2).map(|m| m.as_str()) {
            None | Some("mm") => 1.0,
            Some("cm") => 10.0,
            Some("in") => MM_PER_INCH,
            Some("pt") => MM_PER_INCH / 72.0,
            Some("px") => MM_PER_INCH / 96.0,
            Some(other) => return Err(format!("不支持的长度单位: {}", other)),
        };

        Ok(Self::from_mm(value * factor))
    }

    pub fn mm(self) -> f64 {
        self.mm
    }

    pub fn inches(self) -> f64 {
        self.mm / MM_PER_INCH
    }

    pub fn is_zero(self) -> bool {
        self.mm <= f64::EPSILON
    }
}

impl std::ops::Add for Length {
    type Output = Length;

    fn add(self, rhs: Length) -> Length {
        Length::from_mm(self.mm + rhs.mm)
    }
}

impl std::ops::Mul<f64> for Length {
    type Output = Length;

    fn mul(self, rhs: f64) -> Length {
        Length::from_mm(self.mm * rhs)
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}mm", self.mm)
    }
}
