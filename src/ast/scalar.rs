//! YAML 1.2 core-schema tag resolution
//!
//! Plain scalars resolve by pattern; quoted and block scalars are always
//! strings. Explicit tags win.

use once_cell::sync::Lazy;
use regex::Regex;

use super::node::Style;

static NULL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:~|null|Null|NULL|)$").unwrap());

static BOOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:true|True|TRUE|false|False|FALSE)$").unwrap());

static INT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-+]?[0-9]+|0o[0-7]+|0x[0-9a-fA-F]+)$").unwrap());

static FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[-+]?(?:\.[0-9]+|[0-9]+(?:\.[0-9]*)?)(?:[eE][-+]?[0-9]+)?|[-+]?\.(?:inf|Inf|INF)|\.(?:nan|NaN|NAN))$",
    )
    .unwrap()
});

/// Resolved scalar tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Null,
    Bool,
    Int,
    Float,
    Str,
    /// Any other explicit tag, kept verbatim
    Custom(String),
}

impl Tag {
    pub fn as_str(&self) -> &str {
        match self {
            Tag::Null => "!!null",
            Tag::Bool => "!!bool",
            Tag::Int => "!!int",
            Tag::Float => "!!float",
            Tag::Str => "!!str",
            Tag::Custom(tag) => tag,
        }
    }

    fn from_explicit(tag: &str) -> Self {
        match tag {
            "!!null" | "tag:yaml.org,2002:null" => Tag::Null,
            "!!bool" | "tag:yaml.org,2002:bool" => Tag::Bool,
            "!!int" | "tag:yaml.org,2002:int" => Tag::Int,
            "!!float" | "tag:yaml.org,2002:float" => Tag::Float,
            "!!str" | "tag:yaml.org,2002:str" | "!" => Tag::Str,
            other => Tag::Custom(other.to_string()),
        }
    }
}

/// Resolve the effective tag of a scalar
pub fn resolve(explicit: &str, value: &str, style: Style) -> Tag {
    if !explicit.is_empty() {
        return Tag::from_explicit(explicit);
    }
    if style != Style::Plain {
        return Tag::Str;
    }
    implicit(value)
}

fn implicit(value: &str) -> Tag {
    if NULL_RE.is_match(value) {
        Tag::Null
    } else if BOOL_RE.is_match(value) {
        Tag::Bool
    } else if INT_RE.is_match(value) {
        Tag::Int
    } else if FLOAT_RE.is_match(value) {
        Tag::Float
    } else {
        Tag::Str
    }
}

/// True when a string written plain would not read back as a string
pub fn needs_quotes(value: &str) -> bool {
    implicit(value) != Tag::Str
        || value.starts_with(|c: char| c.is_whitespace() || "&*!|>'\"%@`#-?:,[]{}".contains(c))
        || value.ends_with(char::is_whitespace)
        || value.contains(": ")
        || value.contains(" #")
        || value.contains('\n')
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

pub fn parse_int(value: &str) -> Option<i128> {
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let magnitude = if let Some(hex) = digits.strip_prefix("0x") {
        i128::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = digits.strip_prefix("0o") {
        i128::from_str_radix(oct, 8).ok()?
    } else {
        digits.parse::<i128>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

pub fn parse_float(value: &str) -> Option<f64> {
    match value {
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => Some(f64::INFINITY),
        "-.inf" | "-.Inf" | "-.INF" => Some(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => Some(f64::NAN),
        _ => value.parse::<f64>().ok().or_else(|| parse_int(value).map(|i| i as f64)),
    }
}

/// Canonical text for a float (`.inf`, `.nan`, always with a decimal point)
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        ".nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { ".inf" } else { "-.inf" }.to_string()
    } else {
        let text = value.to_string();
        if text.contains(['.', 'e', 'E']) {
            text
        } else {
            format!("{}.0", text)
        }
    }
}
