//! Video URI parsing
//!
//! Handles URIs like:
//!   test:[size=160x120,n=1,fmt=RGB24]//
//!   convert:[fmt=RGB24]//files:///data/seq/img%04d.png
//!   mjpeg://http://127.0.0.1/?action=stream
//!   join:{test:[n=1]//}{test:[size=320x240]//}
//!   /home/user/capture.pango   (bare path, treated as file://)

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

// Two or more characters so Windows drive letters stay paths
static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9_+\-]+):").expect("valid scheme regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("Unterminated parameter list in '{0}'")]
    UnterminatedParams(String),
    #[error("Malformed parameter '{0}' (expected key=value)")]
    MalformedParam(String),
    #[error("Invalid value '{value}' for parameter '{key}'")]
    InvalidValue { key: String, value: String },
    #[error("Unbalanced braces in join list '{0}'")]
    UnbalancedBraces(String),
}

/// A parsed `scheme:[key=value,...]//url` video URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoUri {
    pub scheme: String,
    pub params: BTreeMap<String, String>,
    pub url: String,
}

impl VideoUri {
    pub fn parse(input: &str) -> Result<Self, UriError> {
        let input = input.trim();

        let Some(caps) = SCHEME_RE.captures(input) else {
            return Ok(Self {
                scheme: "file".to_string(),
                params: BTreeMap::new(),
                url: input.to_string(),
            });
        };

        let scheme = caps["scheme"].to_ascii_lowercase();
        let mut rest = &input[caps[0].len()..];

        let mut params = BTreeMap::new();
        if rest.starts_with('[') {
            let close = matching_close(rest, '[', ']')
                .ok_or_else(|| UriError::UnterminatedParams(input.to_string()))?;
            for item in split_top_level(&rest[1..close], ',') {
                let item = item.trim();
                if item.is_empty() {
                    continue;
                }
                let (key, value) = item
                    .split_once('=')
                    .ok_or_else(|| UriError::MalformedParam(item.to_string()))?;
                params.insert(key.trim().to_string(), value.trim().to_string());
            }
            rest = &rest[close + 1..];
        }

        let url = rest.strip_prefix("//").unwrap_or(rest).to_string();

        Ok(Self { scheme, params, url })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Typed parameter lookup with a default for absent keys
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, UriError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| UriError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, UriError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(UriError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            },
        }
    }

    /// `WxH` size parameter
    pub fn get_size(&self, key: &str, default: (u32, u32)) -> Result<(u32, u32), UriError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        let invalid = || UriError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let (w, h) = value.split_once(['x', 'X']).ok_or_else(invalid)?;
        let w = w.trim().parse().map_err(|_| invalid())?;
        let h = h.trim().parse().map_err(|_| invalid())?;
        Ok((w, h))
    }

    /// Child URIs of a `join:` URI, written as `{uri}{uri}...`
    pub fn braced_children(&self) -> Result<Vec<String>, UriError> {
        let mut children = Vec::new();
        let mut rest = self.url.trim();
        while !rest.is_empty() {
            if !rest.starts_with('{') {
                return Err(UriError::UnbalancedBraces(self.url.clone()));
            }
            let close = matching_close(rest, '{', '}')
                .ok_or_else(|| UriError::UnbalancedBraces(self.url.clone()))?;
            children.push(rest[1..close].to_string());
            rest = rest[close + 1..].trim_start();
        }
        Ok(children)
    }
}

impl FromStr for VideoUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VideoUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "[{}]", params.join(","))?;
        }
        write!(f, "//{}", self.url)
    }
}

/// Index of the bracket closing the one at position 0
fn matching_close(s: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}
