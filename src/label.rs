use std::fmt;

/// Ground-truth or predicted class of an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Label {
    Legitimate = 0,
    Spam = 1,
}

impl Label {
    pub fn is_spam(self) -> bool {
        self == Label::Spam
    }

    pub fn as_f64(self) -> f64 {
        self as u8 as f64
    }

    /// Coerce a raw label cell. Accepts `0`/`1` and integral float spellings
    /// such as `1.0`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let value = match raw.parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                let value = raw.parse::<f64>().ok()?;
                if value.fract() != 0.0 {
                    return None;
                }
                value as i64
            }
        };

        match value {
            0 => Some(Label::Legitimate),
            1 => Some(Label::Spam),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Legitimate => f.write_str("legitimate"),
            Label::Spam => f.write_str("spam"),
        }
    }
}
