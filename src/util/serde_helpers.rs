use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

/// `Option<i64>` that also accepts numeric strings (`"42"`). Empty strings and `null` count as absent.
pub mod lenient_i64 {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<NumberOrString>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(NumberOrString::Int(n)) => Ok(Some(n)),
            Some(NumberOrString::Float(f)) => {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Ok(Some(f as i64))
                } else {
                    Err(serde::de::Error::custom(format!("expected an integer, got {f}")))
                }
            }
            Some(NumberOrString::Str(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                s.parse::<i64>()
                    .map(Some)
                    .map_err(|_| serde::de::Error::custom(format!("expected an integer, got {s:?}")))
            }
        }
    }
}

/// `Option<String>` where blank strings count as absent.
pub mod non_blank {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    }
}
