use std::{fmt::Display, num::ParseIntError, str::FromStr};

/// A byte count, displayed and parsed with `K`/`M`/`G`/`T` power-of-1024 suffixes.
///
/// Used for derived, never-persisted fields such as `size`/`used`/`available`
/// in the reconciler's enriched read view; the manifest itself stores raw
/// device identifiers, not sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteCount(pub u64);

impl From<u64> for ByteCount {
    fn from(x: u64) -> Self {
        ByteCount(x)
    }
}

impl ByteCount {
    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn to_human_readable(self) -> String {
        match self.0.trailing_zeros() {
            _ if self.0 == 0 => "0".to_owned(),
            0..=9 => format!("{}", self.0),
            10..=19 => format!("{}K", self.0 >> 10),
            20..=29 => format!("{}M", self.0 >> 20),
            30..=39 => format!("{}G", self.0 >> 30),
            _ => format!("{}T", self.0 >> 40),
        }
    }

    pub fn from_human_readable(s: &str) -> Result<Self, ParseIntError> {
        let s = s.trim();
        let try_parse = |val: &str, shift: u8| Ok(Self(val.trim().parse::<u64>()? << shift));
        if let Some(p) = s.strip_suffix('K') {
            try_parse(p, 10)
        } else if let Some(p) = s.strip_suffix('M') {
            try_parse(p, 20)
        } else if let Some(p) = s.strip_suffix('G') {
            try_parse(p, 30)
        } else if let Some(p) = s.strip_suffix('T') {
            try_parse(p, 40)
        } else {
            try_parse(s, 0)
        }
    }
}

impl Display for ByteCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

impl FromStr for ByteCount {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_human_readable(s)
    }
}

impl<'de> serde::Deserialize<'de> for ByteCount {
    fn deserialize<D>(deserializer: D) -> Result<ByteCount, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // lsblk's `--bytes --json` output emits sizes as either a bare
        // number or (for some fields) a quoted string; accept both.
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => ByteCount::from_str(&s)
                .map_err(|e| serde::de::Error::custom(format!("invalid byte count: {e}"))),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(ByteCount)
                .ok_or_else(|| serde::de::Error::custom("byte count must be a non-negative integer")),
            _ => Err(serde::de::Error::custom("invalid byte count")),
        }
    }
}

impl serde::Serialize for ByteCount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_power_of_1024_suffixes() {
        assert_eq!(ByteCount(0).to_human_readable(), "0");
        assert_eq!(ByteCount(512).to_human_readable(), "512");
        assert_eq!(ByteCount(10 * 1024).to_human_readable(), "10K");
        assert_eq!(ByteCount(4 * 1024 * 1024 * 1024).to_human_readable(), "4G");
    }

    #[test]
    fn parses_human_readable_round_trip() {
        for s in ["0", "512", "10K", "4G", "2T"] {
            let parsed = ByteCount::from_human_readable(s).unwrap();
            assert_eq!(parsed.to_human_readable(), s);
        }
    }

    #[test]
    fn deserializes_numeric_json() {
        let v: ByteCount = serde_json::from_str("4096").unwrap();
        assert_eq!(v.bytes(), 4096);
    }
}
