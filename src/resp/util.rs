//! Custom serialization of `DateTime<Utc>` to conform to the JWT spec
//! (RFC 7519 section 2, "Numeric Date").
pub mod date_time_as_unix_seconds {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serializes a DateTime<Utc> to a Unix timestamp (seconds since 1970/1/1T00:00:00T)
    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(date.timestamp())
    }

    /// Attempts to deserialize an i64 and use as a Unix timestamp
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Utc.timestamp_opt(i64::deserialize(deserializer)?, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom("Invalid Unix timestamp value."))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{SubsecRound, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Stamp {
        #[serde(with = "super::date_time_as_unix_seconds")]
        at: chrono::DateTime<Utc>,
    }

    #[test]
    fn unix_seconds_round_trip() {
        let now = Utc::now().round_subsecs(0);
        let encoded = serde_json::to_string(&Stamp { at: now }).unwrap();
        let decoded: Stamp = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.at, now);
    }
}
