use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serializer};
use tracing::warn;

/// Turn the text after `image: ` into bytes.
///
/// `data:image/...;base64,<data>` payloads are decoded; anything else is kept
/// as its raw bytes.
pub fn decode_payload(payload: &str) -> Vec<u8> {
    let payload = payload.trim();
    if payload.starts_with("data:image") {
        if let Some((_, data)) = payload.split_once(',') {
            match STANDARD.decode(data) {
                Ok(bytes) => return bytes,
                Err(e) => warn!("image data url is not valid base64, keeping raw: {e}"),
            }
        }
    }
    payload.as_bytes().to_vec()
}

/// Serde helpers storing `Option<Vec<u8>>` as a base64 string in documents.
pub mod base64_opt {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_is_base64_decoded() {
        assert_eq!(decode_payload("data:image/png;base64,aGk="), b"hi".to_vec());
    }

    #[test]
    fn plain_payload_is_kept_raw() {
        assert_eq!(decode_payload(" frame-42 "), b"frame-42".to_vec());
    }
}
