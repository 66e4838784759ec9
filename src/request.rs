use serde::{Deserialize, Serialize};

use crate::fault::InvokeFault;

/// Inbound payload: `{"inputImageUrl": "<url>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub input_image_url: String,
}

impl Request {
    /// Decodes a raw payload. Never panics; every malformed input becomes a
    /// [`InvokeFault::Decode`].
    pub fn decode(payload: &[u8]) -> Result<Self, InvokeFault> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| InvokeFault::Decode(format!("payload is not valid UTF-8: {e}")))?;
        if text.trim().is_empty() {
            return Err(InvokeFault::Decode("empty payload".into()));
        }

        let request: Request = serde_json::from_str(text)
            .map_err(|e| InvokeFault::Decode(format!("malformed request: {e}")))?;
        if request.input_image_url.trim().is_empty() {
            return Err(InvokeFault::Decode("inputImageUrl is empty".into()));
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid() {
        let req = Request::decode(br#"{"inputImageUrl": "https://example.com/kitten.jpg"}"#)
            .unwrap();
        assert_eq!(req.input_image_url, "https://example.com/kitten.jpg");
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let req = Request::decode(br#"{"inputImageUrl": "https://a/b.png", "extra": 1}"#).unwrap();
        assert_eq!(req.input_image_url, "https://a/b.png");
    }

    #[test]
    fn test_decode_missing_field() {
        let err = Request::decode(br#"{"url": "https://a/b.png"}"#).unwrap_err();
        match err {
            InvokeFault::Decode(msg) => assert!(msg.contains("inputImageUrl"), "{msg}"),
            other => panic!("unexpected fault: {other:?}"),
        }
    }

    #[test]
    fn test_decode_not_json() {
        let err = Request::decode(b"inputImageUrl=https://a/b.png").unwrap_err();
        assert!(matches!(err, InvokeFault::Decode(_)));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = Request::decode(&[0x7b, 0xff, 0xfe, 0x7d]).unwrap_err();
        match err {
            InvokeFault::Decode(msg) => assert!(msg.contains("UTF-8")),
            other => panic!("unexpected fault: {other:?}"),
        }
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(
            Request::decode(b"  \n").unwrap_err(),
            InvokeFault::Decode("empty payload".into())
        );
        assert_eq!(
            Request::decode(br#"{"inputImageUrl": " "}"#).unwrap_err(),
            InvokeFault::Decode("inputImageUrl is empty".into())
        );
    }

    #[test]
    fn test_wrong_type() {
        let err = Request::decode(br#"{"inputImageUrl": 7}"#).unwrap_err();
        assert!(matches!(err, InvokeFault::Decode(_)));
    }
}
