//! Face++ v3 response bodies and their mapping onto core types.

use secureface_core::{
    DetectedFace, EmotionScores, FaceAttributes, ProviderError, SearchCandidate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error code Face++ returns when searching a faceset with no faces in it.
pub const EMPTY_FACESET: &str = "EMPTY_FACESET";

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error_message: String,
}

#[derive(Debug, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub faces: Vec<FaceBody>,
}

#[derive(Debug, Deserialize)]
pub struct FaceBody {
    pub face_token: String,
    #[serde(default)]
    pub attributes: Option<AttributesBody>,
}

#[derive(Debug, Deserialize)]
pub struct AttributesBody {
    pub age: Option<ValueBody<u32>>,
    pub gender: Option<ValueBody<String>>,
    #[serde(default)]
    pub emotion: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub struct ValueBody<T> {
    pub value: T,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResultBody>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResultBody {
    pub face_token: String,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
pub struct AddFaceResponse {
    pub face_added: u32,
    #[serde(default)]
    pub failure_detail: Vec<FailureDetail>,
}

#[derive(Debug, Deserialize)]
pub struct FailureDetail {
    pub reason: String,
    #[serde(default)]
    pub face_token: Option<String>,
}

/// Faceset summary, as returned by faceset/create and faceset/getdetail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacesetInfo {
    pub faceset_token: String,
    #[serde(default)]
    pub outer_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub face_count: u32,
    #[serde(default)]
    pub face_tokens: Vec<String>,
}

impl From<FaceBody> for DetectedFace {
    fn from(face: FaceBody) -> Self {
        let attributes = face
            .attributes
            .map(|a| FaceAttributes {
                age: a.age.map(|v| v.value),
                gender: a.gender.map(|v| v.value),
                emotion: a.emotion.into_iter().collect::<EmotionScores>(),
            })
            .unwrap_or_default();
        DetectedFace {
            face_token: face.face_token,
            attributes,
        }
    }
}

pub fn decode<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// The `error_message` of a non-2xx body, falling back to the raw body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.error_message)
        .unwrap_or_else(|_| body.trim().to_string())
}

pub fn parse_detect(body: &str) -> Result<Vec<DetectedFace>, ProviderError> {
    let response: DetectResponse = decode(body)?;
    Ok(response.faces.into_iter().map(DetectedFace::from).collect())
}

pub fn parse_search(body: &str) -> Result<Vec<SearchCandidate>, ProviderError> {
    let response: SearchResponse = decode(body)?;
    Ok(response
        .results
        .into_iter()
        .map(|r| SearchCandidate {
            face_token: r.face_token,
            confidence: r.confidence,
        })
        .collect())
}

/// Succeeds only if the token was actually added to the faceset.
pub fn parse_add_face(body: &str, face_token: &str) -> Result<(), ProviderError> {
    let response: AddFaceResponse = decode(body)?;
    if response.face_added > 0 {
        return Ok(());
    }
    let reason = response
        .failure_detail
        .into_iter()
        .find(|d| d.face_token.as_deref().map_or(true, |t| t == face_token))
        .map(|d| d.reason)
        .unwrap_or_else(|| "face not added".to_string());
    Err(ProviderError::CollectionRejected {
        face_token: face_token.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETECT_BODY: &str = r#"{
        "request_id": "1470472868,dacf2ff1-ea45-4842-9c07-6e8418cea78b",
        "time_used": 752,
        "image_id": "rT6Wda3Oyl4e41b1SA2Q4g==",
        "face_num": 1,
        "faces": [{
            "face_token": "ed319e807e039ae669a4d1af0922a0c8",
            "face_rectangle": {"width": 140, "top": 89, "left": 104, "height": 141},
            "attributes": {
                "gender": {"value": "Male"},
                "age": {"value": 30},
                "emotion": {"happiness": 10, "sadness": 80, "anger": 5, "fear": 5}
            }
        }]
    }"#;

    #[test]
    fn test_parse_detect() {
        let faces = parse_detect(DETECT_BODY).unwrap();
        assert_eq!(faces.len(), 1);
        let face = &faces[0];
        assert_eq!(face.face_token, "ed319e807e039ae669a4d1af0922a0c8");
        assert_eq!(face.attributes.age, Some(30));
        assert_eq!(face.attributes.gender.as_deref(), Some("Male"));
        assert_eq!(face.attributes.emotion.len(), 4);
        assert_eq!(face.attributes.emotion.dominant(), Some("sadness"));
    }

    #[test]
    fn test_parse_detect_no_faces() {
        let faces = parse_detect(r#"{"request_id": "x", "faces": [], "face_num": 0}"#).unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    fn test_parse_detect_without_attributes() {
        let faces = parse_detect(r#"{"faces": [{"face_token": "t1"}]}"#).unwrap();
        assert_eq!(faces[0].attributes, FaceAttributes::default());
    }

    #[test]
    fn test_parse_detect_malformed() {
        let err = parse_detect("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_search() {
        let body = r#"{
            "request_id": "1469761507,07174361-027c-46e1-811f-ba0909760b18",
            "time_used": 69,
            "thresholds": {"1e-3": 62.327, "1e-4": 69.101, "1e-5": 73.975},
            "results": [
                {"face_token": "tok123", "confidence": 90.4, "user_id": ""},
                {"face_token": "tok456", "confidence": 41.0, "user_id": ""}
            ]
        }"#;
        let candidates = parse_search(body).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].face_token, "tok123");
        assert!((candidates[0].confidence - 90.4).abs() < 1e-9);
    }

    #[test]
    fn test_parse_search_without_results() {
        let candidates = parse_search(r#"{"faces": [], "time_used": 12}"#).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_parse_add_face_success() {
        let body = r#"{"faceset_token": "fs", "face_added": 1, "face_count": 3, "failure_detail": []}"#;
        assert!(parse_add_face(body, "tok123").is_ok());
    }

    #[test]
    fn test_parse_add_face_rejected() {
        let body = r#"{
            "faceset_token": "fs", "face_added": 0, "face_count": 2,
            "failure_detail": [{"reason": "INVALID_FACE_TOKEN", "face_token": "tok123"}]
        }"#;
        let err = parse_add_face(body, "tok123").unwrap_err();
        assert_eq!(
            err,
            ProviderError::CollectionRejected {
                face_token: "tok123".into(),
                reason: "INVALID_FACE_TOKEN".into(),
            }
        );
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"error_message": "EMPTY_FACESET"}"#), EMPTY_FACESET);
        assert_eq!(error_message(" upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn test_faceset_info() {
        let body = r#"{
            "faceset_token": "42fb0d5bf81c5ac57c52344dddc3e7c9",
            "outer_id": "securefaceset",
            "display_name": "SecureFaceSet",
            "face_count": 2,
            "face_tokens": ["a", "b"],
            "next": ""
        }"#;
        let info: FacesetInfo = decode(body).unwrap();
        assert_eq!(info.outer_id.as_deref(), Some("securefaceset"));
        assert_eq!(info.face_tokens, ["a", "b"]);
    }
}
