use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of remote classification.
///
/// Wire shape: `{"prediction": "...", "confidence": 0.82,
/// "features_used": ["..."], "timestamp": "2026-08-24T10:00:00Z"}`.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Predicted class label
    pub prediction: String,

    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,

    /// Which acoustic features the model used, in ranking order
    pub features_used: Vec<String>,

    /// When the analysis was produced (ISO-8601 on the wire)
    pub timestamp: DateTime<Utc>,
}

impl AnalysisResult {
    /// The renderable stand-in for a failed analysis request.
    ///
    /// Downstream consumers always receive something displayable; the
    /// structured error travels separately in the session outcome.
    pub fn error_placeholder() -> Self {
        Self {
            prediction: "Error".to_string(),
            confidence: 0.0,
            features_used: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_backend_payload() {
        let json = r#"{
            "prediction": "ASD_Detected",
            "confidence": 0.82,
            "features_used": ["pitch_var", "pause_ratio"],
            "timestamp": "2026-08-24T10:00:00Z"
        }"#;

        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.prediction, "ASD_Detected");
        assert!((result.confidence - 0.82).abs() < f32::EPSILON);
        assert_eq!(result.features_used, vec!["pitch_var", "pause_ratio"]);
    }

    #[test]
    fn serializes_features_used_field_name() {
        let result = AnalysisResult::error_placeholder();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"features_used\":[]"));
        assert!(json.contains("\"prediction\":\"Error\""));
        assert!(json.contains("\"confidence\":0"));
    }
}
