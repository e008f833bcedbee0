use serde::{Deserialize, Serialize};

use crate::constants::ResultCode;

/// Envelope wrapping every backend response.
///
/// `data` is left as a raw JSON value until the caller knows the call
/// succeeded, because failed calls usually omit it entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T = serde_json::Value> {
    pub code: i32,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl<T> ApiResponse<T> {
    /// Builds a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            code: crate::constants::CODE_SUCCESS,
            data: Some(data),
            message: String::new(),
        }
    }

    /// Builds a failed response with no data.
    pub fn fail(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            data: None,
            message: message.into(),
        }
    }

    /// Classifies the envelope code.
    pub fn result_code(&self) -> ResultCode {
        ResultCode::classify(self.code)
    }
}

impl ApiResponse<serde_json::Value> {
    /// Deserializes `data` into the given type.
    ///
    /// Returns `Ok(None)` when `data` is absent or JSON `null`.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(T::deserialize(value)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::TaskInfo;

    #[test]
    fn parse_success_envelope() {
        let json = r#"{"code":200,"message":"ok","data":"upload-1"}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.result_code(), ResultCode::Success);
        let id: Option<String> = resp.parse_data().unwrap();
        assert_eq!(id.as_deref(), Some("upload-1"));
    }

    #[test]
    fn parse_envelope_without_data() {
        let json = r#"{"code":401,"message":"token expired"}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.result_code(), ResultCode::SessionFatal);
        assert_eq!(resp.message, "token expired");
        let data: Option<String> = resp.parse_data().unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn parse_null_data() {
        let json = r#"{"code":200,"data":null}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        let data: Option<TaskInfo> = resp.parse_data().unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn parse_data_type_mismatch_is_error() {
        let json = r#"{"code":200,"data":{"unexpected":true}}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        assert!(resp.parse_data::<String>().is_err());
    }

    #[test]
    fn fail_omits_empty_message() {
        let resp: ApiResponse<String> = ApiResponse::fail(500, "");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("message"));
    }
}
