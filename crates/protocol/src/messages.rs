use serde::{Deserialize, Serialize};

use crate::constants::TaskCode;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens (or reuses) a multipart session for a content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub file_identifier: String,
    pub total_size: u64,
    pub chunk_num: u32,
    pub chunk_size: u64,
    pub file_name: String,
}

/// Form fields of a part upload, excluding the binary `file` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPartFields {
    pub upload_id: String,
    /// 1-based part sequence number.
    pub part_number: u32,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// A part already stored server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartSummary {
    /// 1-based part sequence number.
    pub part_number: u32,
    #[serde(default, rename = "eTag", skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Dedup and resume state for a content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub code: TaskCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_part_list: Option<Vec<PartSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TaskInfo {
    /// Returns the upload id unless it is absent or blank.
    ///
    /// The backend sends `""` rather than omitting the field.
    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns the object reference for an instant upload: url first, then name.
    pub fn object_ref(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.object_name.as_deref().filter(|n| !n.is_empty()))
    }

    /// Returns the 1-based part numbers already present.
    pub fn present_part_numbers(&self) -> Vec<u32> {
        self.exit_part_list
            .as_ref()
            .map(|parts| parts.iter().map(|p| p.part_number).collect())
            .unwrap_or_default()
    }
}

/// A stored file as returned by the listing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: i64,
    #[serde(default)]
    pub origin_file_name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub upload_time: String,
    #[serde(default)]
    pub md5: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_request_camel_case() {
        let req = InitUploadRequest {
            file_identifier: "abc".into(),
            total_size: 100,
            chunk_num: 5,
            chunk_size: 20,
            file_name: "movie.mp4".into(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["fileIdentifier"], "abc");
        assert_eq!(v["totalSize"], 100);
        assert_eq!(v["chunkNum"], 5);
        assert_eq!(v["chunkSize"], 20);
        assert_eq!(v["fileName"], "movie.mp4");
    }

    #[test]
    fn task_info_uploading_with_parts() {
        let json = r#"{
            "code": 2002,
            "uploadId": "u-9",
            "exitPartList": [
                {"partNumber": 1, "eTag": "e1", "size": 10},
                {"partNumber": 3}
            ]
        }"#;
        let info: TaskInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.code, TaskCode::Uploading);
        assert_eq!(info.upload_id(), Some("u-9"));
        assert_eq!(info.present_part_numbers(), vec![1, 3]);
        let parts = info.exit_part_list.as_ref().unwrap();
        assert_eq!(parts[0].etag.as_deref(), Some("e1"));
    }

    #[test]
    fn task_info_blank_upload_id_is_none() {
        let info: TaskInfo = serde_json::from_str(r#"{"code":2003,"uploadId":""}"#).unwrap();
        assert_eq!(info.upload_id(), None);
        assert!(info.present_part_numbers().is_empty());
    }

    #[test]
    fn task_info_object_ref_prefers_url() {
        let info: TaskInfo = serde_json::from_str(
            r#"{"code":2001,"url":"https://cdn/x.bin","objectName":"2024/x.bin"}"#,
        )
        .unwrap();
        assert_eq!(info.object_ref(), Some("https://cdn/x.bin"));

        let info: TaskInfo =
            serde_json::from_str(r#"{"code":2001,"url":"","objectName":"2024/x.bin"}"#).unwrap();
        assert_eq!(info.object_ref(), Some("2024/x.bin"));
    }

    #[test]
    fn file_entry_tolerates_missing_fields() {
        let json = r#"[
            {"id": 7, "originFileName": "a.bin", "size": 2048,
             "url": "https://cdn/a.bin", "uploadTime": "2024-05-01 10:00:00",
             "md5": "0cc175b9c0f1b6a831c399e269772661"},
            {"id": 8}
        ]"#;
        let entries: Vec<FileEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].origin_file_name, "a.bin");
        assert_eq!(entries[0].size, 2048);
        assert_eq!(entries[0].upload_time, "2024-05-01 10:00:00");
        assert_eq!(entries[1].id, 8);
        assert!(entries[1].url.is_empty());
    }
}
