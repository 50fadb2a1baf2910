//! Project-brief intake.
//!
//! Multipart submissions arrive as free-form text fields plus optional
//! file fields. Text is folded into one formatted brief; files become
//! store assets referenced from the order. A failed upload degrades to
//! a note inside the brief text so the submission itself never fails on
//! the asset pipeline.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::clients::content::{ContentStore, DocumentPatch};
use crate::errors::ServiceError;

/// One text answer from the intake form.
#[derive(Debug, Clone)]
pub struct IntakeField {
    pub label: String,
    pub value: String,
}

/// One uploaded file from the intake form, keyed by its form field name.
#[derive(Debug, Clone)]
pub struct IntakeFile {
    pub field_key: String,
    pub filename: String,
    pub data: Bytes,
}

/// Folds the text answers into the stored brief format:
/// one `label:\nvalue` block per answer, blank-line separated.
pub fn fold_brief(fields: &[IntakeField]) -> String {
    let mut brief = String::new();
    for field in fields {
        brief.push_str(&field.label);
        brief.push_str(":\n");
        brief.push_str(&field.value);
        brief.push_str("\n\n");
    }
    brief
}

#[derive(Clone)]
pub struct BriefService {
    store: Arc<dyn ContentStore>,
}

impl BriefService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Attaches a submitted brief to its order in a single patch.
    #[instrument(skip(self, fields, files))]
    pub async fn submit(
        &self,
        order_id: &str,
        fields: &[IntakeField],
        files: &[IntakeFile],
    ) -> Result<(), ServiceError> {
        let mut brief = fold_brief(fields);
        let mut file_entries: Vec<Value> = Vec::new();

        for file in files {
            match self
                .store
                .upload_asset(&file.filename, file.data.clone())
                .await
            {
                Ok(asset_id) => {
                    file_entries.push(json!({
                        "_type": "file",
                        "_key": file.field_key,
                        "asset": { "_type": "reference", "_ref": asset_id },
                    }));
                }
                Err(err) => {
                    warn!(filename = %file.filename, error = %err, "brief file upload failed");
                    brief.push_str(&format!("[File Upload FAILED: {}]\n\n", file.filename));
                }
            }
        }

        let mut patch = DocumentPatch::new(order_id).set("projectBrief", json!(brief));
        if !file_entries.is_empty() {
            patch = patch.set("briefFiles", json!(file_entries));
        }
        self.store.patch(patch).await?;

        info!(order_id = %order_id, files = files.len(), "brief attached to order");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStore;

    #[test]
    fn fold_formats_label_value_blocks() {
        let fields = vec![
            IntakeField {
                label: "Project goals".into(),
                value: "A fast site".into(),
            },
            IntakeField {
                label: "Deadline".into(),
                value: "Next month".into(),
            },
        ];
        assert_eq!(
            fold_brief(&fields),
            "Project goals:\nA fast site\n\nDeadline:\nNext month\n\n"
        );
    }

    #[tokio::test]
    async fn submit_patches_brief_and_file_references() {
        let store = Arc::new(MockStore::new());
        let order_id = store.seed_one_off_order("pi_1", "svc1", "new", "a@b.com", "A B");
        let svc = BriefService::new(store.clone());

        let fields = vec![IntakeField {
            label: "Goals".into(),
            value: "Launch".into(),
        }];
        let files = vec![IntakeFile {
            field_key: "logo".into(),
            filename: "logo.png".into(),
            data: Bytes::from_static(b"png-bytes"),
        }];
        svc.submit(&order_id, &fields, &files).await.unwrap();

        let doc = store.document(&order_id).unwrap();
        assert_eq!(doc["projectBrief"], json!("Goals:\nLaunch\n\n"));
        let entries = doc["briefFiles"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["_key"], json!("logo"));
        assert_eq!(entries[0]["asset"]["_type"], json!("reference"));
    }

    #[tokio::test]
    async fn failed_upload_degrades_to_a_note() {
        let store = Arc::new(MockStore::new());
        let order_id = store.seed_one_off_order("pi_1", "svc1", "new", "a@b.com", "A B");
        store.fail_asset_upload("broken.pdf");
        let svc = BriefService::new(store.clone());

        let files = vec![IntakeFile {
            field_key: "spec".into(),
            filename: "broken.pdf".into(),
            data: Bytes::from_static(b"pdf-bytes"),
        }];
        svc.submit(&order_id, &[], &files).await.unwrap();

        let doc = store.document(&order_id).unwrap();
        let brief = doc["projectBrief"].as_str().unwrap();
        assert!(brief.contains("[File Upload FAILED: broken.pdf]"));
        assert!(doc.get("briefFiles").map(|v| v.is_null()).unwrap_or(true));
    }
}
