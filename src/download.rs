use std::path::PathBuf;

use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::Error;

/// A file the server asked the client to save.
#[derive(Clone, Debug)]
pub struct Attachment {
    /// Sanitized base name; may be empty when the server supplied none.
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Receives attachment downloads.
pub trait AttachmentSink: Send + Sync {
    fn save(&self, attachment: Attachment) -> Result<(), Error>;
}

/// Writes attachments into a directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl AttachmentSink for DirectorySink {
    fn save(&self, attachment: Attachment) -> Result<(), Error> {
        let file_name = if attachment.file_name.is_empty() {
            // A file cannot be created without a name.
            let generated = format!("download-{}", Uuid::new_v4());
            warn!(generated = %generated, "attachment carried no file name");
            generated
        } else {
            attachment.file_name
        };
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::Attachment(format!("cannot create {}: {e}", self.dir.display()))
        })?;
        let path = self.dir.join(&file_name);
        std::fs::write(&path, &attachment.data)
            .map_err(|e| Error::Attachment(format!("cannot write {}: {e}", path.display())))?;
        info!(path = %path.display(), size = attachment.data.len(), "attachment.saved");
        Ok(())
    }
}
