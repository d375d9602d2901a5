use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::geometry::drop_offset;
use crate::types::Point;

/// Why an incoming file did not become an item.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntakeRejection {
    #[error("{name}: no file extension")]
    MissingExtension { name: String },

    #[error("{name}: {mime} is not a video type")]
    NotVideo { name: String, mime: String },
}

/// A file that passed the media-type check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceptedFile {
    pub name: String,
    pub mime: String,
    /// Placement for the item; `None` means random placement.
    pub drop_point: Option<Point>,
}

/// Map a file name to its media type by extension.
pub fn mime_for(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ogv" => "video/ogg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    };
    Some(mime)
}

/// Accept a single file if its media type is `video/*`.
pub fn classify(name: &str) -> Result<AcceptedFile, IntakeRejection> {
    let mime = mime_for(name).ok_or_else(|| IntakeRejection::MissingExtension {
        name: name.to_string(),
    })?;
    if !mime.starts_with("video/") {
        return Err(IntakeRejection::NotVideo {
            name: name.to_string(),
            mime: mime.to_string(),
        });
    }
    Ok(AcceptedFile {
        name: name.to_string(),
        mime: mime.to_string(),
        drop_point: None,
    })
}

/// Files chosen through the file picker. Placement is random.
pub fn from_picker<'a, I>(names: I) -> (Vec<AcceptedFile>, Vec<IntakeRejection>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for name in names {
        match classify(name) {
            Ok(file) => accepted.push(file),
            Err(reason) => {
                tracing::debug!(%reason, "file skipped");
                rejected.push(reason);
            }
        }
    }
    (accepted, rejected)
}

/// Files dropped on the canvas at `drop`. The n-th accepted file is offset
/// by `n * step` on both axes so the items do not overlap exactly.
pub fn from_drop<'a, I>(names: I, drop: Point, step: f64) -> (Vec<AcceptedFile>, Vec<IntakeRejection>)
where
    I: IntoIterator<Item = &'a str>,
{
    let (mut accepted, rejected) = from_picker(names);
    for (index, file) in accepted.iter_mut().enumerate() {
        file.drop_point = Some(drop_offset(drop, index, step));
    }
    (accepted, rejected)
}
