use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::alerting::domain::snapshot_writer::SnapshotWriter;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Writes padded face crops as JPEG files using the `image` crate.
pub struct ImageSnapshotWriter {
    dir: PathBuf,
    padding: i32,
}

impl ImageSnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, padding: i32) -> Self {
        Self {
            dir: dir.into(),
            padding,
        }
    }

    fn file_name(camera_name: &str, person_name: &str, timestamp: SystemTime) -> String {
        let secs = timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!(
            "{}_{}_{secs}.jpg",
            sanitize(camera_name),
            sanitize(person_name)
        )
    }
}

/// Keeps names usable as a single path component.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

impl SnapshotWriter for ImageSnapshotWriter {
    fn save_crop(
        &self,
        frame: &Frame,
        bbox: &BoundingBox,
        camera_name: &str,
        person_name: &str,
        timestamp: SystemTime,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let region = bbox.padded(self.padding, frame.width(), frame.height());
        let crop = frame.crop(&region).ok_or("face box lies outside the frame")?;

        std::fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(Self::file_name(camera_name, person_name, timestamp));

        let img = image::RgbImage::from_raw(crop.width(), crop.height(), crop.data().to_vec())
            .ok_or("Failed to create image from crop data")?;
        img.save(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![90u8; (width * height * 3) as usize], width, height, 3, 0)
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_save_crop_writes_padded_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageSnapshotWriter::new(dir.path().join("alerts"), 20);
        let frame = make_frame(200, 160);

        let path = writer
            .save_crop(
                &frame,
                &BoundingBox::new(50, 40, 90, 100),
                "Lobby",
                "mallory",
                at(1_700_000_000),
            )
            .unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "Lobby_mallory_1700000000.jpg"
        );
        let img = image::open(&path).unwrap();
        assert_eq!(img.width(), 80);
        assert_eq!(img.height(), 100);
    }

    #[test]
    fn test_padding_is_clamped_to_frame() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageSnapshotWriter::new(dir.path(), 20);
        let frame = make_frame(64, 48);

        let path = writer
            .save_crop(&frame, &BoundingBox::new(0, 0, 30, 30), "Dock", "trent", at(5))
            .unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!(img.width(), 50);
        assert_eq!(img.height(), 48);
    }

    #[test]
    fn test_box_outside_frame_fails() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageSnapshotWriter::new(dir.path(), 0);
        let frame = make_frame(32, 32);
        let result = writer.save_crop(
            &frame,
            &BoundingBox::new(100, 100, 120, 120),
            "Dock",
            "trent",
            at(5),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_names_are_sanitized() {
        assert_eq!(
            ImageSnapshotWriter::file_name("Front door/2", "Eve O'Hara", at(9)),
            "Front_door_2_Eve_O_Hara_9.jpg"
        );
    }
}
