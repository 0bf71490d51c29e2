use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::debug;

/// Extensions accepted as batch inputs, compared case-insensitively.
pub const SUPPORTED_IMAGE_EXTENSIONS: [&str; 7] =
    ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "psd"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub modified_at: SystemTime,
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("cannot read input folder '{}': {source}", .path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn has_supported_extension(path: &Path, allowed_extensions: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    allowed_extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext.as_str()))
}

/// Lists `input_folder` (non-recursive) and returns at most `max_count`
/// image files, newest first.
pub fn select_recent_images(
    input_folder: &Path,
    allowed_extensions: &[&str],
    max_count: usize,
) -> Result<Vec<FileDescriptor>, SelectionError> {
    let unreadable = |source: io::Error| SelectionError::DirectoryUnreadable {
        path: input_folder.to_path_buf(),
        source,
    };

    let mut candidates = Vec::new();
    for entry in fs::read_dir(input_folder).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        if !has_supported_extension(path.as_path(), allowed_extensions) {
            continue;
        }

        // Entries can vanish between listing and stat.
        let metadata = match fs::metadata(path.as_path()) {
            Ok(metadata) => metadata,
            Err(error) => {
                debug!(path = %path.display(), error = %error, "skipping unreadable entry");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified_at) = metadata.modified() else {
            debug!(path = %path.display(), "skipping entry without modification time");
            continue;
        };

        candidates.push(FileDescriptor {
            name: entry.file_name().to_string_lossy().to_string(),
            path,
            modified_at,
        });
    }

    let scanned = candidates.len();
    let selected = rank_most_recent(candidates, max_count);
    debug!(
        input = %input_folder.display(),
        scanned,
        selected = selected.len(),
        "selected recent images"
    );
    Ok(selected)
}

/// Newest first; equal timestamps keep their incoming order.
pub fn rank_most_recent(
    mut candidates: Vec<FileDescriptor>,
    max_count: usize,
) -> Vec<FileDescriptor> {
    candidates.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    candidates.truncate(max_count);
    candidates
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::{Duration, UNIX_EPOCH};

    use pretty_assertions::assert_eq;

    use super::*;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "psmcp_selection_{label}_{}",
            uuid::Uuid::new_v4().simple()
        ));
        fs::create_dir_all(dir.as_path()).expect("temp dir should be creatable");
        dir
    }

    fn touch(dir: &Path, name: &str, unix_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(path.as_path()).expect("file should be creatable");
        file.set_modified(UNIX_EPOCH + Duration::from_secs(unix_secs))
            .expect("mtime should be settable");
        path
    }

    fn descriptor(name: &str, unix_secs: u64) -> FileDescriptor {
        FileDescriptor {
            name: name.to_string(),
            path: PathBuf::from(name),
            modified_at: UNIX_EPOCH + Duration::from_secs(unix_secs),
        }
    }

    fn names(files: &[FileDescriptor]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(has_supported_extension(
            Path::new("/x/PHOTO.JPG"),
            &SUPPORTED_IMAGE_EXTENSIONS
        ));
        assert!(has_supported_extension(
            Path::new("layered.Psd"),
            &SUPPORTED_IMAGE_EXTENSIONS
        ));
        assert!(has_supported_extension(Path::new("a.tiff"), &[".tiff"]));
        assert!(!has_supported_extension(
            Path::new("notes.txt"),
            &SUPPORTED_IMAGE_EXTENSIONS
        ));
        assert!(!has_supported_extension(
            Path::new("jpg"),
            &SUPPORTED_IMAGE_EXTENSIONS
        ));
        assert!(!has_supported_extension(
            Path::new("scan.tif"),
            &SUPPORTED_IMAGE_EXTENSIONS
        ));
    }

    #[test]
    fn picks_five_newest_of_seven_in_descending_order() {
        let dir = temp_dir("seven");
        for i in 1..=7u64 {
            touch(dir.as_path(), format!("img_{i}.jpg").as_str(), 1_700_000_000 + i * 60);
        }

        let selected =
            select_recent_images(dir.as_path(), &SUPPORTED_IMAGE_EXTENSIONS, 5).expect("select");

        assert_eq!(
            names(&selected),
            vec!["img_7.jpg", "img_6.jpg", "img_5.jpg", "img_4.jpg", "img_3.jpg"]
        );
        assert!(selected.iter().all(|f| f.path.starts_with(dir.as_path())));
        assert!(selected
            .windows(2)
            .all(|pair| pair[0].modified_at > pair[1].modified_at));
    }

    #[test]
    fn filters_unsupported_files_and_directories() {
        let dir = temp_dir("filter");
        touch(dir.as_path(), "a.png", 1_700_000_100);
        touch(dir.as_path(), "b.TIFF", 1_700_000_200);
        touch(dir.as_path(), "readme.md", 1_700_000_300);
        touch(dir.as_path(), "archive.zip", 1_700_000_400);
        fs::create_dir_all(dir.join("nested.jpg")).expect("dir should be creatable");
        touch(dir.join("nested.jpg").as_path(), "deep.jpg", 1_700_000_500);

        let selected =
            select_recent_images(dir.as_path(), &SUPPORTED_IMAGE_EXTENSIONS, 10).expect("select");

        assert_eq!(names(&selected), vec!["b.TIFF", "a.png"]);
    }

    #[test]
    fn returns_all_when_fewer_than_max_count() {
        let dir = temp_dir("few");
        touch(dir.as_path(), "one.gif", 1_700_000_000);
        touch(dir.as_path(), "two.bmp", 1_700_000_010);

        let selected =
            select_recent_images(dir.as_path(), &SUPPORTED_IMAGE_EXTENSIONS, 5).expect("select");
        assert_eq!(names(&selected), vec!["two.bmp", "one.gif"]);
    }

    #[test]
    fn empty_folder_is_not_an_error() {
        let dir = temp_dir("empty");
        touch(dir.as_path(), "notes.txt", 1_700_000_000);

        let selected =
            select_recent_images(dir.as_path(), &SUPPORTED_IMAGE_EXTENSIONS, 5).expect("select");
        assert!(selected.is_empty());
    }

    #[test]
    fn missing_folder_is_directory_unreadable() {
        let missing = std::env::temp_dir().join(format!(
            "psmcp_selection_missing_{}",
            uuid::Uuid::new_v4().simple()
        ));
        let err = select_recent_images(missing.as_path(), &SUPPORTED_IMAGE_EXTENSIONS, 5)
            .expect_err("missing folder must fail");
        let SelectionError::DirectoryUnreadable { path, source } = err;
        assert_eq!(path, missing);
        assert_eq!(source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn file_path_as_input_folder_is_directory_unreadable() {
        let dir = temp_dir("file_input");
        let file = touch(dir.as_path(), "single.jpg", 1_700_000_000);
        let err = select_recent_images(file.as_path(), &SUPPORTED_IMAGE_EXTENSIONS, 5)
            .expect_err("a file is not a folder");
        assert!(matches!(err, SelectionError::DirectoryUnreadable { .. }));
    }

    #[test]
    fn ranking_is_stable_on_equal_timestamps() {
        let ranked = rank_most_recent(
            vec![
                descriptor("first.jpg", 100),
                descriptor("newest.jpg", 300),
                descriptor("second.jpg", 100),
                descriptor("third.jpg", 100),
                descriptor("middle.jpg", 200),
            ],
            4,
        );
        assert_eq!(
            names(&ranked),
            vec!["newest.jpg", "middle.jpg", "first.jpg", "second.jpg"]
        );
    }

    #[test]
    fn ranking_with_zero_max_count_is_empty() {
        assert!(rank_most_recent(vec![descriptor("a.jpg", 1)], 0).is_empty());
    }
}
