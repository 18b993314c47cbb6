//! アップロード対象ファイルの選択
//!
//! ファイル・フォルダ指定を画像ファイルのキューに展開する。
//! 対応外の拡張子はスキップして報告し、空の選択はネットワーク呼び出し前にエラーとする。

use crate::error::{InspectError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub file_name: String,
    pub mime: &'static str,
}

impl UploadFile {
    pub fn from_path(path: &Path) -> Option<Self> {
        let mime = mime_for(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Some(Self {
            path: path.to_path_buf(),
            file_name,
            mime,
        })
    }
}

fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// アップロード待ちファイルリスト
#[derive(Debug, Clone, Default)]
pub struct UploadQueue {
    files: Vec<UploadFile>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加してファイル名順に並べ直す
    ///
    /// 結果はファイル名で識別するため、大文字小文字を無視して同名のファイルは追加しない。
    pub fn add(&mut self, file: UploadFile) -> bool {
        let key = file.file_name.to_lowercase();
        if self.files.iter().any(|f| f.file_name.to_lowercase() == key) {
            return false;
        }
        self.files.push(file);
        self.files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        true
    }

    pub fn remove(&mut self, index: usize) -> Result<UploadFile> {
        if index >= self.files.len() {
            return Err(InspectError::InvalidInput(format!(
                "インデックスが範囲外です: {} (全{}件)",
                index,
                self.files.len()
            )));
        }
        Ok(self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadFile> {
        self.files.iter()
    }
}

/// 選択結果
#[derive(Debug, Default)]
pub struct Selection {
    pub queue: UploadQueue,
    /// 対応外としてスキップしたファイル
    pub skipped: Vec<PathBuf>,
    /// 同名ファイルが既にあるため除外したファイル
    pub duplicates: Vec<PathBuf>,
}

/// 指定パスから画像ファイルを収集
pub fn select_images(paths: &[PathBuf], recursive: bool) -> Result<Selection> {
    let mut selection = Selection::default();

    for path in paths {
        if !path.exists() {
            return Err(InspectError::FileNotFound(path.display().to_string()));
        }

        if path.is_dir() {
            let max_depth = if recursive { usize::MAX } else { 1 };
            for entry in WalkDir::new(path)
                .max_depth(max_depth)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                if !entry_path.is_file() || is_hidden(entry_path) {
                    continue;
                }
                push_candidate(&mut selection, entry_path);
            }
        } else {
            push_candidate(&mut selection, path);
        }
    }

    if selection.queue.is_empty() {
        let names = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(InspectError::NoImagesFound(names));
    }

    Ok(selection)
}

fn push_candidate(selection: &mut Selection, path: &Path) {
    match UploadFile::from_path(path) {
        Some(file) => {
            if !selection.queue.add(file) {
                selection.duplicates.push(path.to_path_buf());
            }
        }
        None => selection.skipped.push(path.to_path_buf()),
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;

    #[test]
    fn test_mime_for_extensions() {
        assert_eq!(mime_for(Path::new("a.jpg")), Some("image/jpeg"));
        assert_eq!(mime_for(Path::new("a.JPEG")), Some("image/jpeg"));
        assert_eq!(mime_for(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(mime_for(Path::new("a.gif")), None);
        assert_eq!(mime_for(Path::new("README")), None);
    }

    #[test]
    fn test_select_missing_path() {
        let result = select_images(&[PathBuf::from("/nonexistent/board.jpg")], false);
        assert!(matches!(result, Err(InspectError::FileNotFound(_))));
    }

    #[test]
    fn test_select_folder_skips_non_images() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();

        File::create(dir.join("c.png")).unwrap().write_all(b"dummy").unwrap();
        File::create(dir.join("a.jpg")).unwrap().write_all(b"dummy").unwrap();
        File::create(dir.join("b.JPG")).unwrap().write_all(b"dummy").unwrap();
        File::create(dir.join("notes.txt")).unwrap().write_all(b"text").unwrap();
        fs::create_dir_all(dir.join("nested")).unwrap();
        File::create(dir.join("nested").join("d.jpg")).unwrap();

        let selection = select_images(&[dir.to_path_buf()], false).unwrap();
        let names: Vec<_> = selection.queue.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.JPG", "c.png"]);
        assert_eq!(selection.skipped.len(), 1);

        let recursive = select_images(&[dir.to_path_buf()], true).unwrap();
        assert_eq!(recursive.queue.len(), 4);
    }

    #[test]
    fn test_select_only_non_images_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let txt = temp_dir.path().join("notes.txt");
        File::create(&txt).unwrap();

        let result = select_images(&[txt], false);
        assert!(matches!(result, Err(InspectError::NoImagesFound(_))));
    }

    #[test]
    fn test_queue_add_remove_clear() {
        let mut queue = UploadQueue::new();
        assert!(queue.add(UploadFile::from_path(Path::new("b.jpg")).unwrap()));
        assert!(queue.add(UploadFile::from_path(Path::new("a.png")).unwrap()));
        assert!(!queue.add(UploadFile::from_path(Path::new("b.jpg")).unwrap()));
        assert!(!queue.add(UploadFile::from_path(Path::new("other/B.JPG")).unwrap()));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.files()[0].file_name, "a.png");

        let removed = queue.remove(0).unwrap();
        assert_eq!(removed.file_name, "a.png");
        assert!(queue.remove(5).is_err());

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_select_same_name_in_two_folders() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let lot1 = dir.path().join("lot1");
        let lot2 = dir.path().join("lot2");
        fs::create_dir_all(&lot1).unwrap();
        fs::create_dir_all(&lot2).unwrap();
        File::create(lot1.join("board.jpg")).unwrap().write_all(b"1").unwrap();
        File::create(lot2.join("board.jpg")).unwrap().write_all(b"2").unwrap();

        let selection = select_images(&[lot1.clone(), lot2], false).unwrap();
        assert_eq!(selection.queue.len(), 1);
        assert_eq!(selection.queue.files()[0].path, lot1.join("board.jpg"));
        assert_eq!(selection.duplicates.len(), 1);
    }
}
