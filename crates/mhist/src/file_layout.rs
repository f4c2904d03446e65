use std::path::{
    Path,
    PathBuf,
};

use tokio::{
    fs,
    io::AsyncWriteExt,
};

use crate::{
    block::Block,
    errors::Result,
};

const BLOCK_FILE_SUFFIX: &str = ".csv";

/// Descriptor of one on-disk block file. The name encodes the writing
/// block's minimum timestamp zero-padded to a fixed width, so lexicographic
/// name order equals chronological order. `max_ts` is derived from the
/// successor file; the newest file is unbounded.
#[derive(Clone, Debug, PartialEq)]
pub struct DiskFile {
    pub name: String,
    pub size: i64,
    pub min_ts: i64,
    pub max_ts: i64,
}

pub fn total_size(files: &[DiskFile]) -> i64 {
    files.iter().map(|file| file.size).sum()
}

/// The block files under one data directory. Files are immutable once
/// rotated away from newest; the newest file is append-only.
pub struct FileLayout {
    data_path: PathBuf,
}

impl FileLayout {
    pub async fn new(data_path: impl Into<PathBuf>) -> Result<Self> {
        let data_path = data_path.into();
        fs::create_dir_all(&data_path).await?;
        Ok(Self { data_path })
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.data_path.join(name)
    }

    fn file_name(min_ts: i64) -> String {
        format!("{min_ts:020}{BLOCK_FILE_SUFFIX}")
    }

    /// All block files in chronological order, with sizes and derived
    /// per-file time ranges. Foreign files in the directory are ignored.
    pub async fn sorted_file_list(&self) -> Result<Vec<DiskFile>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.data_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = name.strip_suffix(BLOCK_FILE_SUFFIX) else {
                continue;
            };
            let Ok(min_ts) = stem.parse::<i64>() else {
                continue;
            };
            let size = entry.metadata().await?.len() as i64;
            files.push(DiskFile {
                name,
                size,
                min_ts,
                max_ts: i64::MAX,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        for i in 0..files.len().saturating_sub(1) {
            files[i].max_ts = files[i + 1].min_ts.saturating_sub(1);
        }
        Ok(files)
    }

    pub async fn files_in_time_range(&self, start: i64, end: i64) -> Result<Vec<DiskFile>> {
        Ok(self
            .sorted_file_list()
            .await?
            .into_iter()
            .filter(|file| file.min_ts <= end && file.max_ts >= start)
            .collect())
    }

    pub async fn write_new_file(&self, block: &Block) -> Result<()> {
        let path = self.path_for(&Self::file_name(block.min_ts()));
        fs::write(&path, block.bytes()).await?;
        Ok(())
    }

    pub async fn append_to_file(&self, file: &DiskFile, block: &Block) -> Result<()> {
        let mut open_file = fs::OpenOptions::new()
            .append(true)
            .open(self.path_for(&file.name))
            .await?;
        open_file.write_all(block.bytes()).await?;
        Ok(())
    }

    pub async fn remove_file(&self, file: &DiskFile) -> Result<()> {
        fs::remove_file(self.path_for(&file.name)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{
        total_size,
        FileLayout,
    };
    use crate::block::Block;

    fn block_with_line(ts: i64, line: &[u8]) -> Block {
        let mut block = Block::default();
        block.add_bytes(ts, line);
        block
    }

    #[tokio::test]
    async fn test_file_names_sort_chronologically() {
        let dir = TempDir::new().unwrap();
        let layout = FileLayout::new(dir.path()).await.unwrap();

        // Written out of order; 100 would sort before 99 byte-wise without
        // the padding.
        for ts in [100, 99, 1000] {
            layout
                .write_new_file(&block_with_line(ts, b"1,1,1\n"))
                .await
                .unwrap();
        }

        let files = layout.sorted_file_list().await.unwrap();
        let min_timestamps: Vec<i64> = files.iter().map(|f| f.min_ts).collect();
        assert_eq!(min_timestamps, vec![99, 100, 1000]);
    }

    #[tokio::test]
    async fn test_derived_time_ranges() {
        let dir = TempDir::new().unwrap();
        let layout = FileLayout::new(dir.path()).await.unwrap();
        layout
            .write_new_file(&block_with_line(1000, b"1,1000,1\n"))
            .await
            .unwrap();
        layout
            .write_new_file(&block_with_line(5000, b"1,5000,1\n"))
            .await
            .unwrap();

        let files = layout.sorted_file_list().await.unwrap();
        assert_eq!(files[0].max_ts, 4999);
        assert_eq!(files[1].max_ts, i64::MAX);
        assert_eq!(total_size(&files), 18);

        let overlapping = layout.files_in_time_range(0, 2000).await.unwrap();
        assert_eq!(overlapping.len(), 1);
        assert_eq!(overlapping[0].min_ts, 1000);

        let overlapping = layout.files_in_time_range(4500, 6000).await.unwrap();
        assert_eq!(overlapping.len(), 2);
    }

    #[tokio::test]
    async fn test_append_and_remove() {
        let dir = TempDir::new().unwrap();
        let layout = FileLayout::new(dir.path()).await.unwrap();
        layout
            .write_new_file(&block_with_line(1000, b"1,1000,1\n"))
            .await
            .unwrap();

        let files = layout.sorted_file_list().await.unwrap();
        layout
            .append_to_file(&files[0], &block_with_line(2000, b"1,2000,2\n"))
            .await
            .unwrap();

        let files = layout.sorted_file_list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 18);
        // The name still encodes the original minimum timestamp.
        assert_eq!(files[0].min_ts, 1000);

        layout.remove_file(&files[0]).await.unwrap();
        assert!(layout.sorted_file_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        let layout = FileLayout::new(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("meta.json"), b"{}")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.csv"), b"not a block")
            .await
            .unwrap();

        assert!(layout.sorted_file_list().await.unwrap().is_empty());
    }
}
