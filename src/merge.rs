//! Sequential concatenation of downloaded segment files.
//!
//! Playback order depends on append order, so segments are always written
//! strictly in the order they were given; there is no parallel I/O here.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt},
};

use crate::error::YomiResult;

type ByteFilter = Box<dyn FnMut(Bytes) -> Bytes + Send>;
type ProgressFn = Box<dyn FnMut(usize) + Send>;

/// Concatenates an ordered list of local segment files into one output.
pub struct ConcatMerger {
    segments: Vec<PathBuf>,
    filter: Option<ByteFilter>,
    on_progress: Option<ProgressFn>,
}

impl ConcatMerger {
    pub fn new<I, P>(segments: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            filter: None,
            on_progress: None,
        }
    }

    /// Transforms each segment's bytes before they are written.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(Bytes) -> Bytes + Send + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Called after each segment is appended, with the number of segments
    /// written so far.
    pub fn on_progress<F>(mut self, on_progress: F) -> Self
    where
        F: FnMut(usize) + Send + 'static,
    {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    /// Merges into a file at `output`, replacing it if it exists.
    pub async fn merge_to_file<P>(self, output: P) -> YomiResult<()>
    where
        P: AsRef<Path>,
    {
        let mut file = File::create(output.as_ref()).await?;
        self.merge(&mut file).await?;

        log::info!(
            "All finished. Please checkout your file at {}",
            output.as_ref().display()
        );
        Ok(())
    }

    /// Merges into any writer.
    pub async fn merge<W>(mut self, output: &mut W) -> YomiResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        log::info!("Merging {} segments...", self.segments.len());

        for (index, path) in self.segments.iter().enumerate() {
            let data = Bytes::from(tokio::fs::read(path).await?);
            let data = match &mut self.filter {
                Some(filter) => filter(data),
                None => data,
            };

            output.write_all(&data).await?;
            output.flush().await?;

            if let Some(on_progress) = &mut self.on_progress {
                on_progress(index + 1);
            }
        }

        Ok(())
    }
}
