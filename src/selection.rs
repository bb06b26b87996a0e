//! Which playlist entries to download

use std::collections::HashSet;

use crate::error::{JobError, Result};
use crate::types::{ItemRef, PlaylistDownloadRequest, PlaylistPreview};

/// A playlist preview plus the user's choice of entries
///
/// Everything starts selected. Order is always playlist order, regardless of
/// the order in which entries were toggled.
#[derive(Clone, Debug)]
pub struct PlaylistSelection {
    url: String,
    preview: PlaylistPreview,
    selected: HashSet<String>,
}

impl PlaylistSelection {
    /// Select every entry of `preview`
    pub fn from_preview(url: impl Into<String>, preview: PlaylistPreview) -> Self {
        let selected = preview.videos.iter().map(|v| v.id.clone()).collect();
        Self {
            url: url.into(),
            preview,
            selected,
        }
    }

    /// Playlist URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The preview this selection was made from
    pub fn preview(&self) -> &PlaylistPreview {
        &self.preview
    }

    /// Flip one entry; unknown ids are ignored. Returns the new state.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.selected.remove(id) {
            return false;
        }
        self.select(id)
    }

    /// Select one entry; unknown ids are ignored. Returns whether it is selected.
    pub fn select(&mut self, id: &str) -> bool {
        if self.preview.videos.iter().any(|v| v.id == id) {
            self.selected.insert(id.to_string());
            true
        } else {
            false
        }
    }

    /// Deselect one entry
    pub fn deselect(&mut self, id: &str) {
        self.selected.remove(id);
    }

    /// Select every entry
    pub fn select_all(&mut self) {
        self.selected = self.preview.videos.iter().map(|v| v.id.clone()).collect();
    }

    /// Deselect every entry
    pub fn deselect_all(&mut self) {
        self.selected.clear();
    }

    /// Whether `id` is selected
    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// Number of selected entries
    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Selected ids in playlist order
    pub fn video_ids(&self) -> Vec<String> {
        self.preview
            .videos
            .iter()
            .filter(|v| self.selected.contains(&v.id))
            .map(|v| v.id.clone())
            .collect()
    }

    /// Item snapshot for a new job
    ///
    /// `positional_index` is 1-based over the selected entries, matching the
    /// ordinal the backend prefixes to each output filename.
    pub fn items(&self) -> Vec<ItemRef> {
        self.preview
            .videos
            .iter()
            .filter(|v| self.selected.contains(&v.id))
            .enumerate()
            .map(|(i, v)| {
                let item = ItemRef::new(v.id.as_str(), i + 1);
                match &v.title {
                    Some(title) => item.with_title(title.as_str()),
                    None => item,
                }
            })
            .collect()
    }

    /// Build the backend request, refusing an empty selection
    pub fn to_request(&self, download_path: &str) -> Result<PlaylistDownloadRequest> {
        let video_ids = self.video_ids();
        if video_ids.is_empty() {
            return Err(JobError::EmptySelection.into());
        }
        Ok(PlaylistDownloadRequest {
            url: self.url.clone(),
            download_path: download_path.to_string(),
            mode: "playlist".to_string(),
            video_ids,
            playlist_title: self
                .preview
                .playlist_title
                .clone()
                .unwrap_or_else(|| "playlist".to_string()),
        })
    }
}
