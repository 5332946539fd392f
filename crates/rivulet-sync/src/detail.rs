//! The shared detail-fetch path: upstream detail to domain mapping and the
//! commit that stamps `cache_timestamp`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rivulet_core::model::{FileEntry, FileHealth, Torrent, TorrentHealth};
use rivulet_core::store::CacheStore;
use rivulet_debrid::client::UpstreamClient;
use rivulet_debrid::wire::TorrentDetail;

use crate::error::SyncError;

/// Fetch detail for one torrent, map it, and commit it with a fresh
/// `cache_timestamp`.
pub(crate) async fn fetch_and_store_detail(
    client: &dyn UpstreamClient,
    store: &dyn CacheStore,
    id: &str,
) -> Result<Torrent, SyncError> {
    let detail = client.torrent_detail(id).await?;
    let torrent = torrent_from_detail(&detail, Utc::now());
    store.upsert_torrent(&torrent).await?;
    Ok(torrent)
}

/// Map an upstream detail payload into the domain shape.
///
/// Restricted links are parallel to the selected entries of `files`; each
/// selected file without a matching link is marked broken, and a torrent
/// with no usable link at all is broken as a whole.
pub(crate) fn torrent_from_detail(detail: &TorrentDetail, now: DateTime<Utc>) -> Torrent {
    let mut selected_files = BTreeMap::new();
    let mut links = detail.links.iter();
    for file in detail.files.iter().filter(|file| file.is_selected()) {
        let link = links.next().cloned();
        let state = if link.is_some() {
            FileHealth::Ok
        } else {
            FileHealth::Broken
        };
        selected_files.insert(
            file_name_of(&file.path).to_string(),
            FileEntry {
                id: file.id.to_string(),
                path: file.path.clone(),
                bytes: file.bytes,
                selected: true,
                link_issued_at: link.as_ref().map(|_| now),
                link,
                state,
            },
        );
    }

    let state = if selected_files.values().any(|file| file.link.is_some()) {
        TorrentHealth::Ok
    } else {
        TorrentHealth::Broken
    };

    Torrent {
        id: detail.id.clone(),
        name: detail.filename.clone(),
        hash: detail.hash.clone(),
        added: detail.added,
        ended: detail.ended,
        selected_files,
        state,
        total_size: detail.bytes,
        cache_timestamp: Some(now),
    }
}

pub(crate) fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_test_support::fixtures::detail_with_files;

    #[test]
    fn mapping_pairs_links_with_selected_files_only() {
        let now = Utc::now();
        let detail = detail_with_files(
            "AA",
            "Example.Release",
            now,
            &[
                ("/Example.Release/movie.mkv", 1_000, true),
                ("/Example.Release/sample.mkv", 10, false),
                ("/Example.Release/subs.srt", 1, true),
            ],
        );

        let torrent = torrent_from_detail(&detail, now);
        assert_eq!(torrent.selected_files.len(), 2);
        assert!(torrent.is_detailed());
        assert_eq!(torrent.state, TorrentHealth::Ok);

        let movie = &torrent.selected_files["movie.mkv"];
        assert!(movie.link.as_deref().is_some_and(|link| link.contains("/AA/")));
        assert_eq!(movie.link_issued_at, Some(now));
        assert_eq!(movie.state, FileHealth::Ok);
    }

    #[test]
    fn missing_links_mark_files_and_torrent_broken() {
        let now = Utc::now();
        let mut detail = detail_with_files(
            "BB",
            "Broken.Release",
            now,
            &[("/Broken.Release/movie.mkv", 1_000, true)],
        );
        detail.links.clear();

        let torrent = torrent_from_detail(&detail, now);
        assert_eq!(torrent.state, TorrentHealth::Broken);
        let movie = &torrent.selected_files["movie.mkv"];
        assert!(movie.link.is_none());
        assert_eq!(movie.state, FileHealth::Broken);
    }

    #[test]
    fn file_names_strip_payload_directories() {
        assert_eq!(file_name_of("/Example/inner/movie.mkv"), "movie.mkv");
        assert_eq!(file_name_of("movie.mkv"), "movie.mkv");
    }
}
