//! Test fixtures: environment probes and sample upstream payloads.

use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};
use rivulet_debrid::wire::{DetailFile, TorrentDetail, TorrentSummary};

/// Returns `true` if a Docker daemon is reachable for integration tests.
#[must_use]
pub fn docker_available() -> bool {
    docker_available_with_host(std::env::var("DOCKER_HOST").ok())
}

fn docker_available_with_host(host: Option<String>) -> bool {
    if let Some(host) = host {
        if let Some(path) = host.strip_prefix("unix://") {
            return Path::new(path).exists();
        }
        return true;
    }

    Path::new("/var/run/docker.sock").exists()
        || Command::new("docker")
            .args(["info"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
}

/// Build a ready (downloaded, 100%) torrent summary.
#[must_use]
pub fn ready_summary(id: &str, name: &str, added: DateTime<Utc>) -> TorrentSummary {
    TorrentSummary {
        id: id.to_string(),
        filename: name.to_string(),
        hash: format!("hash-{id}"),
        bytes: 1_073_741_824,
        status: "downloaded".to_string(),
        progress: 100.0,
        added,
        ended: Some(added),
    }
}

/// Build a torrent detail whose selected files carry links.
///
/// `files` lists `(path, bytes, selected)`; links are generated for the
/// selected entries in order.
#[must_use]
pub fn detail_with_files(
    id: &str,
    name: &str,
    added: DateTime<Utc>,
    files: &[(&str, u64, bool)],
) -> TorrentDetail {
    let wire_files: Vec<DetailFile> = files
        .iter()
        .enumerate()
        .map(|(index, (path, bytes, selected))| DetailFile {
            id: index as u64 + 1,
            path: (*path).to_string(),
            bytes: *bytes,
            selected: u8::from(*selected),
        })
        .collect();
    let links = files
        .iter()
        .filter(|(_, _, selected)| *selected)
        .enumerate()
        .map(|(index, _)| format!("https://host.example/restricted/{id}/{index}"))
        .collect();

    TorrentDetail {
        id: id.to_string(),
        filename: name.to_string(),
        hash: format!("hash-{id}"),
        bytes: files.iter().map(|(_, bytes, _)| bytes).sum(),
        status: "downloaded".to_string(),
        progress: 100.0,
        added,
        ended: Some(added),
        files: wire_files,
        links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_available_respects_unix_socket_env() {
        assert!(!docker_available_with_host(Some(
            "unix:///definitely/missing.sock".into()
        )));
    }

    #[test]
    fn docker_available_accepts_tcp_env() {
        assert!(docker_available_with_host(Some(
            "tcp://127.0.0.1:2375".into()
        )));
    }

    #[test]
    fn detail_builder_links_track_selected_files() {
        let detail = detail_with_files(
            "AA",
            "Example",
            Utc::now(),
            &[("/Example/movie.mkv", 100, true), ("/Example/sample.mkv", 1, false)],
        );
        assert_eq!(detail.files.len(), 2);
        assert_eq!(detail.links.len(), 1);
    }
}
