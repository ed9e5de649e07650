//! Download capture for the browser backend.
//!
//! Chrome reports downloads through `Browser.downloadWillBegin` /
//! `downloadProgress` events once `setDownloadBehavior` enables them. The
//! capture races the first completion against a deadline, and backs the
//! events up with a directory scan: whatever arrives first wins, and on
//! timeout the newest file matching the glob that appeared after the
//! trigger is accepted.

use super::BrowserSession;
use crate::timeouts::{ms, secs};
use crate::{Error, Result};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
};
use futures::StreamExt;
use glob::Pattern;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Shell-style pattern the downloaded filename must match.
    pub glob: String,
    /// Overall deadline; defaults to the crate's download timeout.
    pub timeout: Option<Duration>,
    /// Rename the finished file to this name inside the download directory.
    pub save_as: Option<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            glob: "*".to_string(),
            timeout: None,
            save_as: None,
        }
    }
}

impl BrowserSession {
    /// Clicks `selector` and waits for the download it triggers.
    ///
    /// In replay mode the download directory is scanned for a glob match
    /// instead; a missing file means the recording has to be redone.
    pub async fn do_download(&self, selector: &str, options: &DownloadOptions) -> Result<PathBuf> {
        let pattern = Pattern::new(&options.glob)
            .map_err(|e| Error::Form(format!("invalid glob {:?}: {e}", options.glob)))?;

        if self.session.is_replay().await {
            return match newest_matching(&self.download_dir, &pattern, SystemTime::UNIX_EPOCH)? {
                Some(path) => Ok(path),
                None => Err(Error::RetryAndRecord {
                    filename: self.download_dir.join(&options.glob),
                }),
            };
        }

        let started = SystemTime::now();
        let mut will_begin = match self.page.event_listener::<EventDownloadWillBegin>().await {
            Ok(stream) => stream.boxed(),
            Err(_) => futures::stream::pending().boxed(),
        };
        let mut progress = match self.page.event_listener::<EventDownloadProgress>().await {
            Ok(stream) => stream.boxed(),
            Err(_) => futures::stream::pending().boxed(),
        };

        self.do_click(selector).await?;

        let timeout = options
            .timeout
            .unwrap_or(Duration::from_secs(secs::DOWNLOAD));
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut poll = tokio::time::interval(Duration::from_millis(ms::DOWNLOAD_POLL));
        // guid -> suggested filename
        let mut names: HashMap<String, String> = HashMap::new();

        loop {
            tokio::select! {
                event = will_begin.next() => {
                    if let Some(event) = event {
                        names.insert(event.guid.clone(), event.suggested_filename.clone());
                    }
                }
                event = progress.next() => {
                    let Some(event) = event else { break };
                    match event.state {
                        DownloadProgressState::Completed => {
                            let filename = names.get(&event.guid).cloned().unwrap_or_default();
                            return self.finish(filename, &pattern, options);
                        }
                        DownloadProgressState::Canceled => return Err(Error::DownloadCanceled),
                        _ => {}
                    }
                }
                _ = poll.tick() => {
                    // Event delivery is not guaranteed across Chrome
                    // versions; the directory is the source of truth.
                    if let Some(path) = newest_completed(&self.download_dir, started)? {
                        let filename = file_name(&path);
                        return self.finish(filename, &pattern, options);
                    }
                }
                _ = &mut deadline => break,
            }
        }

        // Deadline hit: accept a file that landed after the trigger, or
        // report the freshest mismatch.
        if let Some(path) = newest_matching(&self.download_dir, &pattern, started)? {
            return self.rename_if_requested(path, options);
        }
        if let Some(path) = newest_completed(&self.download_dir, started)? {
            return Err(Error::DownloadGlobMismatch {
                filename: file_name(&path),
                glob: options.glob.clone(),
            });
        }
        Err(Error::DownloadTimeout(timeout))
    }

    fn finish(&self, filename: String, pattern: &Pattern, options: &DownloadOptions) -> Result<PathBuf> {
        if !pattern.matches(&filename) {
            return Err(Error::DownloadGlobMismatch {
                filename,
                glob: options.glob.clone(),
            });
        }
        self.rename_if_requested(self.download_dir.join(&filename), options)
    }

    fn rename_if_requested(&self, path: PathBuf, options: &DownloadOptions) -> Result<PathBuf> {
        let Some(save_as) = &options.save_as else {
            tracing::info!(file = %path.display(), "download complete");
            return Ok(path);
        };
        let target = self.download_dir.join(save_as);
        std::fs::rename(&path, &target)?;
        tracing::info!(file = %target.display(), "download complete");
        Ok(target)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A download still in flight keeps a `.crdownload` twin; a completed one
/// stands alone.
fn is_in_flight(path: &Path) -> bool {
    if path.extension().is_some_and(|e| e == "crdownload") {
        return true;
    }
    let mut twin = path.as_os_str().to_owned();
    twin.push(".crdownload");
    PathBuf::from(twin).exists()
}

fn completed_since(dir: &Path, since: SystemTime) -> Result<Vec<(PathBuf, SystemTime)>> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(out);
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || is_in_flight(&path) {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified >= since {
            out.push((path, modified));
        }
    }
    out.sort_by_key(|(_, modified)| *modified);
    Ok(out)
}

fn newest_completed(dir: &Path, since: SystemTime) -> Result<Option<PathBuf>> {
    Ok(completed_since(dir, since)?.pop().map(|(path, _)| path))
}

fn newest_matching(dir: &Path, pattern: &Pattern, since: SystemTime) -> Result<Option<PathBuf>> {
    Ok(completed_since(dir, since)?
        .into_iter()
        .rev()
        .find(|(path, _)| pattern.matches(&file_name(path)))
        .map(|(path, _)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn newest_matching_picks_latest_by_mtime() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("data.csv"), "a").unwrap();
        std::fs::write(tmp.path().join("report.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("image.png"), "c").unwrap();

        let csv = Pattern::new("*.csv").unwrap();
        let found = newest_matching(tmp.path(), &csv, SystemTime::UNIX_EPOCH)
            .unwrap()
            .unwrap();
        assert_eq!(found, tmp.path().join("data.csv"));

        let none = Pattern::new("*.zip").unwrap();
        assert!(newest_matching(tmp.path(), &none, SystemTime::UNIX_EPOCH)
            .unwrap()
            .is_none());
    }

    #[test]
    fn in_flight_downloads_are_invisible() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("file.zip"), "x").unwrap();
        std::fs::write(tmp.path().join("file.zip.crdownload"), "x").unwrap();
        std::fs::write(tmp.path().join("done.zip"), "y").unwrap();

        let all = Pattern::new("*").unwrap();
        let found = newest_matching(tmp.path(), &all, SystemTime::UNIX_EPOCH)
            .unwrap()
            .unwrap();
        assert_eq!(found, tmp.path().join("done.zip"));
    }

    #[test]
    fn files_older_than_the_trigger_are_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("old.csv"), "a").unwrap();
        let later = SystemTime::now() + Duration::from_secs(60);

        let all = Pattern::new("*").unwrap();
        assert!(newest_matching(tmp.path(), &all, later).unwrap().is_none());
    }
}
