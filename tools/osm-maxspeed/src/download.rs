use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Germany extract from Geofabrik
pub const DEFAULT_PBF_URL: &str = "https://download.geofabrik.de/europe/germany-latest.osm.pbf";

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Sibling file the body is streamed into before the final rename
fn part_path(output_path: &Path) -> PathBuf {
    let mut part = output_path.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// Linear backoff: 5s, 10s, 15s, ...
fn retry_delay(attempt: u32) -> Duration {
    RETRY_DELAY * attempt
}

/// Client errors (4xx) will not go away by asking again
fn is_retryable(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<reqwest::Error>() {
        Some(e) => !e.status().is_some_and(|status| status.is_client_error()),
        None => true,
    }
}

fn progress_bar(total: Option<u64>) -> Result<ProgressBar> {
    let pb = match total {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
                    .progress_chars("=> "),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg} {bytes}")?);
            pb
        }
    };
    pb.set_message("Downloading");
    Ok(pb)
}

fn fetch_once(client: &Client, url: &str, part: &Path) -> Result<u64> {
    let mut response = client.get(url).send()?.error_for_status()?;

    let pb = progress_bar(response.content_length())?;
    let file = File::create(part)?;
    let mut writer = pb.wrap_write(BufWriter::new(file));

    let bytes = std::io::copy(&mut response, &mut writer)?;
    writer.flush()?;

    pb.finish_with_message("Downloaded");
    Ok(bytes)
}

/// Download `url` to `output_path` unless the file already exists.
///
/// The body goes to `<output>.part` first, so an interrupted download never
/// leaves a truncated file under the final name.
pub fn download_pbf(url: &str, output_path: &Path, retries: u32) -> Result<()> {
    if output_path.exists() {
        log::info!("{} already exists, skipping download", output_path.display());
        return Ok(());
    }

    let client = Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(None::<Duration>)
        .build()
        .context("Failed to build HTTP client")?;

    let part = part_path(output_path);
    log::info!("Downloading {} to {}", url, output_path.display());

    let mut attempt = 0;
    let bytes = loop {
        attempt += 1;
        match fetch_once(&client, url, &part) {
            Ok(bytes) => break bytes,
            Err(e) if attempt <= retries && is_retryable(&e) => {
                let delay = retry_delay(attempt);
                log::warn!(
                    "Download attempt {}/{} failed: {:#}, retrying in {}s",
                    attempt,
                    retries + 1,
                    e,
                    delay.as_secs()
                );
                std::thread::sleep(delay);
            }
            Err(e) => {
                let _ = std::fs::remove_file(&part);
                return Err(e.context(format!("Failed to download {}", url)));
            }
        }
    };

    std::fs::rename(&part, output_path).with_context(|| {
        format!("Failed to move {} to {}", part.display(), output_path.display())
    })?;
    log::info!("Downloaded {:.1} MB", bytes as f64 / 1_000_000.0);

    Ok(())
}
