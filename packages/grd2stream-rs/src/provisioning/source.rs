use crate::config::ToolchainConfig;
use crate::download::Downloader;
use crate::error::{FlowlineError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Archive;

/// Unpack a `.tar.gz` source archive below `into`, returning the entry count
///
/// Entries that would escape `into` are skipped by `unpack_in`.
pub fn unpack_source(archive: &Path, into: &Path) -> Result<usize> {
    log::info!("Extracting {} into {}", archive.display(), into.display());

    let file = File::open(archive).map_err(|e| {
        FlowlineError::BuildFailed(format!("Cannot open {}: {}", archive.display(), e))
    })?;
    let mut archive_reader = Archive::new(GzDecoder::new(file));

    let mut count = 0;
    let entries = archive_reader
        .entries()
        .map_err(|e| FlowlineError::BuildFailed(format!("Failed to read tar entries: {}", e)))?;
    for entry in entries {
        let mut entry = entry
            .map_err(|e| FlowlineError::BuildFailed(format!("Failed to read tar entry: {}", e)))?;
        if entry.unpack_in(into)? {
            count += 1;
        }
    }

    log::debug!("Extracted {} entries", count);
    Ok(count)
}

/// Find the grd2stream sources, downloading them into `scratch` if the bundled
/// archive is missing, and unpack them. Returns the unpacked source directory.
pub async fn locate_or_fetch(
    config: &ToolchainConfig,
    downloader: &dyn Downloader,
    scratch: &Path,
) -> Result<PathBuf> {
    let archive = if config.source_archive.is_file() {
        config.source_archive.clone()
    } else {
        let url = config.source_url.as_deref().ok_or_else(|| {
            FlowlineError::BuildFailed(format!(
                "Source archive not found at {} and no download URL is configured",
                config.source_archive.display()
            ))
        })?;
        log::warn!(
            "Bundled source archive {} not found, downloading",
            config.source_archive.display()
        );
        let file_name = config
            .source_archive
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_else(|| format!("{}.tar.gz", config.source_dir_name).into());
        let target = scratch.join(file_name);
        downloader
            .download(url, &target)
            .await
            .map_err(|e| FlowlineError::BuildFailed(e.to_string()))?;
        target
    };

    unpack_source(&archive, scratch)?;

    let source_dir = scratch.join(&config.source_dir_name);
    if !source_dir.join("configure").is_file() {
        return Err(FlowlineError::BuildFailed(format!(
            "{} does not contain {}/configure",
            archive.display(),
            config.source_dir_name
        )));
    }
    Ok(source_dir)
}

/// Minimal grd2stream-shaped tarball for provisioning tests
#[cfg(test)]
pub(crate) fn write_test_archive(path: &Path, dir_name: &str) {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let file = File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let script = b"#!/bin/sh\necho configured\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(script.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("{}/configure", dir_name), &script[..])
        .unwrap();

    let source = b"int main(void) { return 0; }\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(source.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("{}/grd2stream.c", dir_name), &source[..])
        .unwrap();

    builder.into_inner().unwrap().finish().unwrap();
}
