//! Building job batches from CLI selections.

use std::sync::Arc;

use anyhow::Context;

use common::endpoint::Endpoint;
use common::image::Image;
use common::job::Job;
use endpoint::Host;

/// Current image inventory of an endpoint, sorted by name for display.
pub fn list_images_sorted(endpoint: &dyn Endpoint) -> anyhow::Result<Vec<Image>> {
    let mut images = endpoint
        .list_images()
        .context("failed listing images")?;
    images.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(images)
}

/// Resolve image name selectors against a host's current listing. An empty
/// selector list means every image on the host.
pub fn select_images(endpoint: &dyn Endpoint, names: &[String]) -> anyhow::Result<Vec<Image>> {
    let images = list_images_sorted(endpoint)?;
    if names.is_empty() {
        return Ok(images);
    }
    names
        .iter()
        .map(|name| {
            images
                .iter()
                .find(|image| image.name() == name)
                .cloned()
                .with_context(|| format!("image {name:?} not found on host"))
        })
        .collect()
}

/// One save job per selected image, writing archives into `output_dir`.
pub fn save_jobs(
    host: &Host,
    images: Vec<Image>,
    output_dir: std::path::PathBuf,
) -> anyhow::Result<Vec<Arc<Job>>> {
    let endpoint = host.endpoint()?;
    Ok(images
        .into_iter()
        .map(|image| {
            Arc::new(Job::save(
                Arc::clone(&endpoint),
                image,
                output_dir.clone(),
            ))
        })
        .collect())
}

/// One load job per archive file.
pub fn load_jobs(host: &Host, files: Vec<std::path::PathBuf>) -> anyhow::Result<Vec<Arc<Job>>> {
    let endpoint = host.endpoint()?;
    Ok(files
        .into_iter()
        .map(|path| Arc::new(Job::load(path, Arc::clone(&endpoint))))
        .collect())
}

/// One sync job per selected image. Syncing a host onto itself is rejected
/// here, before any job exists.
pub fn sync_jobs(
    source: &Host,
    images: Vec<Image>,
    target: &Host,
) -> anyhow::Result<Vec<Arc<Job>>> {
    if source == target {
        anyhow::bail!(
            "source and target host are the same ({:?})",
            source.name()
        );
    }
    let source_endpoint = source.endpoint()?;
    let target_endpoint = target.endpoint()?;
    Ok(images
        .into_iter()
        .map(|image| {
            Arc::new(Job::sync(
                Arc::clone(&source_endpoint),
                image,
                Arc::clone(&target_endpoint),
                target.name(),
            ))
        })
        .collect())
}
