use std::{fs::File, path::Path};

use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use tokio::process::Command;
use tracing::{debug, info};

pub const DEFAULT_DATASET: &str = "alexisbcook/geospatial-learn-course-data";

/// Makes sure the course data is present, downloading it once with the
/// `kaggle` CLI unless `download` is unset. There is no retry.
pub async fn ensure_dataset(data_dir: &Path, dataset: &str, download: bool) -> Result<()> {
	if data_dir.is_dir() {
		debug!(?data_dir, "dataset already present");
		return Ok(());
	}

	if !download {
		bail!(
			"data directory {} does not exist and downloading {} is disabled",
			data_dir.display(),
			dataset
		);
	}

	let archive_name = dataset
		.rsplit('/')
		.next()
		.filter(|name| !name.is_empty())
		.ok_or_else(|| eyre!("invalid dataset id: {:?}", dataset))?;

	tokio::fs::create_dir_all(data_dir)
		.await
		.wrap_err_with(|| format!("creating {}", data_dir.display()))?;

	info!(%dataset, ?data_dir, "downloading dataset with kaggle");
	run(Command::new("kaggle")
		.args(["datasets", "download", dataset, "-p"])
		.arg(data_dir))
	.await?;

	let archive = data_dir.join(format!("{}.zip", archive_name));
	info!(?archive, "extracting dataset");
	let into = data_dir.to_owned();
	let entries = tokio::task::spawn_blocking(move || extract(&archive, &into)).await??;
	debug!(?data_dir, %entries, "extracted dataset");

	Ok(())
}

fn extract(archive: &Path, into: &Path) -> Result<usize> {
	let file = File::open(archive).wrap_err_with(|| format!("opening {}", archive.display()))?;
	let mut zip = zip::ZipArchive::new(file).wrap_err_with(|| format!("reading {}", archive.display()))?;
	let entries = zip.len();
	zip.extract(into)
		.wrap_err_with(|| format!("extracting {} into {}", archive.display(), into.display()))?;
	Ok(entries)
}

async fn run(command: &mut Command) -> Result<()> {
	debug!(?command, "running");
	let status = command
		.status()
		.await
		.wrap_err_with(|| format!("spawning {:?}", command.as_std().get_program()))?;

	if !status.success() {
		bail!("{:?} exited with {}", command.as_std().get_program(), status);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use zip::write::FileOptions;

	use super::*;

	#[tokio::test]
	async fn present_directory_needs_nothing() {
		let dir = tempfile::tempdir().unwrap();
		ensure_dataset(dir.path(), DEFAULT_DATASET, false).await.unwrap();
	}

	#[tokio::test]
	async fn missing_directory_without_download_fails() {
		let dir = tempfile::tempdir().unwrap();
		let err = ensure_dataset(&dir.path().join("data"), DEFAULT_DATASET, false)
			.await
			.unwrap_err();
		assert!(err.to_string().contains("disabled"));
	}

	#[test]
	fn extracts_archive_in_place() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("geospatial-learn-course-data.zip");
		{
			let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
			zip.start_file("purple_martin.csv", FileOptions::default()).unwrap();
			zip.write_all(b"timestamp,location-long,location-lat,tag-local-identifier\n").unwrap();
			zip.start_file("naturalearth_lowres/naturalearth_lowres.prj", FileOptions::default())
				.unwrap();
			zip.write_all(b"GEOGCS[\"GCS_WGS_1984\"]").unwrap();
			zip.finish().unwrap();
		}

		assert_eq!(extract(&archive, dir.path()).unwrap(), 2);
		assert!(std::fs::read_to_string(dir.path().join("purple_martin.csv"))
			.unwrap()
			.starts_with("timestamp,"));
		assert!(dir.path().join("naturalearth_lowres/naturalearth_lowres.prj").is_file());
	}

	#[test]
	fn corrupt_archive_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("data.zip");
		std::fs::write(&archive, b"not a zip").unwrap();
		assert!(extract(&archive, dir.path()).is_err());
	}

	#[tokio::test]
	async fn rejects_empty_dataset_id() {
		let dir = tempfile::tempdir().unwrap();
		assert!(ensure_dataset(&dir.path().join("data"), "owner/", true).await.is_err());
	}
}
