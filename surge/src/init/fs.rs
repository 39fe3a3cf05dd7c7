use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context as _;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt as _;

/// Writes `contents` to `path`. Without `force`, an existing file is left untouched and
/// reported as an error.
pub async fn write_file(path: &Path, contents: &str, force: bool) -> anyhow::Result<()> {
    let mut opts = OpenOptions::new();
    opts.write(true);
    if force {
        opts.create(true).truncate(true);
    } else {
        opts.create_new(true);
    }

    let mut file = match opts.open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            anyhow::bail!("{} already exists (use --force to overwrite)", path.display())
        }
        Err(err) => return Err(err).with_context(|| format!("cannot create {}", path.display())),
    };

    file.write_all(contents.as_bytes())
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    file.flush().await?;
    Ok(())
}
