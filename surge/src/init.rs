mod fs;
mod templates;

use anyhow::Context as _;

use crate::cli::InitArgs;

use fs::write_file;

pub async fn init(args: InitArgs) -> anyhow::Result<()> {
    let path = args.dir.join(&args.file);
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("cannot create directory {}", dir.display()))?;
    }

    write_file(&path, templates::contents(args.template), args.force).await?;
    println!("created {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Template;

    fn args(dir: &std::path::Path, force: bool) -> InitArgs {
        InitArgs {
            dir: dir.to_path_buf(),
            template: Template::Spike,
            file: "spike.yaml".to_string(),
            force,
        }
    }

    #[tokio::test]
    async fn init_writes_template_and_refuses_to_overwrite() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("nested");

        init(args(&dir, false)).await?;
        let written = tokio::fs::read_to_string(dir.join("spike.yaml")).await?;
        assert!(written.contains("executor: ramping-arrival-rate"));

        let err = match init(args(&dir, false)).await {
            Ok(()) => panic!("expected overwrite refusal"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("--force"));

        init(args(&dir, true)).await?;
        Ok(())
    }
}
