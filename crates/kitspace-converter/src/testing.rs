//! Shared fixtures for converter tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use kitspace_core::ContentIdentity;
use kitspace_core::config::converters::ConvertersConfig;
use kitspace_core::shell::{ShellCommand, ShellError, ShellOutput};
use kitspace_core::traits::CommandRunner;
use kitspace_entity::project::{KitspaceYaml, ProjectJob, RepoInfo};
use kitspace_storage::AssetStore;
use kitspace_worker::ConversionContext;

pub const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

type Handler = dyn Fn(&ShellCommand) -> Result<ShellOutput, ShellError> + Send + Sync;

/// A shell that hands every command to a closure and records it.
pub struct FakeShell {
    handler: Box<Handler>,
    calls: Mutex<Vec<ShellCommand>>,
}

impl std::fmt::Debug for FakeShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeShell").finish()
    }
}

impl FakeShell {
    pub fn new(
        handler: impl Fn(&ShellCommand) -> Result<ShellOutput, ShellError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// A shell where every command fails to spawn.
    pub fn unavailable() -> Arc<Self> {
        Self::new(|command| {
            Err(ShellError::Spawn {
                command: command.render(),
                reason: "no tools in tests".into(),
            })
        })
    }

    pub fn calls(&self) -> Vec<ShellCommand> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.program().to_string())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeShell {
    async fn run(&self, command: &ShellCommand) -> Result<ShellOutput, ShellError> {
        self.calls.lock().expect("calls lock").push(command.clone());
        (self.handler)(command)
    }
}

pub fn stdout(text: impl Into<String>) -> Result<ShellOutput, ShellError> {
    Ok(ShellOutput {
        stdout: text.into(),
        ..ShellOutput::default()
    })
}

/// Tool config writing scratch directories under `root`.
pub fn tools(root: &Path) -> Arc<ConvertersConfig> {
    Arc::new(ConvertersConfig {
        temp_root: Some(root.to_path_buf()),
        ..ConvertersConfig::default()
    })
}

/// Write `files` into `dir`, creating parents.
pub fn write_files(dir: &Path, files: &[(&str, &[u8])]) {
    for (name, contents) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, contents).expect("write");
    }
}

/// Context for the single project described by `yaml` in `checkout`.
pub fn context(
    checkout: &Path,
    yaml: &str,
    shell: Arc<dyn CommandRunner>,
    store: AssetStore,
) -> ConversionContext {
    let yaml = KitspaceYaml::parse(yaml).expect("manifest");
    let project = yaml.projects().remove(0);
    let job = ProjectJob::new(
        &ContentIdentity::new("alice", "ruler", SHA),
        checkout.to_path_buf(),
        project,
        yaml,
        RepoInfo::default(),
    );
    ConversionContext {
        job: Arc::new(job),
        shell,
        store,
        attempt: 1,
    }
}

/// A small valid PNG.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Value of a `--flag=value` argument.
pub fn flag<'a>(command: &'a ShellCommand, name: &str) -> Option<&'a str> {
    command
        .arguments()
        .iter()
        .find_map(|a| a.strip_prefix(name)?.strip_prefix('='))
}
