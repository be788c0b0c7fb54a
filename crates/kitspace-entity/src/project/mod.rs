//! Project entities: the `kitspace.yaml` manifest and processing jobs.

pub mod job;
pub mod manifest;

pub use job::{ProjectJob, RepoInfo};
pub use manifest::{
    BoardColor, Eda, EdaType, KitspaceYaml, PcbService, Project, ProjectManifest,
    SINGLE_PROJECT_NAME,
};
