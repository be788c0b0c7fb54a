//! The repository manifest as JSON, with linkified summaries.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};

use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::{KitspaceYaml, ProjectJob, ProjectManifest};
use kitspace_worker::{ConversionContext, Converter, ConverterOutput, TaskError};

use crate::error::ConversionError;
use crate::markdown::escape_html;

pub const KITSPACE_YAML_JSON: &str = "kitspace-yaml.json";

static URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#).ok());

/// Escape `text` and turn bare URLs into links opening in a new tab.
pub fn linkify(text: &str) -> String {
    let Some(re) = URL.as_ref() else {
        return escape_html(text);
    };
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for found in re.find_iter(text) {
        let url = found
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);
        let end = found.start() + url.len();

        out.push_str(&escape_html(&text[last..found.start()]));
        let href = if url.to_ascii_lowercase().starts_with("www.") {
            format!("https://{url}")
        } else {
            url.to_string()
        };
        out.push_str(&format!(
            r#"<a href="{}" rel="noopener noreferrer" target="_blank">{}</a>"#,
            escape_html(&href),
            escape_html(url)
        ));
        last = end;
    }
    out.push_str(&escape_html(&text[last..]));
    out
}

fn project_json(manifest: &ProjectManifest) -> Result<Value, ConversionError> {
    let manifest = ProjectManifest {
        summary: linkify(&manifest.summary),
        ..manifest.clone()
    };
    Ok(serde_json::to_value(manifest)?)
}

/// JSON form of the whole manifest.
pub fn manifest_json(yaml: &KitspaceYaml) -> Result<Value, ConversionError> {
    match yaml {
        KitspaceYaml::Single(manifest) => project_json(manifest),
        KitspaceYaml::Multi(projects) => {
            let mut multi = Map::new();
            for (name, manifest) in projects {
                multi.insert(name.clone(), project_json(manifest)?);
            }
            let mut root = Map::new();
            root.insert("multi".to_string(), Value::Object(multi));
            Ok(Value::Object(root))
        }
    }
}

/// Repo-level converter publishing `kitspace-yaml.json`.
#[derive(Debug, Default)]
pub struct KitspaceYamlConverter;

#[async_trait]
impl Converter for KitspaceYamlConverter {
    fn category(&self) -> AssetCategory {
        AssetCategory::KitspaceYaml
    }

    fn outputs(&self, _job: &ProjectJob) -> Vec<String> {
        vec![KITSPACE_YAML_JSON.to_string()]
    }

    async fn run(&self, ctx: &ConversionContext) -> Result<ConverterOutput, TaskError> {
        let json = manifest_json(&ctx.job.kitspace_yaml)?;
        let bytes = serde_json::to_vec(&json).map_err(ConversionError::from)?;
        Ok(ConverterOutput::new().with(KITSPACE_YAML_JSON, bytes))
    }
}
