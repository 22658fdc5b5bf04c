// Sandbox Dockerfile rendering
use anyhow::{Context, Result};
use handlebars::Handlebars;
use runway_common::Language;
use serde::Serialize;

const DOCKERFILE_TEMPLATE: &str = r#"# GENERATED BY runway-cli - DO NOT EDIT
# {{language}} sandbox image
FROM {{base_image}}

{{#if packages}}
RUN {{packages}}

{{/if}}
{{#if alpine}}
RUN addgroup -g {{uid}} {{user}} && \
    adduser -D -u {{uid}} -G {{user}} {{user}}
{{else}}
RUN groupadd -g {{uid}} {{user}} && \
    useradd -m -u {{uid}} -g {{user}} {{user}}
{{/if}}

WORKDIR {{workdir}}
RUN chown {{user}}:{{user}} {{workdir}}

USER {{user}}
"#;

pub const SANDBOX_USER: &str = "codeuser";
pub const SANDBOX_UID: u32 = 1001;
pub const SANDBOX_WORKDIR: &str = "/usr/src/app";

#[derive(Debug, Serialize)]
struct DockerfileData<'a> {
    language: &'a str,
    base_image: &'a str,
    alpine: bool,
    packages: Option<&'a str>,
    user: &'a str,
    uid: u32,
    workdir: &'a str,
}

/// Base image each sandbox image is built from
pub fn base_image(language: Language) -> &'static str {
    match language {
        Language::TypeScript => "node:22-alpine",
        other => other.default_image(),
    }
}

/// Tag the built image gets; matches what the executor pulls by default
pub fn image_tag(language: Language) -> String {
    match language {
        Language::TypeScript => language.default_image().to_string(),
        other => format!("runway-{}:latest", other.slug()),
    }
}

fn packages(language: Language) -> Option<&'static str> {
    match language {
        Language::TypeScript => Some("npm install -g typescript ts-node && npm cache clean --force"),
        _ => None,
    }
}

pub struct DockerfileGenerator {
    registry: Handlebars<'static>,
}

impl DockerfileGenerator {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string("dockerfile", DOCKERFILE_TEMPLATE)
            .context("Invalid Dockerfile template")?;
        Ok(Self { registry })
    }

    pub fn render(&self, language: Language) -> Result<String> {
        let base = base_image(language);
        let data = DockerfileData {
            language: language.slug(),
            base_image: base,
            alpine: base.contains("alpine"),
            packages: packages(language),
            user: SANDBOX_USER,
            uid: SANDBOX_UID,
            workdir: SANDBOX_WORKDIR,
        };
        self.registry
            .render("dockerfile", &data)
            .with_context(|| format!("Failed to render Dockerfile for {}", language))
    }
}
