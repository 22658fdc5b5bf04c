// CLI commands for operating Runway
use anyhow::{bail, Context, Result};
use runway_common::Language;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::generator::{self, DockerfileGenerator};

/// Print the built-in language table
pub fn list_languages() {
    println!("📋 Supported Languages:\n");
    println!("{:<12} {:<32} {:<14} {}", "Name", "Image", "File", "Command");
    println!("{}", "─".repeat(100));

    for language in Language::ALL {
        println!(
            "{:<12} {:<32} {:<14} {}",
            language.slug(),
            language.default_image(),
            language.file_name(),
            language.command()
        );
    }

    println!("\n✅ Total: {} language(s)", Language::ALL.len());
}

fn dockerfile_path(output_dir: &Path, language: Language) -> PathBuf {
    output_dir.join(language.slug()).join("Dockerfile")
}

/// Render the sandbox Dockerfile for `language` under `output_dir/<language>/`
pub fn write_dockerfile(language: Language, output_dir: &Path) -> Result<PathBuf> {
    let path = dockerfile_path(output_dir, language);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let content = DockerfileGenerator::new()?.render(language)?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Render and `docker build` the sandbox image for `language`
pub fn build_docker_image(language: Language, output_dir: &Path, no_cache: bool) -> Result<()> {
    println!("🐳 Building sandbox image for: {}", language);

    let dockerfile = write_dockerfile(language, output_dir)?;
    let context_dir = dockerfile
        .parent()
        .context("Dockerfile has no parent directory")?;
    let tag = generator::image_tag(language);

    let mut docker_args = vec![
        "build".to_string(),
        "-t".to_string(),
        tag.clone(),
        "-f".to_string(),
        dockerfile.to_string_lossy().to_string(),
    ];
    if no_cache {
        docker_args.push("--no-cache".to_string());
    }
    docker_args.push(context_dir.to_string_lossy().to_string());

    println!("\n🔨 Running: docker {}", docker_args.join(" "));
    println!("{}\n", "━".repeat(70));

    let status = Command::new("docker")
        .args(&docker_args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("Failed to execute docker build. Is Docker installed and running?")?;

    if !status.success() {
        bail!("Docker build failed with exit code: {:?}", status.code());
    }

    println!("\n{}", "━".repeat(70));
    println!("✅ Built {}", tag);
    if tag != language.default_image() {
        println!("\n💡 Point the executor at it via LANGUAGES_CONFIG:");
        println!(
            "   {{\"languages\": [{{\"name\": \"{}\", \"image\": \"{}\"}}]}}",
            language.slug(),
            tag
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunBody<'a> {
    user_id: &'a str,
    code: &'a str,
    language: &'a str,
}

/// Send a source file to the acceptance API
pub async fn submit(api: &str, user_id: &str, language: Language, file: &Path) -> Result<Value> {
    let code = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let endpoint = format!("{}/run", api.trim_end_matches('/'));
    let response = client
        .post(&endpoint)
        .json(&RunBody {
            user_id,
            code: &code,
            language: language.slug(),
        })
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?;

    let status = response.status();
    let body: Value = response.json().await.context("API returned a non-JSON body")?;
    if !status.is_success() {
        bail!(
            "Submission rejected ({}): {}",
            status,
            body["result"].as_str().unwrap_or("unknown error")
        );
    }
    Ok(body)
}
